//! Turns a [`SoundSpec`] into audible output.
//!
//! The [`SoundEngine`] owns the output device through an [`AudioBackend`] and
//! hands out one [`PlaybackHandle`] per playback. At most one handle is live at
//! a time. When a playback reaches its end the engine's completion callback is
//! invoked with the handle, from whatever thread the backend plays on.

use std::{fmt, path::PathBuf, sync::Arc};

use log::{debug, warn};

use crate::{
    alarm::{SoundSpec, Volume},
    library::{LibraryError, SoundLibrary},
};

pub mod output;
pub mod pattern;

pub use output::RodioOutput;
pub use pattern::{Pattern, PatternSource, Tone};

#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("a sound is already playing, stop it first")]
    AlreadyPlaying,
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("couldn't decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("audio device unavailable: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "playback {}", self.0)
    }
}

/// A resolved sound the backend can open without further lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playable {
    Pattern(Pattern),
    File(PathBuf),
}

/// Invoked once when a playback runs out on its own. Not invoked after `halt`.
pub type OnEnd = Box<dyn FnOnce() + Send>;

/// The output device.
pub trait AudioBackend {
    /// Starts playing `playable` at `gain` (0.0..=1.0).
    fn play(
        &mut self,
        playable: Playable,
        gain: f32,
        looping: bool,
        on_end: OnEnd,
    ) -> Result<(), SoundError>;

    /// Silences and releases whatever is playing. Must be harmless when idle.
    fn halt(&mut self);
}

pub type Completion = Arc<dyn Fn(PlaybackHandle) + Send + Sync>;

pub struct SoundEngine<B> {
    backend: B,
    library: SoundLibrary,
    on_complete: Completion,
    next_handle: u64,
    active: Option<PlaybackHandle>,
}

impl<B> fmt::Debug for SoundEngine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundEngine")
            .field("library", &self.library)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<B: AudioBackend> SoundEngine<B> {
    pub fn new(backend: B, library: SoundLibrary, on_complete: Completion) -> Self {
        Self {
            backend,
            library,
            on_complete,
            next_handle: 0,
            active: None,
        }
    }

    pub fn resolve(&self, spec: &SoundSpec) -> Result<Playable, SoundError> {
        match spec {
            SoundSpec::Builtin { pattern } => Ok(Playable::Pattern(*pattern)),
            SoundSpec::External { locator } => Ok(Playable::File(self.library.resolve(locator)?)),
        }
    }

    /// Starts a playback. Fails with [`SoundError::AlreadyPlaying`] while another handle is live.
    pub fn start(
        &mut self,
        spec: &SoundSpec,
        volume: Volume,
        looping: bool,
    ) -> Result<PlaybackHandle, SoundError> {
        if self.active.is_some() {
            return Err(SoundError::AlreadyPlaying);
        }
        let playable = self.resolve(spec)?;
        self.next_handle += 1;
        let handle = PlaybackHandle(self.next_handle);
        let on_complete = Arc::clone(&self.on_complete);
        self.backend.play(
            playable,
            volume.gain(),
            looping,
            Box::new(move || on_complete(handle)),
        )?;
        debug!("started {handle} ({spec}, volume {}, looping {looping})", volume.level());
        self.active = Some(handle);
        Ok(handle)
    }

    /// Stops `handle` if it is the live playback. Anything else is a no-op.
    pub fn stop(&mut self, handle: PlaybackHandle) {
        if self.active == Some(handle) {
            self.stop_all();
        }
    }

    pub fn stop_all(&mut self) {
        self.backend.halt();
        if let Some(handle) = self.active.take() {
            debug!("stopped {handle}");
        }
    }

    /// Records that `handle` ran out. Returns `false` for handles that were
    /// already stopped or replaced, whose late completions must be ignored.
    pub fn finished(&mut self, handle: PlaybackHandle) -> bool {
        if self.active == Some(handle) {
            self.backend.halt();
            self.active = None;
            debug!("{handle} finished");
            true
        } else {
            warn!("ignoring completion of stale {handle}");
            false
        }
    }

    #[must_use]
    pub const fn active(&self) -> Option<PlaybackHandle> {
        self.active
    }

    #[must_use]
    pub const fn library(&self) -> &SoundLibrary {
        &self.library
    }

    #[cfg(test)]
    pub(crate) const fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
