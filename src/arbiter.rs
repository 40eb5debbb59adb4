//! Decides which alarm may make noise.
//!
//! There is exactly one playback slot. An alarm that comes due while the slot
//! is taken either interrupts the one playing, which is dropped, or waits in a
//! first in first out queue that drains whenever the slot frees up.

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::{
    alarm::{Alarm, AlarmId, SoundSpec, Volume},
    communication::{Alert, Status},
    notify::{Notification, Notifier},
    sound::{AudioBackend, PlaybackHandle, SoundEngine, SoundError},
    store::AlarmStore,
};

#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("alarm {0} is not waiting to play")]
    NotPending(AlarmId),
    #[error("an alarm is ringing, dismiss it first")]
    Busy,
    #[error(transparent)]
    Sound(#[from] SoundError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSlot {
    pub active: Option<Alarm>,
    pub pending: VecDeque<Alarm>,
}

impl PlaybackSlot {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// whether `id` is playing or waiting
    #[must_use]
    pub fn holds(&self, id: AlarmId) -> bool {
        self.active.as_ref().is_some_and(|alarm| alarm.id == id)
            || self.pending.iter().any(|alarm| alarm.id == id)
    }
}

pub struct Arbiter<B> {
    engine: SoundEngine<B>,
    slot: PlaybackSlot,
    current: Option<PlaybackHandle>,
    preview: Option<PlaybackHandle>,
    notifier: Box<dyn Notifier>,
    notifications: bool,
    alerts: Vec<Alert>,
}

impl<B> std::fmt::Debug for Arbiter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("engine", &self.engine)
            .field("slot", &self.slot)
            .field("current", &self.current)
            .field("preview", &self.preview)
            .finish_non_exhaustive()
    }
}

impl<B: AudioBackend> Arbiter<B> {
    pub fn new(engine: SoundEngine<B>, notifier: Box<dyn Notifier>) -> Self {
        let notifications = notifier.is_available();
        if !notifications {
            info!("notifications unavailable, alarms will only be audible");
        }
        Self {
            engine,
            slot: PlaybackSlot::default(),
            current: None,
            preview: None,
            notifier,
            notifications,
            alerts: Vec::new(),
        }
    }

    #[must_use]
    pub const fn slot(&self) -> &PlaybackSlot {
        &self.slot
    }

    #[must_use]
    pub const fn engine(&self) -> &SoundEngine<B> {
        &self.engine
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> &mut SoundEngine<B> {
        &mut self.engine
    }

    #[must_use]
    pub fn status(&self, all_enabled: bool) -> Status {
        Status {
            active: self.slot.active.clone(),
            pending: self.slot.pending.iter().cloned().collect(),
            all_enabled,
        }
    }

    /// Everything that happened since the last call.
    pub fn drain_alerts(&mut self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts)
    }

    /// Feeds one due alarm in. Call in the order the matcher returns them.
    pub fn offer(&mut self, due: Alarm, store: &mut AlarmStore) {
        let Some(active) = &self.slot.active else {
            if !self.activate(due, false, store) {
                self.drain(store);
            }
            return;
        };
        if active.id == due.id {
            return;
        }
        if due.interrupts_others {
            self.slot.pending.retain(|alarm| alarm.id != due.id);
            self.stop_active();
            if !self.activate(due, true, store) {
                self.drain(store);
            }
        } else if !self.slot.holds(due.id) {
            debug!("queueing {} behind {}", due.id, active.id);
            self.alerts.push(Alert::Queued(due.clone()));
            self.slot.pending.push_back(due);
        }
    }

    /// Handles a completion coming back from the audio thread.
    pub fn playback_finished(&mut self, handle: PlaybackHandle, store: &mut AlarmStore) {
        if !self.engine.finished(handle) {
            return;
        }
        if self.preview == Some(handle) {
            self.preview = None;
        } else if self.current == Some(handle) {
            self.current = None;
            if let Some(alarm) = self.slot.active.take() {
                debug!("{} played to the end", alarm.id);
                self.alerts.push(Alert::Finished(alarm.id));
            }
            self.drain(store);
        }
    }

    /// Cuts the line: stops whatever is playing and starts the pending alarm `id`.
    pub fn play_pending_now(
        &mut self,
        id: AlarmId,
        store: &mut AlarmStore,
    ) -> Result<(), ArbiterError> {
        let index = self
            .slot
            .pending
            .iter()
            .position(|alarm| alarm.id == id)
            .ok_or(ArbiterError::NotPending(id))?;
        let Some(alarm) = self.slot.pending.remove(index) else {
            return Err(ArbiterError::NotPending(id));
        };
        let interrupting = !self.slot.is_idle();
        self.stop_active();
        if !self.activate(alarm, interrupting, store) {
            self.drain(store);
        }
        Ok(())
    }

    /// Stops the ringing alarm. Returns `false` when nothing was ringing.
    pub fn dismiss(&mut self, store: &mut AlarmStore) -> bool {
        if self.stop_active().is_none() {
            return false;
        }
        self.drain(store);
        true
    }

    /// Stops the ringing alarm and moves it `minutes` later so it rings again today.
    ///
    /// Returns the rescheduled alarm, or `None` when nothing was ringing.
    pub fn snooze(&mut self, minutes: u16, store: &mut AlarmStore) -> Option<Alarm> {
        let stopped = self.stop_active()?;
        let snoozed = store.get_mut(stopped.id).map(|alarm| {
            alarm.time = alarm.time.add_minutes(minutes);
            alarm.played_today = false;
            alarm.clone()
        });
        match &snoozed {
            Some(alarm) => {
                info!("snoozed {} until {}", alarm.id, alarm.time);
                self.alerts.push(Alert::Snoozed(alarm.clone()));
            }
            None => warn!("{} was deleted while ringing, nothing to snooze", stopped.id),
        }
        self.drain(store);
        snoozed
    }

    /// Drops every trace of an alarm that was removed from the store.
    pub fn forget(&mut self, id: AlarmId, store: &mut AlarmStore) {
        if self.slot.active.as_ref().is_some_and(|alarm| alarm.id == id) {
            self.stop_active();
            self.drain(store);
        } else {
            self.slot.pending.retain(|alarm| alarm.id != id);
        }
    }

    /// Plays a sound once so it can be heard before saving an alarm.
    pub fn preview(
        &mut self,
        sound: &SoundSpec,
        volume: Volume,
    ) -> Result<PlaybackHandle, ArbiterError> {
        if !self.slot.is_idle() {
            return Err(ArbiterError::Busy);
        }
        self.stop_preview();
        let handle = self.engine.start(sound, volume, false)?;
        self.preview = Some(handle);
        Ok(handle)
    }

    pub fn shutdown(&mut self) {
        self.engine.stop_all();
        self.current = None;
        self.preview = None;
        self.slot = PlaybackSlot::default();
        debug!("arbiter shut down");
    }

    fn stop_preview(&mut self) {
        if let Some(handle) = self.preview.take() {
            self.engine.stop(handle);
        }
    }

    fn stop_active(&mut self) -> Option<Alarm> {
        if let Some(handle) = self.current.take() {
            self.engine.stop(handle);
        }
        let alarm = self.slot.active.take()?;
        debug!("stopped {}", alarm.id);
        self.alerts.push(Alert::Stopped(alarm.id));
        Some(alarm)
    }

    /// Starts the next pending alarm, skipping any that fail to play.
    fn drain(&mut self, store: &mut AlarmStore) {
        while self.slot.is_idle() {
            let Some(next) = self.slot.pending.pop_front() else {
                break;
            };
            self.activate(next, false, store);
        }
    }

    /// Puts `alarm` into the empty slot. A failed start leaves the slot empty
    /// and returns `false`; the alarm still counts as played today.
    fn activate(&mut self, alarm: Alarm, interrupting: bool, store: &mut AlarmStore) -> bool {
        self.stop_preview();
        if !store.mark_played(alarm.id) {
            debug!("{} is gone from the store, skipping", alarm.id);
            return false;
        }
        match self
            .engine
            .start(&alarm.sound, alarm.volume, alarm.interrupts_others)
        {
            Ok(handle) => {
                info!("ringing {} {}", alarm.id, alarm.describe());
                self.notify(&alarm, interrupting);
                self.current = Some(handle);
                self.alerts.push(Alert::Ringing {
                    alarm: alarm.clone(),
                    interrupting,
                });
                self.slot.active = Some(alarm);
                true
            }
            Err(e) => {
                warn!("couldn't play {}: {e}", alarm.id);
                self.alerts.push(Alert::PlaybackFailed {
                    id: Some(alarm.id),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn notify(&self, alarm: &Alarm, interrupting: bool) {
        if !self.notifications {
            return;
        }
        if let Err(e) = self
            .notifier
            .notify(&Notification::for_alarm(alarm, interrupting))
        {
            debug!("{e}");
        }
    }
}
