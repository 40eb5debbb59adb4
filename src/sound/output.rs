use std::{fs::File, io::BufReader, time::Duration};

use log::{debug, info};
use rodio::{
    decoder, ChannelCount, OutputStream, OutputStreamBuilder, Sample, SampleRate, Sink, Source,
};

use super::{AudioBackend, OnEnd, PatternSource, Playable, SoundError};

/// Plays through the default output device.
///
/// The device is opened on the first playback and kept open afterwards; each
/// playback gets its own [`Sink`], which is dropped on [`AudioBackend::halt`].
#[derive(Default)]
pub struct RodioOutput {
    stream: Option<OutputStream>,
    sink: Option<Sink>,
}

impl RodioOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&OutputStream, SoundError> {
        if self.stream.is_none() {
            let stream = OutputStreamBuilder::open_default_stream()
                .map_err(|e| SoundError::Device(e.to_string()))?;
            info!("opened default audio output");
            self.stream = Some(stream);
        }
        self.stream
            .as_ref()
            .ok_or_else(|| SoundError::Device("no output stream".to_string()))
    }

    fn append<S>(&mut self, source: S, gain: f32, on_end: OnEnd) -> Result<(), SoundError>
    where
        S: Source + Send + 'static,
    {
        let sink = Sink::connect_new(self.stream()?.mixer());
        sink.set_volume(gain);
        sink.append(NotifyOnEnd::new(source, on_end));
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }
}

impl AudioBackend for RodioOutput {
    fn play(
        &mut self,
        playable: Playable,
        gain: f32,
        looping: bool,
        on_end: OnEnd,
    ) -> Result<(), SoundError> {
        self.halt();
        match playable {
            Playable::Pattern(pattern) => {
                self.append(PatternSource::new(pattern, looping), gain, on_end)
            }
            Playable::File(path) => {
                let file = File::open(&path).map_err(|e| SoundError::Decode {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                let input = decoder::Decoder::new(BufReader::new(file)).map_err(|e| {
                    SoundError::Decode {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })?;
                debug!("decoded {}", path.display());
                if looping {
                    // create source that repeatedly plays the sound
                    self.append(input.repeat_infinite(), gain, on_end)
                } else {
                    self.append(input, gain, on_end)
                }
            }
        }
    }

    fn halt(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

/// Passes `inner` through and runs a callback once it is exhausted.
///
/// Dropping the source early, which is what stopping a sink does, skips the
/// callback.
struct NotifyOnEnd<S> {
    inner: S,
    on_end: Option<OnEnd>,
}

impl<S> NotifyOnEnd<S> {
    fn new(inner: S, on_end: OnEnd) -> Self {
        Self {
            inner,
            on_end: Some(on_end),
        }
    }
}

impl<S: Source> Iterator for NotifyOnEnd<S> {
    type Item = Sample;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next();
        if next.is_none() {
            if let Some(on_end) = self.on_end.take() {
                on_end();
            }
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S: Source> Source for NotifyOnEnd<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> ChannelCount {
        self.inner.channels()
    }

    fn sample_rate(&self) -> SampleRate {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
