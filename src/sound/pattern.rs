//! Builtin tone patterns and the source that synthesizes them.

use std::{f32::consts::TAU, fmt, str::FromStr, time::Duration};

use rodio::{ChannelCount, SampleRate, Source};
use serde::{Deserialize, Serialize};

use crate::alarm::ParseError;

pub const SAMPLE_RATE: u32 = 44_100;

/// Level every tone decays to by the end of its duration.
const DECAY_FLOOR: f32 = 0.01;
const ATTACK_SECS: f32 = 0.01;

/// One sine tone inside a pattern, times in seconds from the start of the cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f32,
    pub offset: f32,
    pub duration: f32,
    pub amplitude: f32,
}

const fn tone(frequency: f32, offset: f32, duration: f32, amplitude: f32) -> Tone {
    Tone {
        frequency,
        offset,
        duration,
        amplitude,
    }
}

const CHIME: [Tone; 3] = [
    tone(523.25, 0.0, 0.3, 0.3),
    tone(659.25, 0.1, 0.3, 0.3),
    tone(783.99, 0.2, 0.4, 0.3),
];
const GENTLE: [Tone; 3] = [
    tone(440.0, 0.0, 0.5, 0.2),
    tone(554.37, 0.3, 0.5, 0.2),
    tone(659.25, 0.6, 0.6, 0.2),
];
const BELL: [Tone; 2] = [tone(523.25, 0.0, 1.0, 0.4), tone(523.25, 0.1, 1.0, 0.3)];
const BEEP: [Tone; 3] = [
    tone(880.0, 0.0, 0.1, 0.3),
    tone(880.0, 0.15, 0.1, 0.3),
    tone(880.0, 0.3, 0.1, 0.3),
];
const SOFT: [Tone; 3] = [
    tone(659.25, 0.0, 0.4, 0.25),
    tone(587.33, 0.2, 0.4, 0.25),
    tone(523.25, 0.4, 0.5, 0.25),
];
const BIRDS: [Tone; 5] = [
    tone(2000.0, 0.0, 0.1, 0.15),
    tone(2500.0, 0.15, 0.08, 0.1),
    tone(1800.0, 0.3, 0.12, 0.15),
    tone(2200.0, 0.5, 0.1, 0.1),
    tone(2000.0, 0.7, 0.1, 0.15),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    #[default]
    MorningChime,
    GentleWake,
    SleepBell,
    DigitalBeep,
    SoftChime,
    NatureBirds,
}

impl Pattern {
    pub const ALL: [Self; 6] = [
        Self::MorningChime,
        Self::GentleWake,
        Self::SleepBell,
        Self::DigitalBeep,
        Self::SoftChime,
        Self::NatureBirds,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::MorningChime => "morning-chime",
            Self::GentleWake => "gentle-wake",
            Self::SleepBell => "sleep-bell",
            Self::DigitalBeep => "digital-beep",
            Self::SoftChime => "soft-chime",
            Self::NatureBirds => "nature-birds",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::MorningChime => "Morning Chime",
            Self::GentleWake => "Gentle Wake",
            Self::SleepBell => "Sleep Bell",
            Self::DigitalBeep => "Digital Beep",
            Self::SoftChime => "Soft Chime",
            Self::NatureBirds => "Nature Birds",
        }
    }

    #[must_use]
    pub const fn tones(self) -> &'static [Tone] {
        match self {
            Self::MorningChime => &CHIME,
            Self::GentleWake => &GENTLE,
            Self::SleepBell => &BELL,
            Self::DigitalBeep => &BEEP,
            Self::SoftChime => &SOFT,
            Self::NatureBirds => &BIRDS,
        }
    }

    /// Length of one pass, tones plus the silence before the pattern repeats.
    #[must_use]
    pub const fn cycle(self) -> Duration {
        Duration::from_millis(match self {
            Self::MorningChime => 1500,
            Self::GentleWake | Self::SleepBell | Self::NatureBirds => 2000,
            Self::DigitalBeep => 1000,
            Self::SoftChime => 1800,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Pattern {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|pattern| {
                pattern.id().eq_ignore_ascii_case(wanted)
                    || pattern.display_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ParseError::Sound(s.to_string()))
    }
}

/// Attack then exponential decay, zero outside of the tone.
fn envelope(tone: &Tone, elapsed: f32) -> f32 {
    if elapsed < 0.0 || elapsed >= tone.duration {
        0.0
    } else if elapsed < ATTACK_SECS {
        tone.amplitude * elapsed / ATTACK_SECS
    } else {
        let progress = (elapsed - ATTACK_SECS) / (tone.duration - ATTACK_SECS);
        tone.amplitude * (DECAY_FLOOR / tone.amplitude).powf(progress)
    }
}

/// Mono source rendering a [`Pattern`].
///
/// A looping source repeats the whole cycle, silence included, until it is
/// dropped, so stopping the sink cancels the loop in one go.
#[derive(Debug, Clone)]
pub struct PatternSource {
    tones: &'static [Tone],
    cycle_len: u64,
    position: u64,
    looping: bool,
}

impl PatternSource {
    #[must_use]
    pub fn new(pattern: Pattern, looping: bool) -> Self {
        let cycle_ms = u64::try_from(pattern.cycle().as_millis()).unwrap_or(u64::MAX);
        let cycle_len = cycle_ms.saturating_mul(u64::from(SAMPLE_RATE)) / 1000;
        Self {
            tones: pattern.tones(),
            cycle_len,
            position: 0,
            looping,
        }
    }

    fn sample_at(&self, index: u64) -> f32 {
        let t = index as f32 / SAMPLE_RATE as f32;
        self.tones
            .iter()
            .map(|tone| {
                let elapsed = t - tone.offset;
                envelope(tone, elapsed) * (TAU * tone.frequency * elapsed).sin()
            })
            .sum()
    }
}

impl Iterator for PatternSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.looping && self.position >= self.cycle_len {
            return None;
        }
        let sample = self.sample_at(self.position % self.cycle_len);
        self.position += 1;
        Some(sample)
    }
}

impl Source for PatternSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> ChannelCount {
        1
    }

    fn sample_rate(&self) -> SampleRate {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        if self.looping {
            None
        } else {
            Some(Duration::from_secs_f64(
                self.cycle_len as f64 / f64::from(SAMPLE_RATE),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_lasts_exactly_one_cycle() {
        let source = PatternSource::new(Pattern::MorningChime, false);
        assert_eq!(source.total_duration(), Some(Duration::from_millis(1500)));
        assert_eq!(source.count(), 66_150);
    }

    #[test]
    fn looping_repeats_the_cycle() {
        let cycle = PatternSource::new(Pattern::DigitalBeep, false).count();
        let looping = PatternSource::new(Pattern::DigitalBeep, true);
        assert_eq!(looping.total_duration(), None);
        let samples: Vec<f32> = looping.take(cycle * 2 + 10).collect();
        assert_eq!(samples.len(), cycle * 2 + 10);
        for index in [1, 500, 4_000, 13_300] {
            assert!((samples[index] - samples[index + cycle]).abs() < 1e-6);
        }
    }

    #[test]
    fn silent_after_last_tone_and_never_clips() {
        for pattern in Pattern::ALL {
            let end_of_tones = pattern
                .tones()
                .iter()
                .map(|tone| tone.offset + tone.duration)
                .fold(0.0_f32, f32::max);
            let peak: f32 = pattern.tones().iter().map(|tone| tone.amplitude).sum();
            let samples: Vec<f32> = PatternSource::new(pattern, false).collect();
            let first_silent = (end_of_tones * SAMPLE_RATE as f32).ceil() as usize + 1;
            assert!(
                samples[first_silent..].iter().all(|s| *s == 0.0),
                "{pattern} should be silent after its tones"
            );
            assert!(samples.iter().all(|s| s.abs() <= peak + 1e-3));
            assert!(samples.iter().any(|s| s.abs() > 0.01));
        }
    }

    #[test]
    fn envelope_shape() {
        let tone = tone(440.0, 0.0, 0.5, 0.2);
        assert_eq!(envelope(&tone, -0.1), 0.0);
        assert!((envelope(&tone, ATTACK_SECS / 2.0) - 0.1).abs() < 1e-6);
        assert!((envelope(&tone, ATTACK_SECS) - 0.2).abs() < 1e-6);
        assert!(envelope(&tone, 0.49) < 0.011);
        assert_eq!(envelope(&tone, 0.5), 0.0);
    }

    #[test]
    fn parses_ids_and_names() {
        assert_eq!("sleep-bell".parse::<Pattern>().unwrap(), Pattern::SleepBell);
        assert_eq!("Nature Birds".parse::<Pattern>().unwrap(), Pattern::NatureBirds);
        assert!("kazoo".parse::<Pattern>().is_err());
    }
}
