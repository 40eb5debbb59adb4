use std::{fmt, ops::AddAssign, str::FromStr};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::sound::Pattern;

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid time {0:?}, expected HH:MM or hh:mm AM/PM")]
    Time(String),
    #[error("unknown weekday {0:?}, expected one of MON TUE WED THU FRI SAT SUN")]
    Weekday(String),
    #[error("volume {0} is out of range 0-10")]
    Volume(u8),
    #[error("unknown sound {0:?}")]
    Sound(String),
}

/// Stable identity of an alarm, assigned by the [`AlarmStore`](crate::store::AlarmStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(pub u64);

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Meridiem {
    #[default]
    AM,
    PM,
}

impl fmt::Display for Meridiem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AM => "AM",
            Self::PM => "PM",
        })
    }
}

/// A wall clock time with minute resolution, kept as minutes since midnight.
///
/// Comparisons and arithmetic only ever look at the integer; the 12 hour form
/// is produced by [`fmt::Display`] for the user facing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self(0);

    #[must_use]
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    /// `hour` is on the 12 hour dial, so 12 AM is midnight and 12 PM is noon.
    #[must_use]
    pub const fn from_hm12(hour: u8, minute: u8, meridiem: Meridiem) -> Option<Self> {
        if hour == 0 || hour > 12 {
            return None;
        }
        let hour = match (meridiem, hour) {
            (Meridiem::AM, 12) => 0,
            (Meridiem::AM, h) => h,
            (Meridiem::PM, 12) => 12,
            (Meridiem::PM, h) => h + 12,
        };
        Self::new(hour, minute)
    }

    #[must_use]
    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn minutes(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    #[must_use]
    pub const fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    #[must_use]
    pub const fn meridiem(self) -> Meridiem {
        if self.hour() >= 12 {
            Meridiem::PM
        } else {
            Meridiem::AM
        }
    }

    #[must_use]
    pub const fn hour12(self) -> u8 {
        match self.hour() % 12 {
            0 => 12,
            h => h,
        }
    }

    /// wraps around past midnight
    #[must_use]
    pub const fn add_minutes(self, minutes: u16) -> Self {
        Self(((self.0 as u32 + minutes as u32) % MINUTES_PER_DAY as u32) as u16)
    }

    #[must_use]
    pub fn to_24h(self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} {}",
            self.hour12(),
            self.minute(),
            self.meridiem()
        )
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::Time(s.to_string());
        let trimmed = s.trim();
        let (clock, meridiem) = match trimmed.rsplit_once(char::is_whitespace) {
            Some((clock, suffix)) => {
                let meridiem = match suffix.to_ascii_uppercase().as_str() {
                    "AM" => Meridiem::AM,
                    "PM" => Meridiem::PM,
                    _ => return Err(err()),
                };
                (clock.trim(), Some(meridiem))
            }
            None => (trimmed, None),
        };
        let (hour, minute) = clock.split_once(':').ok_or_else(err)?;
        let hour = hour.parse::<u8>().map_err(|_| err())?;
        let minute = minute.parse::<u8>().map_err(|_| err())?;
        match meridiem {
            Some(meridiem) => Self::from_hm12(hour, minute, meridiem),
            None => Self::new(hour, minute),
        }
        .ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_24h()
    }
}

/// Upper case three letter tag used in config files and the CLI.
#[must_use]
pub const fn weekday_tag(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

pub fn parse_weekday(tag: &str) -> Result<Weekday, ParseError> {
    match tag.trim().to_ascii_uppercase().as_str() {
        "MON" => Ok(Weekday::Mon),
        "TUE" => Ok(Weekday::Tue),
        "WED" => Ok(Weekday::Wed),
        "THU" => Ok(Weekday::Thu),
        "FRI" => Ok(Weekday::Fri),
        "SAT" => Ok(Weekday::Sat),
        "SUN" => Ok(Weekday::Sun),
        _ => Err(ParseError::Weekday(tag.to_string())),
    }
}

/// Set of days an alarm rings on. An empty set means the alarm is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Weekdays(u8);

impl Weekdays {
    pub const NONE: Self = Self(0);
    pub const WORKDAYS: Self = Self(0b001_1111);
    pub const EVERY_DAY: Self = Self(0b111_1111);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    #[must_use]
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Days in calendar order, Monday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        let mut day = Weekday::Mon;
        (0..7).filter_map(move |_| {
            let current = day;
            day = day.succ();
            self.contains(current).then_some(current)
        })
    }
}

impl FromIterator<Weekday> for Weekdays {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut days = Self::NONE;
        iter.into_iter().for_each(|day| days.insert(day));
        days
    }
}

impl fmt::Display for Weekdays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len() {
            0 => f.write_str("Inactive"),
            7 => f.write_str("Every day"),
            _ => {
                let tags: Vec<_> = self.iter().map(weekday_tag).collect();
                f.write_str(&tags.join(", "))
            }
        }
    }
}

impl FromStr for Weekdays {
    type Err = ParseError;

    /// Comma separated tags, or one of `none`, `workdays`, `daily`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::NONE),
            "workdays" | "weekdays" => Ok(Self::WORKDAYS),
            "daily" | "every day" | "all" => Ok(Self::EVERY_DAY),
            _ => s.split(',').map(parse_weekday).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for Weekdays {
    type Error = ParseError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        value.iter().map(|tag| parse_weekday(tag)).collect()
    }
}

impl From<Weekdays> for Vec<String> {
    fn from(days: Weekdays) -> Self {
        days.iter().map(|day| weekday_tag(day).to_string()).collect()
    }
}

/// Alarm loudness on a 0 to 10 scale, 0 meaning muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Volume(u8);

impl Volume {
    pub const MUTED: Self = Self(0);
    pub const MAX: Self = Self(10);

    pub fn new(level: u8) -> Result<Self, ParseError> {
        if level <= 10 {
            Ok(Self(level))
        } else {
            Err(ParseError::Volume(level))
        }
    }

    /// levels above the maximum are capped
    #[must_use]
    pub const fn saturating(level: u8) -> Self {
        if level > 10 {
            Self::MAX
        } else {
            Self(level)
        }
    }

    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_muted(self) -> bool {
        self.0 == 0
    }

    /// linear gain in 0.0..=1.0
    #[must_use]
    pub fn gain(self) -> f32 {
        f32::from(self.0) / 10.0
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self.0 {
            0 => "Muted",
            1..=3 => "Low",
            4..=6 => "Medium",
            7..=9 => "High",
            _ => "Max",
        }
    }

    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self.0 {
            0 => "🔇",
            1..=3 => "🔈",
            4..=6 => "🔉",
            _ => "🔊",
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for Volume {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Volume> for u8 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/10 ({})", self.icon(), self.0, self.label())
    }
}

/// What an alarm plays: one of the synthesized patterns or an external sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundSpec {
    Builtin { pattern: Pattern },
    /// `locator` is a path, a `file://` url or a `blob:` reference into the sound library
    External { locator: String },
}

impl SoundSpec {
    /// An external sound without a locator has nothing to play.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        match self {
            Self::Builtin { .. } => true,
            Self::External { locator } => !locator.trim().is_empty(),
        }
    }
}

impl Default for SoundSpec {
    fn default() -> Self {
        Self::Builtin {
            pattern: Pattern::default(),
        }
    }
}

impl fmt::Display for SoundSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { pattern } => write!(f, "{}", pattern.display_name()),
            Self::External { locator } if locator.trim().is_empty() => f.write_str("custom (missing)"),
            Self::External { locator } => write!(f, "custom ({locator})"),
        }
    }
}

impl FromStr for SoundSpec {
    type Err = ParseError;

    /// A builtin pattern id, otherwise taken as an external locator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Sound(s.to_string()));
        }
        Ok(s.parse::<Pattern>().map_or_else(
            |_| Self::External {
                locator: s.to_string(),
            },
            |pattern| Self::Builtin { pattern },
        ))
    }
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub name: String,
    pub time: TimeOfDay,
    #[serde(default)]
    pub weekdays: Weekdays,
    #[serde(default)]
    pub sound: SoundSpec,
    #[serde(default)]
    pub volume: Volume,
    #[serde(default)]
    pub interrupts_others: bool,
    #[serde(default = "always_true")]
    pub enabled: bool,
    #[serde(skip)]
    pub played_today: bool,
}

impl Alarm {
    /// Alarms without any weekday never ring.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.weekdays.is_empty()
    }

    /// Everything but the time and day checks that decides if the alarm may ring.
    #[must_use]
    pub fn is_armed(&self, all_enabled: bool) -> bool {
        all_enabled
            && self.enabled
            && self.is_active()
            && !self.played_today
            && !self.volume.is_muted()
            && self.sound.is_playable()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Unnamed"
        } else {
            &self.name
        }
    }

    /// notification body, e.g. `Morning Chime - 07:00 AM (🔉 Medium)`
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} - {} ({} {})",
            self.display_name(),
            self.time,
            self.volume.icon(),
            self.volume.label()
        )
    }
}

impl AddAssign for Alarm {
    /// used so that when we edit an alarm we don't lose its id
    /// or whether it already rang today
    fn add_assign(&mut self, rhs: Self) {
        self.name = rhs.name;
        self.time = rhs.time;
        self.weekdays = rhs.weekdays;
        self.sound = rhs.sound;
        self.volume = rhs.volume;
        self.interrupts_others = rhs.interrupts_others;
        self.enabled = rhs.enabled;
    }
}

/// Alarm fields as the user enters them, before the store hands out an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmBuilder {
    pub name: String,
    pub hour: u8,
    pub minute: u8,
    pub meridiem: Meridiem,
    pub weekdays: Weekdays,
    pub sound: SoundSpec,
    pub volume: Volume,
    pub interrupts_others: bool,
}

impl Default for AlarmBuilder {
    fn default() -> Self {
        Self {
            name: Pattern::default().display_name().to_string(),
            hour: 7,
            minute: 0,
            meridiem: Meridiem::AM,
            weekdays: Weekdays::WORKDAYS,
            sound: SoundSpec::default(),
            volume: Volume::default(),
            interrupts_others: false,
        }
    }
}

impl AlarmBuilder {
    pub fn time(mut self, time: TimeOfDay) -> Self {
        self.hour = time.hour12();
        self.minute = time.minute();
        self.meridiem = time.meridiem();
        self
    }

    pub fn weekdays(mut self, days: Weekdays) -> Self {
        self.weekdays = days;
        self
    }

    pub fn build(self, id: AlarmId) -> Result<Alarm, ParseError> {
        let time = TimeOfDay::from_hm12(self.hour, self.minute, self.meridiem).ok_or_else(|| {
            ParseError::Time(format!("{}:{:02} {}", self.hour, self.minute, self.meridiem))
        })?;
        Ok(Alarm {
            id,
            name: self.name,
            time,
            weekdays: self.weekdays,
            sound: self.sound,
            volume: self.volume,
            interrupts_others: self.interrupts_others,
            enabled: true,
            played_today: false,
        })
    }
}

impl From<Alarm> for AlarmBuilder {
    fn from(alarm: Alarm) -> Self {
        Self {
            name: alarm.name,
            hour: 0,
            minute: 0,
            meridiem: Meridiem::AM,
            weekdays: alarm.weekdays,
            sound: alarm.sound,
            volume: alarm.volume,
            interrupts_others: alarm.interrupts_others,
        }
        .time(alarm.time)
    }
}
