use std::cmp::Reverse;

use crate::{alarm::Alarm, clock::TimeSample, store::AlarmStore};

/// Alarms that should ring for this sample.
///
/// Only an exact minute match counts, so a minute that no tick observed is
/// skipped rather than caught up. The result is ordered: alarms that
/// interrupt come first, then ascending id. Letting the interrupting alarms
/// start first means alarms due in the same tick queue up behind them instead
/// of being cut off straight away.
#[must_use]
pub fn due_alarms(sample: TimeSample, store: &AlarmStore, all_enabled: bool) -> Vec<Alarm> {
    let mut due: Vec<Alarm> = store
        .iter()
        .filter(|alarm| is_due(alarm, sample, all_enabled))
        .cloned()
        .collect();
    due.sort_by_key(|alarm| (Reverse(alarm.interrupts_others), alarm.id));
    due
}

#[must_use]
pub fn is_due(alarm: &Alarm, sample: TimeSample, all_enabled: bool) -> bool {
    alarm.time == sample.minute
        && alarm.weekdays.contains(sample.weekday)
        && alarm.is_armed(all_enabled)
}
