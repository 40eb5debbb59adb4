use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, AlarmBuilder, AlarmId, ParseError, TimeOfDay, Weekdays};

/// Ordered collection of alarms, kept in insertion order.
///
/// Serializes as a plain list so the config file stays a `[[alarms]]` array.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(from = "Vec<Alarm>", into = "Vec<Alarm>")]
pub struct AlarmStore {
    alarms: Vec<Alarm>,
    next_id: u64,
}

/// An existing alarm that rings in the same minute on some of the same days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub id: AlarmId,
    pub time: TimeOfDay,
    pub days: Weekdays,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.time, self.days)
    }
}

impl AlarmStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> AlarmId {
        self.next_id += 1;
        AlarmId(self.next_id)
    }

    pub fn add(&mut self, builder: AlarmBuilder) -> Result<AlarmId, ParseError> {
        let id = self.allocate_id();
        let alarm = builder.build(id)?;
        self.alarms.push(alarm);
        Ok(id)
    }

    /// Inserts a fully formed alarm, replacing the fields of an existing one with the same id.
    ///
    /// Returns `true` if an existing alarm was edited.
    pub fn upsert(&mut self, alarm: Alarm) -> bool {
        if let Some(existing) = self.get_mut(alarm.id) {
            *existing += alarm;
            true
        } else {
            self.next_id = self.next_id.max(alarm.id.0);
            self.alarms.push(alarm);
            false
        }
    }

    pub fn remove(&mut self, id: AlarmId) -> Option<Alarm> {
        let index = self.alarms.iter().position(|alarm| alarm.id == id)?;
        Some(self.alarms.remove(index))
    }

    #[must_use]
    pub fn get(&self, id: AlarmId) -> Option<&Alarm> {
        self.alarms.iter().find(|alarm| alarm.id == id)
    }

    pub fn get_mut(&mut self, id: AlarmId) -> Option<&mut Alarm> {
        self.alarms.iter_mut().find(|alarm| alarm.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// The one mutation the scheduler makes: returns `false` if the alarm was deleted meanwhile.
    pub fn mark_played(&mut self, id: AlarmId) -> bool {
        self.get_mut(id).map_or(false, |alarm| {
            alarm.played_today = true;
            true
        })
    }

    pub fn reset_played(&mut self) {
        self.alarms
            .iter_mut()
            .for_each(|alarm| alarm.played_today = false);
    }

    /// Alarms ordered by time of day, for listing.
    #[must_use]
    pub fn sorted_by_time(&self) -> Vec<&Alarm> {
        let mut sorted: Vec<_> = self.alarms.iter().collect();
        sorted.sort_by_key(|alarm| (alarm.time, alarm.id));
        sorted
    }

    /// Other alarms set to the same minute on overlapping days. Inactive alarms never conflict.
    #[must_use]
    pub fn conflicts(
        &self,
        time: TimeOfDay,
        days: Weekdays,
        exclude: Option<AlarmId>,
    ) -> Vec<Conflict> {
        if days.is_empty() {
            return vec![];
        }
        self.alarms
            .iter()
            .filter(|alarm| Some(alarm.id) != exclude && alarm.time == time)
            .filter_map(|alarm| {
                let overlap = alarm.weekdays.intersection(days);
                (!overlap.is_empty()).then_some(Conflict {
                    id: alarm.id,
                    time: alarm.time,
                    days: overlap,
                })
            })
            .collect()
    }
}

impl From<Vec<Alarm>> for AlarmStore {
    fn from(value: Vec<Alarm>) -> Self {
        let mut store = Self::new();
        value.into_iter().for_each(|alarm| {
            // a duplicated id in a hand edited file is re-numbered rather than merged
            if store.get(alarm.id).is_some() {
                let id = store.allocate_id();
                store.alarms.push(Alarm { id, ..alarm });
            } else {
                store.upsert(alarm);
            }
        });
        store
    }
}

impl From<AlarmStore> for Vec<Alarm> {
    fn from(store: AlarmStore) -> Self {
        store.alarms
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::alarm::Volume;

    fn at(time: &str, days: &str) -> AlarmBuilder {
        AlarmBuilder::default().time(time.parse().unwrap()).weekdays(days.parse().unwrap())
    }

    #[test]
    fn ids_are_never_reused() {
        let mut store = AlarmStore::new();
        let first = store.add(at("07:00", "mon")).unwrap();
        let second = store.add(at("08:00", "mon")).unwrap();
        store.remove(second);
        let third = store.add(at("09:00", "mon")).unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn loading_continues_numbering_after_highest_id() {
        let mut store = AlarmStore::new();
        store.add(at("07:00", "mon")).unwrap();
        let mut alarms: Vec<Alarm> = store.into();
        alarms[0].id = AlarmId(41);
        let mut store = AlarmStore::from(alarms);
        assert_eq!(store.add(at("08:00", "tue")).unwrap(), AlarmId(42));
    }

    #[test]
    fn duplicate_ids_are_renumbered() {
        let mut store = AlarmStore::new();
        let id = store.add(at("07:00", "mon")).unwrap();
        let alarm = store.get(id).unwrap().clone();
        let store = AlarmStore::from(vec![alarm.clone(), alarm]);
        let ids: Vec<_> = store.iter().map(|alarm| alarm.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn upsert_merges_edits() {
        let mut store = AlarmStore::new();
        let id = store.add(at("07:00", "mon")).unwrap();
        store.mark_played(id);
        let mut edited = store.get(id).unwrap().clone();
        edited.volume = Volume::MAX;
        edited.played_today = false;
        assert!(store.upsert(edited));
        let alarm = store.get(id).unwrap();
        assert_eq!(alarm.volume, Volume::MAX);
        assert!(alarm.played_today, "edits do not touch the played flag");
    }

    #[test]
    fn mark_and_reset_played() {
        let mut store = AlarmStore::new();
        let id = store.add(at("07:00", "mon")).unwrap();
        assert!(store.mark_played(id));
        assert!(!store.mark_played(AlarmId(1000)));
        store.reset_played();
        assert!(!store.get(id).unwrap().played_today);
    }

    #[test]
    fn sorted_by_time_ignores_insertion_order() {
        let mut store = AlarmStore::new();
        store.add(at("09:00 PM", "mon")).unwrap();
        store.add(at("07:00 AM", "mon")).unwrap();
        store.add(at("12:30 PM", "mon")).unwrap();
        let times: Vec<_> = store
            .sorted_by_time()
            .iter()
            .map(|alarm| alarm.time.to_string())
            .collect();
        assert_eq!(times, ["07:00 AM", "12:30 PM", "09:00 PM"]);
    }

    #[test]
    fn conflicts_need_same_minute_and_shared_day() {
        let mut store = AlarmStore::new();
        let weekday = store.add(at("07:00", "mon,tue")).unwrap();
        store.add(at("07:00", "none")).unwrap();
        store.add(at("07:01", "mon")).unwrap();

        let time = "07:00".parse().unwrap();
        let conflicts = store.conflicts(time, "tue,sun".parse().unwrap(), None);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, weekday);
        assert!(conflicts[0].days.contains(Weekday::Tue));
        assert_eq!(conflicts[0].to_string(), "07:00 AM on TUE");

        assert!(store.conflicts(time, "tue".parse().unwrap(), Some(weekday)).is_empty());
        assert!(store.conflicts(time, Weekdays::NONE, None).is_empty());
    }
}
