/*!
Auto-save rotation.

Auto-saves are named `<prefix>_<index>_<timestamp>`, for example
`autosave_02_20261018T143005120`. The slot index and a millisecond timestamp
are both part of the name, so the rotation state can be rebuilt from a plain
directory listing and "oldest" never depends on file modification times.
*/

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use std::fmt;
use tracing::{debug, info};

use crate::storage::StorageAdapter;
use crate::{Result, SaveError};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Parsed auto-save name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveName {
    pub prefix: String,
    pub index: u32,
    pub timestamp: DateTime<Utc>,
}

impl AutoSaveName {
    pub fn new<S: Into<String>>(prefix: S, index: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.into(),
            index,
            timestamp: truncate_to_millis(timestamp),
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{}_{:02}_{}{:03}",
            self.prefix,
            self.index,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.timestamp.timestamp_subsec_millis()
        )
    }

    /// Parse `name` as an auto-save written with `prefix`. Other names give
    /// `None`.
    pub fn parse(name: &str, prefix: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
        let (index, stamp) = rest.split_once('_')?;
        if index.len() < 2 || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if stamp.len() != 18 || !stamp.is_ascii() {
            return None;
        }
        let (seconds, millis) = stamp.split_at(15);
        if !millis.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let naive = NaiveDateTime::parse_from_str(seconds, TIMESTAMP_FORMAT).ok()?;
        let millis: i64 = millis.parse().ok()?;
        Some(Self {
            prefix: prefix.to_string(),
            index: index.parse().ok()?,
            timestamp: Utc.from_utc_datetime(&naive) + Duration::milliseconds(millis),
        })
    }
}

impl fmt::Display for AutoSaveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = timestamp.timestamp_subsec_millis() * 1_000_000;
    timestamp.with_nanosecond(nanos).unwrap_or(timestamp)
}

/// Keeps at most `slots` auto-saves, cycling the slot index.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    prefix: String,
    slots: u32,
    next_slot: u32,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RotationPolicy {
    pub fn new<S: Into<String>>(prefix: S, slots: u32) -> Result<Self> {
        let prefix = prefix.into();
        if slots == 0 {
            return Err(SaveError::validation("auto-save slots must be at least 1"));
        }
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(SaveError::validation(format!(
                "invalid auto-save prefix '{prefix}'"
            )));
        }
        Ok(Self {
            prefix,
            slots,
            next_slot: 0,
            last_timestamp: None,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn next_slot(&self) -> u32 {
        self.next_slot
    }

    /// Auto-saves among `names`, newest first.
    pub fn auto_saves<'a, I>(&self, names: I) -> Vec<AutoSaveName>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut saves: Vec<AutoSaveName> = names
            .into_iter()
            .filter_map(|name| AutoSaveName::parse(name, &self.prefix))
            .collect();
        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        saves
    }

    /// Rebuild rotation state from the names already in the store.
    pub fn recover<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let saves = self.auto_saves(names);
        match saves.first() {
            Some(latest) => {
                self.next_slot = (latest.index + 1) % self.slots;
                self.last_timestamp = Some(latest.timestamp);
                debug!(
                    found = saves.len(),
                    latest = %latest,
                    next_slot = self.next_slot,
                    "Recovered auto-save rotation"
                );
            }
            None => {
                self.next_slot = 0;
                self.last_timestamp = None;
            }
        }
    }

    /// Name for the next auto-save. Timestamps never repeat or go backwards,
    /// even if the wall clock does.
    pub fn next_save_name(&mut self, now: DateTime<Utc>) -> AutoSaveName {
        let mut timestamp = truncate_to_millis(now);
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::milliseconds(1);
            }
        }
        self.last_timestamp = Some(timestamp);
        AutoSaveName::new(self.prefix.clone(), self.next_slot, timestamp)
    }

    /// Record `saved` as the most recent auto-save and delete the oldest
    /// ones until exactly `slots` remain. Returns the pruned names.
    pub fn after_save<S>(&mut self, saved: &AutoSaveName, store: &S) -> Result<Vec<String>>
    where
        S: StorageAdapter + ?Sized,
    {
        self.next_slot = (saved.index + 1) % self.slots;

        let names = store.list()?;
        let saves = self.auto_saves(&names);
        let mut pruned = Vec::new();
        for stale in saves.iter().skip(self.slots as usize) {
            let name = stale.format();
            if store.delete(&name)? {
                pruned.push(name);
            }
        }
        if !pruned.is_empty() {
            info!(pruned = pruned.len(), kept = self.slots, "Pruned old auto-saves");
        }
        Ok(pruned)
    }
}

/// Interval timer driving periodic auto-saves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoSaveTimer {
    pub interval: f64,
    pub elapsed: f64,
}

impl AutoSaveTimer {
    /// A timer firing every `interval` seconds; zero or less disables it.
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            elapsed: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval > 0.0
    }

    /// Advance by `dt` seconds and report whether a save is due. Time does
    /// not accumulate while paused, and one long step fires only once.
    pub fn tick(&mut self, dt: f64, paused: bool) -> bool {
        if paused || !self.is_enabled() || !dt.is_finite() || dt <= 0.0 {
            return false;
        }
        self.elapsed += dt;
        if self.elapsed >= self.interval {
            self.elapsed = 0.0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 14, 30, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_name_format_and_parse() {
        let name = AutoSaveName::new("autosave", 2, at(5_120));
        assert_eq!(name.format(), "autosave_02_20261018T143005120");

        let parsed = AutoSaveName::parse(&name.format(), "autosave").unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_prefix_with_underscores() {
        let name = AutoSaveName::new("my_auto", 11, at(0));
        let parsed = AutoSaveName::parse(&name.format(), "my_auto").unwrap();
        assert_eq!(parsed.index, 11);
        assert!(AutoSaveName::parse(&name.format(), "my").is_none());
    }

    #[test]
    fn test_parse_rejects_other_names() {
        for name in [
            "campaign",
            "autosave",
            "autosave_1_20261018T143005120",
            "autosave_01_2026",
            "autosave_01_20261018T1430051x0",
            "autosave_xx_20261018T143005120",
            "quicksave",
        ] {
            assert!(AutoSaveName::parse(name, "autosave").is_none(), "{name}");
        }
    }

    #[test]
    fn test_recover_uses_newest_timestamp() {
        let names: Vec<String> = vec![
            AutoSaveName::new("autosave", 0, at(0)).format(),
            AutoSaveName::new("autosave", 1, at(3_000)).format(),
            AutoSaveName::new("autosave", 2, at(1_000)).format(),
            "campaign".to_string(),
        ];
        let mut policy = RotationPolicy::new("autosave", 3).unwrap();
        policy.recover(&names);
        assert_eq!(policy.next_slot(), 2);

        let mut fresh = RotationPolicy::new("autosave", 3).unwrap();
        fresh.recover(&Vec::<String>::new());
        assert_eq!(fresh.next_slot(), 0);
    }

    #[test]
    fn test_recover_wraps_slot_index() {
        let names = vec![AutoSaveName::new("autosave", 2, at(0)).format()];
        let mut policy = RotationPolicy::new("autosave", 3).unwrap();
        policy.recover(&names);
        assert_eq!(policy.next_slot(), 0);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut policy = RotationPolicy::new("autosave", 3).unwrap();
        let first = policy.next_save_name(at(500));
        let second = policy.next_save_name(at(500));
        let third = policy.next_save_name(at(100));
        assert!(second.timestamp > first.timestamp);
        assert!(third.timestamp > second.timestamp);
        assert_ne!(first.format(), second.format());
    }

    #[test]
    fn test_after_save_keeps_newest_slots() {
        let store = MemoryStore::new();
        store.write("campaign", b"manual").unwrap();
        let mut policy = RotationPolicy::new("autosave", 3).unwrap();

        let mut written = Vec::new();
        for i in 0..5 {
            let name = policy.next_save_name(at(i * 1_000));
            store.write(&name.format(), b"auto").unwrap();
            policy.after_save(&name, &store).unwrap();
            written.push(name);
        }

        let mut remaining = store.list().unwrap();
        remaining.sort();
        let mut expected: Vec<String> = written[2..].iter().map(|n| n.format()).collect();
        expected.push("campaign".to_string());
        expected.sort();
        assert_eq!(remaining, expected);
        assert_eq!(policy.next_slot(), 5 % 3);
    }

    #[test]
    fn test_after_save_reports_pruned_names() {
        let store = MemoryStore::new();
        let mut policy = RotationPolicy::new("autosave", 1).unwrap();
        let old = policy.next_save_name(at(0));
        store.write(&old.format(), b"a").unwrap();
        let new = policy.next_save_name(at(1));
        store.write(&new.format(), b"b").unwrap();

        let pruned = policy.after_save(&new, &store).unwrap();
        assert_eq!(pruned, vec![old.format()]);
        assert_eq!(policy.next_slot(), 0);
    }

    #[test]
    fn test_zero_slots_rejected() {
        assert!(matches!(
            RotationPolicy::new("autosave", 0),
            Err(SaveError::Validation(_))
        ));
    }

    #[test]
    fn test_timer_fires_once_per_interval() {
        let mut timer = AutoSaveTimer::new(10.0);
        assert!(!timer.tick(4.0, false));
        assert!(!timer.tick(4.0, false));
        assert!(timer.tick(4.0, false));
        assert_eq!(timer.elapsed, 0.0);

        assert!(timer.tick(35.0, false));
        assert!(!timer.tick(1.0, false));
    }

    #[test]
    fn test_timer_skips_while_paused() {
        let mut timer = AutoSaveTimer::new(5.0);
        assert!(!timer.tick(100.0, true));
        assert_eq!(timer.elapsed, 0.0);
        assert!(!AutoSaveTimer::new(0.0).tick(100.0, false));
    }
}
