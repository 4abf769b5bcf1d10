use chrono::{NaiveTime, Timelike as _, Weekday};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Display, sync::Arc, time::Duration};

/// Immutable view of the blocking policy.
///
/// Loops only ever see a snapshot behind an [`Arc`]; a configuration change builds a new one and
/// swaps it in whole through [`ConfigUpdater`].
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Master switch, productive time is never active while this is off
    pub enabled: bool,
    pub active_days: HashSet<Weekday>,
    pub time_windows: Vec<TimeWindow>,
    pub denylist: Denylist,
    pub scan_interval: Duration,
    pub notification_cooldown: Duration,
}

/// Inclusive `HH:MM`-`HH:MM` range within a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Start and end as minutes since midnight, `None` if either side is not `HH:MM`.
    pub fn minutes(&self) -> Option<(u32, u32)> {
        Some((parse_minutes(&self.start)?, parse_minutes(&self.end)?))
    }

    /// Windows ending before they start would need to wrap past midnight, which is not supported.
    pub fn is_overnight(&self) -> bool {
        matches!(self.minutes(), Some((start, end)) if start > end)
    }
}

impl Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn parse_minutes(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Process names subject to termination, compared case-insensitively and exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist(HashSet<String>);

impl Denylist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, process_name: &str) -> bool {
        self.0.contains(&process_name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Implemented by every component that reads a [`ConfigSnapshot`] while running.
///
/// Swapping never stops or restarts the component, the next unit of work just reads the new
/// snapshot.
pub trait ConfigUpdater {
    fn update_config(&self, snapshot: Arc<ConfigSnapshot>);
}

/// The snapshot pointer a component reads from, guarded for read-or-swap only.
#[derive(Debug)]
pub struct SharedConfig(RwLock<Arc<ConfigSnapshot>>);

impl SharedConfig {
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self(RwLock::new(snapshot))
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.0.read())
    }

    /// Installs `snapshot` and hands back the one it replaced.
    pub fn replace(&self, snapshot: Arc<ConfigSnapshot>) -> Arc<ConfigSnapshot> {
        std::mem::replace(&mut *self.0.write(), snapshot)
    }
}

#[cfg(test)]
pub(crate) fn test_snapshot() -> ConfigSnapshot {
    ConfigSnapshot {
        enabled: true,
        active_days: HashSet::from([Weekday::Mon]),
        time_windows: vec![TimeWindow::new("09:00", "12:00")],
        denylist: Denylist::new(["chrome.exe"]),
        scan_interval: Duration::from_secs(5),
        notification_cooldown: Duration::from_secs(60),
    }
}
