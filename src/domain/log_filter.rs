use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};

/// Query predicates for reading entries back from a backend.
///
/// Every condition that is set must hold. Both time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub contains: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    #[must_use]
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    #[must_use]
    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        let needle = self.contains.as_deref().unwrap_or_default();
        if !needle.is_empty() && !entry.message.contains(needle) {
            return false;
        }
        if self.start_time.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        true
    }

    /// Level selection plus filter; `None` selects every level.
    pub fn selects(&self, level: Option<LogLevel>, entry: &LogEntry) -> bool {
        level.is_none_or(|level| entry.level == level) && self.matches(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry_at(secs: i64, message: &str) -> LogEntry {
        LogEntry::new(
            LogLevel::Info,
            message,
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(LogFilter::new().matches(&entry_at(0, "anything")));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let entry = entry_at(10, "edge");
        let exact = LogFilter::new().since(entry.timestamp).until(entry.timestamp);
        assert!(exact.matches(&entry));

        let after = LogFilter::new().since(entry.timestamp + Duration::seconds(1));
        assert!(!after.matches(&entry));

        let before = LogFilter::new().until(entry.timestamp - Duration::seconds(1));
        assert!(!before.matches(&entry));
    }

    #[test]
    fn test_predicates_are_anded() {
        let entry = entry_at(5, "disk almost full");
        let filter = LogFilter::new()
            .since(entry.timestamp - Duration::seconds(1))
            .containing("disk");
        assert!(filter.matches(&entry));
        assert!(!filter.clone().containing("network").matches(&entry));
    }

    #[test]
    fn test_level_selection() {
        let entry = entry_at(0, "x");
        let filter = LogFilter::new();
        assert!(filter.selects(None, &entry));
        assert!(filter.selects(Some(LogLevel::Info), &entry));
        assert!(!filter.selects(Some(LogLevel::Error), &entry));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn any_level() -> impl Strategy<Value = LogLevel> {
            proptest::sample::select(LogLevel::ALL.to_vec())
        }

        fn at(secs: i64) -> DateTime<Utc> {
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
        }

        proptest! {
            #[test]
            fn selects_is_conjunction_of_predicates(
                entry_level in any_level(),
                wanted in proptest::option::of(any_level()),
                ts in 0i64..100,
                start in proptest::option::of(0i64..100),
                end in proptest::option::of(0i64..100),
                message in "[a-c]{0,6}",
                needle in proptest::option::of("[a-c]{0,2}"),
            ) {
                let entry = LogEntry::new(entry_level, message.clone(), at(ts));
                let mut filter = LogFilter::new();
                if let Some(s) = start {
                    filter = filter.since(at(s));
                }
                if let Some(e) = end {
                    filter = filter.until(at(e));
                }
                if let Some(n) = &needle {
                    filter = filter.containing(n.clone());
                }

                let expected = wanted.is_none_or(|l| l == entry_level)
                    && start.is_none_or(|s| s <= ts)
                    && end.is_none_or(|e| ts <= e)
                    && needle.as_deref().is_none_or(|n| message.contains(n));
                prop_assert_eq!(filter.selects(wanted, &entry), expected);
            }
        }
    }
}
