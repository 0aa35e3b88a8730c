//! Append-only log of accepted updates for the current epoch.

use crate::update::{Serial, SubmittedUpdate, UpdateEntry};

/// Ordered sequence of accepted updates plus the running serial counter.
///
/// Insertion order is serial order: `entries[i].update.serial == i + 1`
/// within an epoch. Entries are never removed individually; only
/// [`UpdateLog::reset_epoch`] discards history.
#[derive(Debug, Default, Clone)]
pub struct UpdateLog {
    entries: Vec<UpdateEntry>,
    current_serial: Serial,
}

impl UpdateLog {
    /// Creates an empty log at serial 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next serial to `update` and stores it.
    ///
    /// The stored `max_serial` is provisional: it is the log length before
    /// this append plus one, i.e. what the sender itself knows about. Catch-up
    /// deliveries recompute it from the log length at that time.
    pub fn append(&mut self, update: SubmittedUpdate, descr: String) -> UpdateEntry {
        let serial = self.current_serial + 1;
        self.current_serial = serial;
        let max_serial = self.entries.len() as Serial + 1;

        let entry = UpdateEntry {
            update: update.into_update(serial, max_serial),
            descr,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Returns every entry with a serial greater than `from_serial`, each
    /// restamped with the current log length as `max_serial`.
    pub fn catch_up_from(&self, from_serial: Serial) -> Vec<UpdateEntry> {
        let max_serial = self.max_serial();
        let skip = usize::try_from(from_serial).unwrap_or(usize::MAX);
        self.entries
            .iter()
            .skip(skip)
            .map(|entry| entry.restamped(max_serial))
            .collect()
    }

    /// Highest serial currently known to the log.
    pub fn max_serial(&self) -> Serial {
        self.entries.len() as Serial
    }

    /// Serial assigned to the most recent append in this epoch.
    pub fn current_serial(&self) -> Serial {
        self.current_serial
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[UpdateEntry] {
        &self.entries
    }

    /// Drops all history and restarts the counter at 0.
    pub fn reset_epoch(&mut self) {
        self.entries.clear();
        self.current_serial = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_text(log: &mut UpdateLog, text: &str) -> UpdateEntry {
        log.append(SubmittedUpdate::new(text), format!("descr {text}"))
    }

    #[test]
    fn test_append_assigns_consecutive_serials() {
        let mut log = UpdateLog::new();

        let first = append_text(&mut log, "a");
        let second = append_text(&mut log, "b");

        assert_eq!(first.update.serial, 1);
        assert_eq!(first.update.max_serial, 1);
        assert_eq!(second.update.serial, 2);
        assert_eq!(second.update.max_serial, 2);
        assert_eq!(log.current_serial(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_entry_index_matches_serial() {
        let mut log = UpdateLog::new();
        for text in ["a", "b", "c", "d"] {
            append_text(&mut log, text);
        }

        for (index, entry) in log.entries().iter().enumerate() {
            assert_eq!(entry.update.serial, index as Serial + 1);
        }
    }

    #[test]
    fn test_catch_up_restamps_max_serial() {
        let mut log = UpdateLog::new();
        append_text(&mut log, "a");
        append_text(&mut log, "b");
        append_text(&mut log, "c");

        let batch = log.catch_up_from(1);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].update.serial, 2);
        assert_eq!(batch[1].update.serial, 3);
        assert!(batch.iter().all(|entry| entry.update.max_serial == 3));

        // Stored provisional values stay untouched
        assert_eq!(log.entries()[0].update.max_serial, 1);
    }

    #[test]
    fn test_catch_up_beyond_log_is_empty() {
        let mut log = UpdateLog::new();
        append_text(&mut log, "a");

        assert!(log.catch_up_from(1).is_empty());
        assert!(log.catch_up_from(42).is_empty());
        assert!(log.catch_up_from(Serial::MAX).is_empty());
    }

    #[test]
    fn test_reset_epoch_restarts_serials() {
        let mut log = UpdateLog::new();
        append_text(&mut log, "a");
        append_text(&mut log, "b");

        log.reset_epoch();
        assert!(log.is_empty());
        assert_eq!(log.current_serial(), 0);

        let entry = append_text(&mut log, "c");
        assert_eq!(entry.update.serial, 1);
        assert_eq!(entry.update.max_serial, 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_catch_up_returns_suffix(total in 0u64..50, from in 0u64..60) {
            let mut log = UpdateLog::new();
            for n in 0..total {
                log.append(SubmittedUpdate::new(n), String::new());
            }

            let serials: Vec<Serial> = log
                .catch_up_from(from)
                .iter()
                .map(|entry| entry.update.serial)
                .collect();
            let expected: Vec<Serial> = (from + 1..=total).collect();
            proptest::prop_assert_eq!(serials, expected);
        }
    }
}
