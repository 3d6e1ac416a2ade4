use crate::{error::DeckResult, model::ChartData};

/// Where an edit session delivers its output.
///
/// `commit` receives the full working dataset; `live` distinguishes
/// keystroke-time preview commits from the final commit that ends a burst.
/// `push_snapshot` receives the pre-burst dataset for the host's undo stack.
pub trait CommitSink {
    fn commit(&mut self, data: &ChartData, live: bool) -> DeckResult<()>;
    fn push_snapshot(&mut self, prior: &ChartData) -> DeckResult<()>;
}

/// Guarantees at most one undo snapshot per edit burst.
///
/// A burst opens with [`begin_burst`](Self::begin_burst) carrying the state
/// to restore on undo, and every commit path calls
/// [`ensure_snapshot`](Self::ensure_snapshot) first. The captured flag only
/// flips after the sink accepts the snapshot, so a failed push is retried by
/// the next commit instead of being lost.
#[derive(Debug, Default)]
pub struct SnapshotGate {
    prior: Option<ChartData>,
    captured: bool,
}

impl SnapshotGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-edit state. A burst already in progress keeps its
    /// original prior state.
    pub fn begin_burst(&mut self, prior: &ChartData) {
        if self.prior.is_none() {
            self.prior = Some(prior.clone());
            self.captured = false;
        }
    }

    /// Replace the burst's restore state. A no-op once the snapshot has
    /// been pushed (the host already holds the old prior) or when no burst
    /// is in progress.
    pub fn rebase_prior(&mut self, prior: &ChartData) {
        if !self.captured && self.prior.is_some() {
            self.prior = Some(prior.clone());
        }
    }

    /// Push the pending snapshot if it has not been delivered yet.
    pub fn ensure_snapshot<S: CommitSink>(&mut self, sink: &mut S) -> DeckResult<()> {
        if self.captured {
            return Ok(());
        }
        if let Some(prior) = &self.prior {
            sink.push_snapshot(prior)?;
            self.captured = true;
        }
        Ok(())
    }

    /// End the burst. The next `begin_burst` starts a fresh one.
    pub fn reset(&mut self) {
        self.prior = None;
        self.captured = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;

    #[derive(Default)]
    struct Sink {
        snapshots: Vec<ChartData>,
        failures_left: usize,
    }

    impl CommitSink for Sink {
        fn commit(&mut self, _data: &ChartData, _live: bool) -> DeckResult<()> {
            Ok(())
        }

        fn push_snapshot(&mut self, prior: &ChartData) -> DeckResult<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(DeckError::commit("sink unavailable"));
            }
            self.snapshots.push(prior.clone());
            Ok(())
        }
    }

    fn data(label: &str) -> ChartData {
        ChartData {
            labels: vec![label.to_string()],
            series: vec![],
        }
    }

    #[test]
    fn snapshot_is_pushed_once_per_burst() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();

        gate.begin_burst(&data("before"));
        gate.ensure_snapshot(&mut sink).unwrap();
        gate.ensure_snapshot(&mut sink).unwrap();
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots.len(), 1);
        assert_eq!(sink.snapshots[0].labels, vec!["before"]);
    }

    #[test]
    fn later_begin_burst_keeps_original_prior() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();

        gate.begin_burst(&data("first"));
        gate.begin_burst(&data("second"));
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots[0].labels, vec!["first"]);
    }

    #[test]
    fn reset_allows_a_new_burst() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();

        gate.begin_burst(&data("a"));
        gate.ensure_snapshot(&mut sink).unwrap();
        gate.reset();
        gate.begin_burst(&data("b"));
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[1].labels, vec!["b"]);
    }

    #[test]
    fn failed_push_is_retried_not_dropped() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink {
            failures_left: 1,
            ..Sink::default()
        };

        gate.begin_burst(&data("x"));
        assert!(gate.ensure_snapshot(&mut sink).is_err());
        gate.ensure_snapshot(&mut sink).unwrap();
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots.len(), 1);
    }

    #[test]
    fn rebase_before_capture_replaces_the_prior() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();

        gate.begin_burst(&data("stale"));
        gate.rebase_prior(&data("merged"));
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots[0].labels, vec!["merged"]);
    }

    #[test]
    fn rebase_after_capture_is_a_no_op() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();

        gate.begin_burst(&data("kept"));
        gate.ensure_snapshot(&mut sink).unwrap();
        gate.rebase_prior(&data("late"));
        gate.reset();
        gate.begin_burst(&data("next"));
        gate.ensure_snapshot(&mut sink).unwrap();

        assert_eq!(sink.snapshots[0].labels, vec!["kept"]);
        assert_eq!(sink.snapshots[1].labels, vec!["next"]);
    }

    #[test]
    fn no_snapshot_without_a_burst() {
        let mut gate = SnapshotGate::new();
        let mut sink = Sink::default();
        gate.ensure_snapshot(&mut sink).unwrap();
        assert!(sink.snapshots.is_empty());
    }
}
