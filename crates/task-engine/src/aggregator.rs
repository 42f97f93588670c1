//! C2 — Progress Aggregator: §4.2's deterministic strategy table, pure and
//! allocation-free.

use task_core::{ProgressInfo, Status, Strategy};

/// `CalculateOverallStatus`. `T==0` always short-circuits to `pending`,
/// regardless of strategy.
pub fn overall_status(strategy: Strategy, progress: &ProgressInfo) -> Status {
    let t = progress.total_children;
    let c = progress.completed_count;
    let f = progress.failed_count;
    let r = progress.running_count;

    if t == 0 {
        return Status::Pending;
    }

    match strategy {
        Strategy::WaitAll => {
            if c == t {
                Status::Success
            } else if r > 0 {
                Status::Running
            } else if f > 0 {
                Status::Failed
            } else {
                Status::Pending
            }
        }
        Strategy::FailFast => {
            if f > 0 {
                Status::Failed
            } else if c == t {
                Status::Success
            } else if r > 0 {
                Status::Running
            } else {
                Status::Pending
            }
        }
        Strategy::BestEffort => {
            if c + f == t {
                if c > 0 {
                    Status::Success
                } else {
                    Status::Failed
                }
            } else if r > 0 {
                Status::Running
            } else {
                Status::Pending
            }
        }
        Strategy::Race => {
            if c > 0 {
                Status::Success
            } else if f == t {
                Status::Failed
            } else if r > 0 {
                Status::Running
            } else {
                Status::Pending
            }
        }
    }
}

/// `IsComplete(strategy)`: true iff the computed status is terminal.
pub fn is_complete(strategy: Strategy, progress: &ProgressInfo) -> bool {
    matches!(
        overall_status(strategy, progress),
        Status::Success | Status::Failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total: u32, completed: u32, failed: u32, running: u32, pending: u32) -> ProgressInfo {
        ProgressInfo::new(total, completed, failed, running, pending)
    }

    #[test]
    fn zero_total_is_always_pending() {
        let p = progress(0, 0, 0, 0, 0);
        for s in [Strategy::WaitAll, Strategy::FailFast, Strategy::BestEffort, Strategy::Race] {
            assert_eq!(overall_status(s, &p), Status::Pending);
            assert!(!is_complete(s, &p));
        }
    }

    #[test]
    fn wait_all_table() {
        assert_eq!(overall_status(Strategy::WaitAll, &progress(3, 3, 0, 0, 0)), Status::Success);
        assert_eq!(overall_status(Strategy::WaitAll, &progress(3, 1, 0, 2, 0)), Status::Running);
        assert_eq!(overall_status(Strategy::WaitAll, &progress(3, 1, 2, 0, 0)), Status::Failed);
        assert_eq!(overall_status(Strategy::WaitAll, &progress(3, 0, 0, 0, 3)), Status::Pending);
    }

    #[test]
    fn fail_fast_table() {
        assert_eq!(overall_status(Strategy::FailFast, &progress(3, 1, 1, 1, 0)), Status::Failed);
        assert_eq!(overall_status(Strategy::FailFast, &progress(3, 3, 0, 0, 0)), Status::Success);
        assert_eq!(overall_status(Strategy::FailFast, &progress(3, 1, 0, 2, 0)), Status::Running);
        assert_eq!(overall_status(Strategy::FailFast, &progress(3, 0, 0, 0, 3)), Status::Pending);
    }

    #[test]
    fn best_effort_table() {
        assert_eq!(overall_status(Strategy::BestEffort, &progress(3, 2, 1, 0, 0)), Status::Success);
        assert_eq!(overall_status(Strategy::BestEffort, &progress(3, 0, 3, 0, 0)), Status::Failed);
        assert_eq!(overall_status(Strategy::BestEffort, &progress(3, 0, 1, 2, 0)), Status::Running);
        assert_eq!(overall_status(Strategy::BestEffort, &progress(3, 0, 0, 0, 3)), Status::Pending);
    }

    #[test]
    fn race_table() {
        assert_eq!(overall_status(Strategy::Race, &progress(3, 1, 0, 2, 0)), Status::Success);
        assert_eq!(overall_status(Strategy::Race, &progress(3, 0, 3, 0, 0)), Status::Failed);
        assert_eq!(overall_status(Strategy::Race, &progress(3, 0, 0, 2, 1)), Status::Running);
        assert_eq!(overall_status(Strategy::Race, &progress(3, 0, 0, 0, 3)), Status::Pending);
    }

    #[test]
    fn is_complete_matches_terminal_statuses() {
        assert!(is_complete(Strategy::WaitAll, &progress(3, 3, 0, 0, 0)));
        assert!(is_complete(Strategy::WaitAll, &progress(3, 1, 2, 0, 0)));
        assert!(!is_complete(Strategy::WaitAll, &progress(3, 1, 0, 2, 0)));
    }
}
