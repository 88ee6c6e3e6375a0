use serde::Serialize;
use std::fmt;

use crate::types::Task;

/// Fraction of the cycle at which a task starts counting as COMING.
/// Single-sourced: every call site must read this constant.
pub const COMING_FRAC: f64 = 0.92;

/// Days past the interval before an overdue task is written off as DEAD.
pub const DEAD_GRACE_DAYS: f64 = 7.0;

/// Sentinel `usedFrac` for overdue tasks: just past 100%, so progress
/// bars drawn from it clamp to full instead of overflowing.
pub const OVERDUE_FRAC: f64 = 1.01;

/// How many days late an overdue task is. Zero for anything not overdue;
/// missing operands count as zero.
pub fn days_over(t: &Task) -> f64 {
    if t.overdue {
        (t.days_since.unwrap_or(0.0) - t.freq.unwrap_or(0.0)).max(0.0)
    } else {
        0.0
    }
}

/// Fraction of the task's cycle consumed.
///
/// Overdue tasks pin to the 1.01 sentinel regardless of magnitude. Tasks
/// without a usable `freq`/`daysSince` pair report 0 — no data reads as
/// fresh, never as an error.
pub fn used_frac(t: &Task) -> f64 {
    if t.overdue {
        return OVERDUE_FRAC;
    }
    match (t.freq, t.days_since) {
        (Some(freq), Some(days)) if freq > 0.0 => days / freq,
        _ => 0.0,
    }
}

/// Due today: not overdue and exactly zero days remain.
pub fn is_due(t: &Task) -> bool {
    !t.overdue && t.next_due_in == Some(0.0)
}

/// Overdue past the grace window.
pub fn is_dead(t: &Task) -> bool {
    t.overdue && days_over(t) > DEAD_GRACE_DAYS
}

/// Most of the cycle is gone but the task is not yet due.
pub fn is_coming(t: &Task) -> bool {
    !t.overdue && !is_due(t) && used_frac(t) >= COMING_FRAC
}

/// The five mutually exclusive task states, ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Dead,
    Overdue,
    Due,
    Coming,
    Fresh,
}

impl Status {
    /// Sort rank. The gap between COMING and FRESH is historical spacing
    /// in the sheet scripts, kept for parity; only the ordering matters.
    pub fn rank(self) -> u8 {
        match self {
            Status::Dead => 0,
            Status::Overdue => 1,
            Status::Due => 2,
            Status::Coming => 3,
            Status::Fresh => 9,
        }
    }

    /// Lowercase name, used for CSS class suffixes.
    pub fn slug(self) -> &'static str {
        match self {
            Status::Dead => "dead",
            Status::Overdue => "overdue",
            Status::Due => "due",
            Status::Coming => "coming",
            Status::Fresh => "fresh",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Dead => "DEAD",
            Status::Overdue => "OVERDUE",
            Status::Due => "DUE",
            Status::Coming => "COMING",
            Status::Fresh => "FRESH",
        };
        write!(f, "{label}")
    }
}

/// Classify a task into exactly one status.
///
/// DEAD is a strict subset of OVERDUE but must be checked first: it is
/// the more specific, more urgent label.
pub fn derive_status(t: &Task) -> Status {
    if is_dead(t) {
        Status::Dead
    } else if t.overdue {
        Status::Overdue
    } else if is_due(t) {
        Status::Due
    } else if is_coming(t) {
        Status::Coming
    } else {
        Status::Fresh
    }
}

/// Aggregate totals for the counter pills and the health bar.
///
/// `overdue` counts DEAD together with plain OVERDUE (dead implies
/// overdue); `dead` is reported separately and overlaps with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub total: usize,
    pub overdue: usize,
    pub due: usize,
    pub coming: usize,
    pub dead: usize,
    pub ok: usize,
    pub pct: u32,
}

pub fn compute_counts(tasks: &[Task]) -> Counts {
    let total = tasks.len();
    let overdue = tasks.iter().filter(|t| t.overdue).count();
    let due = tasks.iter().filter(|t| is_due(t)).count();
    let coming = tasks.iter().filter(|t| is_coming(t)).count();
    let dead = tasks.iter().filter(|t| is_dead(t)).count();

    // Dead tasks are already inside `overdue`, so they are not added again
    let pending = overdue + due + coming;
    let ok = total.saturating_sub(pending);
    let pct = if total > 0 {
        ((ok as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };

    Counts {
        total,
        overdue,
        due,
        coming,
        dead,
        ok,
        pct,
    }
}

/// KPI row figures: due today, overdue, total, and the mean delay in days
/// across overdue tasks with a known `daysSince` (one decimal, floored
/// at zero).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Kpi {
    pub today: usize,
    pub overdue: usize,
    pub total: usize,
    pub avg_delay: f64,
}

pub fn metrics(tasks: &[Task]) -> Kpi {
    let today = tasks
        .iter()
        .filter(|t| !t.overdue && t.next_due_in == Some(0.0))
        .count();
    let overdue = tasks.iter().filter(|t| t.overdue).count();
    let total = tasks.len();

    let delays: Vec<f64> = tasks
        .iter()
        .filter(|t| t.overdue && t.days_since.is_some())
        .map(|t| t.days_since.unwrap_or(0.0) - t.freq.unwrap_or(0.0))
        .collect();

    let avg = if delays.is_empty() {
        0.0
    } else {
        delays.iter().sum::<f64>() / delays.len() as f64
    };

    Kpi {
        today,
        overdue,
        total,
        avg_delay: ((avg * 10.0).round() / 10.0).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bare task with just the fields the classifier reads
    fn make_task(
        overdue: bool,
        freq: Option<f64>,
        days_since: Option<f64>,
        next_due_in: Option<f64>,
    ) -> Task {
        Task {
            room: None,
            category: None,
            task: "test".to_string(),
            freq,
            days_since,
            next_due_in,
            overdue,
            last_done: None,
            articles: String::new(),
            row: None,
        }
    }

    // ========== classifier tests ==========

    #[test]
    fn test_days_over_only_when_overdue() {
        let t = make_task(false, Some(10.0), Some(20.0), Some(1.0));
        assert_eq!(days_over(&t), 0.0);

        let t = make_task(true, Some(10.0), Some(14.0), None);
        assert_eq!(days_over(&t), 4.0);
    }

    #[test]
    fn test_days_over_clamped_and_missing_operands() {
        // daysSince < freq still clamps at zero
        let t = make_task(true, Some(10.0), Some(8.0), None);
        assert_eq!(days_over(&t), 0.0);

        // missing operands count as zero
        let t = make_task(true, None, Some(3.0), None);
        assert_eq!(days_over(&t), 3.0);
        let t = make_task(true, None, None, None);
        assert_eq!(days_over(&t), 0.0);
    }

    #[test]
    fn test_used_frac_overdue_sentinel() {
        let t = make_task(true, Some(10.0), Some(500.0), None);
        assert_eq!(used_frac(&t), OVERDUE_FRAC);
    }

    #[test]
    fn test_used_frac_ratio() {
        let t = make_task(false, Some(10.0), Some(3.0), Some(7.0));
        assert_eq!(used_frac(&t), 0.3);
    }

    #[test]
    fn test_used_frac_no_data_is_fresh() {
        assert_eq!(used_frac(&make_task(false, None, Some(3.0), None)), 0.0);
        assert_eq!(used_frac(&make_task(false, Some(10.0), None, None)), 0.0);
        assert_eq!(used_frac(&make_task(false, Some(0.0), Some(3.0), None)), 0.0);
        assert_eq!(
            used_frac(&make_task(false, Some(-5.0), Some(3.0), None)),
            0.0
        );
    }

    #[test]
    fn test_is_due_exact_zero_only() {
        assert!(is_due(&make_task(false, Some(7.0), Some(7.0), Some(0.0))));
        // 0.5 should not occur upstream, but it is not "due"
        assert!(!is_due(&make_task(false, Some(7.0), Some(7.0), Some(0.5))));
        assert!(!is_due(&make_task(false, Some(7.0), Some(7.0), None)));
        // overdue tasks are never DUE
        assert!(!is_due(&make_task(true, Some(7.0), Some(9.0), Some(0.0))));
    }

    #[test]
    fn test_dead_grace_threshold_boundary() {
        // daysOver = 7 exactly: still OVERDUE
        let t = make_task(true, Some(10.0), Some(17.0), None);
        assert!(!is_dead(&t));
        assert_eq!(derive_status(&t), Status::Overdue);

        // daysOver = 8: DEAD
        let t = make_task(true, Some(10.0), Some(18.0), None);
        assert!(is_dead(&t));
        assert_eq!(derive_status(&t), Status::Dead);
    }

    #[test]
    fn test_coming_boundary_is_at_0_92() {
        // usedFrac = 0.92 exactly -> COMING
        let t = make_task(false, Some(10.0), Some(9.2), Some(1.0));
        assert!(is_coming(&t));
        assert_eq!(derive_status(&t), Status::Coming);

        // just under
        let t = make_task(false, Some(10.0), Some(9.1), Some(1.0));
        assert!(!is_coming(&t));
        assert_eq!(derive_status(&t), Status::Fresh);
    }

    #[test]
    fn test_coming_excludes_due_and_overdue() {
        // due today with a full cycle consumed is DUE, not COMING
        let t = make_task(false, Some(7.0), Some(7.0), Some(0.0));
        assert!(!is_coming(&t));
        assert_eq!(derive_status(&t), Status::Due);

        let t = make_task(true, Some(7.0), Some(8.0), None);
        assert!(!is_coming(&t));
    }

    // ========== derivation tests ==========

    #[test]
    fn test_derive_status_is_total_and_exclusive() {
        let cases = vec![
            make_task(true, Some(10.0), Some(20.0), None),
            make_task(true, Some(3.0), Some(5.0), None),
            make_task(false, Some(7.0), Some(7.0), Some(0.0)),
            make_task(false, Some(10.0), Some(10.0), Some(1.0)),
            make_task(false, Some(10.0), Some(1.0), Some(5.0)),
            make_task(false, None, None, None),
            make_task(true, None, None, None),
        ];

        for t in &cases {
            // exactly one predicate family backs the derived label
            let status = derive_status(t);
            let matches = [
                (Status::Dead, is_dead(t)),
                (Status::Overdue, t.overdue && !is_dead(t)),
                (Status::Due, is_due(t)),
                (Status::Coming, is_coming(t)),
                (
                    Status::Fresh,
                    !t.overdue && !is_due(t) && !is_coming(t),
                ),
            ];
            let hits: Vec<Status> = matches
                .iter()
                .filter(|(_, hit)| *hit)
                .map(|(s, _)| *s)
                .collect();
            assert_eq!(hits, vec![status], "task {t:?}");
        }
    }

    #[test]
    fn test_dead_implies_overdue() {
        let t = make_task(true, Some(10.0), Some(30.0), None);
        assert_eq!(derive_status(&t), Status::Dead);
        assert!(t.overdue);
    }

    #[test]
    fn test_no_data_derives_fresh() {
        let t = make_task(false, None, None, None);
        assert_eq!(derive_status(&t), Status::Fresh);
    }

    #[test]
    fn test_status_rank_ordering() {
        assert_eq!(Status::Dead.rank(), 0);
        assert_eq!(Status::Overdue.rank(), 1);
        assert_eq!(Status::Due.rank(), 2);
        assert_eq!(Status::Coming.rank(), 3);
        assert_eq!(Status::Fresh.rank(), 9);
    }

    #[test]
    fn test_status_display_and_slug() {
        assert_eq!(Status::Dead.to_string(), "DEAD");
        assert_eq!(Status::Fresh.to_string(), "FRESH");
        assert_eq!(Status::Overdue.slug(), "overdue");
    }

    // ========== compute_counts tests ==========

    #[test]
    fn test_counts_empty() {
        let counts = compute_counts(&[]);
        assert_eq!(
            counts,
            Counts {
                total: 0,
                overdue: 0,
                due: 0,
                coming: 0,
                dead: 0,
                ok: 0,
                pct: 0,
            }
        );
    }

    #[test]
    fn test_counts_one_of_each_status() {
        let tasks = vec![
            make_task(true, Some(10.0), Some(20.0), None), // DEAD
            make_task(true, Some(3.0), Some(5.0), None),   // OVERDUE
            make_task(false, Some(7.0), Some(7.0), Some(0.0)), // DUE
            make_task(false, Some(10.0), Some(10.0), Some(1.0)), // COMING
            make_task(false, Some(10.0), Some(1.0), Some(5.0)), // FRESH
        ];

        let counts = compute_counts(&tasks);
        assert_eq!(counts.total, 5);
        // overdue counts DEAD and OVERDUE together
        assert_eq!(counts.overdue, 2);
        assert_eq!(counts.due, 1);
        assert_eq!(counts.coming, 1);
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.ok, 1);
        assert_eq!(counts.pct, 20);
    }

    #[test]
    fn test_counts_ok_never_negative() {
        // every task pending in two categories would push ok below zero
        // if it were not clamped
        let tasks = vec![make_task(true, Some(3.0), Some(5.0), None)];
        let counts = compute_counts(&tasks);
        assert_eq!(counts.ok, 0);
        assert_eq!(counts.pct, 0);
    }

    #[test]
    fn test_counts_all_fresh() {
        let tasks = vec![
            make_task(false, Some(10.0), Some(1.0), Some(9.0)),
            make_task(false, Some(10.0), Some(2.0), Some(8.0)),
        ];
        let counts = compute_counts(&tasks);
        assert_eq!(counts.ok, 2);
        assert_eq!(counts.pct, 100);
    }

    // ========== metrics tests ==========

    #[test]
    fn test_metrics_basic() {
        let tasks = vec![
            make_task(false, Some(7.0), Some(7.0), Some(0.0)), // today
            make_task(true, Some(10.0), Some(14.0), None),     // 4 days late
            make_task(true, Some(10.0), Some(17.0), None),     // 7 days late
            make_task(false, Some(10.0), Some(1.0), Some(5.0)),
        ];

        let kpi = metrics(&tasks);
        assert_eq!(kpi.today, 1);
        assert_eq!(kpi.overdue, 2);
        assert_eq!(kpi.total, 4);
        assert_eq!(kpi.avg_delay, 5.5);
    }

    #[test]
    fn test_metrics_ignores_overdue_without_days_since() {
        let tasks = vec![
            make_task(true, Some(10.0), None, None),
            make_task(true, Some(10.0), Some(13.0), None),
        ];
        let kpi = metrics(&tasks);
        assert_eq!(kpi.overdue, 2);
        assert_eq!(kpi.avg_delay, 3.0);
    }

    #[test]
    fn test_metrics_no_overdue_avg_zero() {
        let tasks = vec![make_task(false, Some(10.0), Some(1.0), Some(5.0))];
        assert_eq!(metrics(&tasks).avg_delay, 0.0);
    }

    #[test]
    fn test_metrics_avg_floored_at_zero() {
        // overdue flag set while daysSince < freq: negative delay, floored
        let tasks = vec![make_task(true, Some(10.0), Some(6.0), None)];
        assert_eq!(metrics(&tasks).avg_delay, 0.0);
    }
}
