use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::logic::derive_status;
use crate::types::Task;

/// `nextDueIn` substitute for tasks without one: sorts after everything real.
const MISSING_NEXT_DUE: f64 = 9999.0;

/// Active filter selections, as picked in the dashboard controls.
/// Supply names are stored lowercased; matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub room: Option<String>,
    pub category: Option<String>,
    pub due_only: bool,
    pub supplies: BTreeSet<String>,
}

impl Filters {
    pub fn with_supply(mut self, name: &str) -> Self {
        self.supplies.insert(name.to_lowercase());
        self
    }
}

/// Sort modes offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// DEAD -> OVERDUE -> DUE -> COMING -> FRESH, then soonest, then name
    #[default]
    Status,
    /// Alphabetical by room
    Room,
    /// Ascending by days until due
    Soonest,
}

impl SortMode {
    /// Parse a query-string value; anything unknown falls back to status.
    pub fn from_param(s: &str) -> Self {
        match s {
            "room" => SortMode::Room,
            "soonest" => SortMode::Soonest,
            _ => SortMode::Status,
        }
    }

    pub fn as_param(self) -> &'static str {
        match self {
            SortMode::Status => "status",
            SortMode::Room => "room",
            SortMode::Soonest => "soonest",
        }
    }
}

/// First filter stage: room, category, due-only. The supplies panel is
/// collected from this intermediate list, so it runs before the supply
/// filter itself.
pub fn base_filter<'a>(tasks: &'a [Task], filters: &Filters) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| match &filters.room {
            Some(room) => t.room.as_deref() == Some(room.as_str()),
            None => true,
        })
        .filter(|t| match &filters.category {
            Some(cat) => t.category.as_deref() == Some(cat.as_str()),
            None => true,
        })
        .filter(|t| !filters.due_only || t.overdue || t.next_due_in == Some(0.0))
        .collect()
}

/// True when the task carries every selected supply.
/// An empty selection matches everything.
pub fn has_all_supplies(t: &Task, wanted: &BTreeSet<String>) -> bool {
    if wanted.is_empty() {
        return true;
    }
    let have: BTreeSet<String> = t.supplies().iter().map(|s| s.to_lowercase()).collect();
    wanted.iter().all(|w| have.contains(w))
}

/// Second filter stage: keep tasks matching the active supply selection.
pub fn supply_filter<'a>(tasks: Vec<&'a Task>, filters: &Filters) -> Vec<&'a Task> {
    tasks
        .into_iter()
        .filter(|t| has_all_supplies(t, &filters.supplies))
        .collect()
}

/// Unique supply names across the given tasks, in first-appearance order
/// with first-seen casing. Feeds the supplies chip panel.
pub fn collect_supplies(tasks: &[&Task]) -> Vec<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    for t in tasks {
        for item in t.supplies() {
            if seen.insert(item.to_lowercase()) {
                out.push(item);
            }
        }
    }
    out
}

fn safe_next(t: &Task) -> f64 {
    t.next_due_in
        .filter(|v| v.is_finite())
        .unwrap_or(MISSING_NEXT_DUE)
}

/// Sort in place. `sort_by` is stable, so equal tasks keep their input
/// order and snapshots stay deterministic.
pub fn sort_tasks(tasks: &mut [&Task], mode: SortMode) {
    tasks.sort_by(|a, b| match mode {
        SortMode::Room => a
            .room
            .as_deref()
            .unwrap_or("")
            .cmp(b.room.as_deref().unwrap_or("")),
        SortMode::Soonest => safe_next(a).total_cmp(&safe_next(b)),
        SortMode::Status => derive_status(a)
            .rank()
            .cmp(&derive_status(b).rank())
            .then_with(|| safe_next(a).total_cmp(&safe_next(b)))
            .then_with(|| compare_names(&a.task, &b.task)),
    });
}

/// Full pipeline: both filter stages, then the sort.
pub fn filter_and_sort<'a>(tasks: &'a [Task], filters: &Filters, mode: SortMode) -> Vec<&'a Task> {
    let mut list = supply_filter(base_filter(tasks, filters), filters);
    sort_tasks(&mut list, mode);
    list
}

/// Case-insensitive name comparison, with the original casing as the
/// final tie-break so the order is total.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Distinct room names, sorted, for the room select.
pub fn distinct_rooms(tasks: &[Task]) -> Vec<String> {
    let set: BTreeSet<String> = tasks.iter().filter_map(|t| t.room.clone()).collect();
    set.into_iter().collect()
}

/// Distinct category names, sorted, for the category select.
pub fn distinct_categories(tasks: &[Task]) -> Vec<String> {
    let set: BTreeSet<String> = tasks.iter().filter_map(|t| t.category.clone()).collect();
    set.into_iter().collect()
}
