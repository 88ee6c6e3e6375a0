use serde::Serialize;

use crate::logic::{derive_status, used_frac, Status};
use crate::types::{fmt_date, Task};

/// Everything a render target needs to draw one card.
///
/// Pure data: the DOM/terminal/static-HTML consumer decides how to paint
/// it. Equality is what the reconciler uses to detect in-place updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardModel {
    /// Identity key (`room|category|task`), stable across refreshes
    pub key: String,
    /// Stable hex id for element ids
    pub dom_id: String,
    pub title: String,
    pub meta: String,
    pub supplies: Vec<String>,
    pub status: Status,
    /// CSS frame class; FRESH cards carry no frame
    pub frame: Option<&'static str>,
    /// Progress bar width, clamped to 0..=100
    pub progress_pct: u8,
    pub progress_color: &'static str,
    pub due_label: String,
    pub since_label: String,
    /// Sheet row for the mark-done write-back, if known
    pub row: Option<i64>,
}

/// Progress bar width: usedFrac as a percentage, clamped so the overdue
/// 1.01 sentinel still draws as a full bar.
pub fn pct_of(t: &Task) -> u8 {
    (used_frac(t) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Bar color for a task's current state.
pub fn color_of(status: Status) -> &'static str {
    match status {
        Status::Dead => "dead",
        Status::Overdue => "red",
        Status::Due => "yellow",
        Status::Coming => "lime",
        Status::Fresh => "green",
    }
}

fn frame_of(status: Status) -> Option<&'static str> {
    match status {
        Status::Fresh => None,
        other => Some(other.slug()),
    }
}

/// Print a day count the way the sheet shows it: integers without the
/// trailing `.0`, fractional values as-is.
fn fmt_days(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn due_label(t: &Task) -> String {
    if t.overdue {
        let late = t.days_since.unwrap_or(0.0) - t.freq.unwrap_or(0.0);
        format!("OVERDUE by {}d", fmt_days(late))
    } else if t.next_due_in == Some(0.0) {
        "DUE today".to_string()
    } else {
        match t.next_due_in {
            Some(n) => format!("Next in {}d", fmt_days(n)),
            None => "Next in —d".to_string(),
        }
    }
}

fn since_label(t: &Task) -> String {
    match t.days_since {
        Some(d) => format!("Since: {}d", fmt_days(d)),
        None => "Never".to_string(),
    }
}

fn meta_line(t: &Task) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(room) = &t.room {
        parts.push(room.clone());
    }
    if let Some(category) = &t.category {
        parts.push(category.clone());
    }
    parts.push(match t.freq {
        Some(f) => format!("every {}d", fmt_days(f)),
        None => "every ?d".to_string(),
    });
    if let Some(last) = &t.last_done {
        parts.push(format!("last: {}", fmt_date(last)));
    }
    parts.push(match t.row {
        Some(r) => format!("row {r}"),
        None => "row —".to_string(),
    });
    parts.join(" • ")
}

/// Build the view model for one task.
pub fn card_for(t: &Task) -> CardModel {
    let status = derive_status(t);
    CardModel {
        key: t.identity_key(),
        dom_id: t.stable_id(),
        title: t.task.clone(),
        meta: meta_line(t),
        supplies: t.supplies(),
        status,
        frame: frame_of(status),
        progress_pct: pct_of(t),
        progress_color: color_of(status),
        due_label: due_label(t),
        since_label: since_label(t),
        row: t.row,
    }
}

/// Build cards for an already filtered and sorted task list.
pub fn cards_for<'a, I>(tasks: I) -> Vec<CardModel>
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks.into_iter().map(card_for).collect()
}
