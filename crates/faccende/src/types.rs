use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single recurring chore, as normalized from the task source.
///
/// Numeric fields are `Option` because the backing sheet regularly ships
/// blanks and stringified numbers; anything that does not parse becomes
/// `None` so downstream logic fails open toward FRESH instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Location grouping key
    pub room: Option<String>,

    /// Category, used for supply matching and card meta
    pub category: Option<String>,

    /// Display name; part of the identity key
    pub task: String,

    /// Intended interval in days between completions
    pub freq: Option<f64>,

    /// Days elapsed since last completion (None = never done)
    #[serde(rename = "daysSince")]
    pub days_since: Option<f64>,

    /// Days until next due date; 0 means due today
    #[serde(rename = "nextDueIn")]
    pub next_due_in: Option<f64>,

    /// Upstream flag: the task has passed its due date
    pub overdue: bool,

    /// ISO-ish date string of last completion, display only
    #[serde(rename = "lastDone")]
    pub last_done: Option<String>,

    /// Free-text supply list, comma/newline separated
    pub articles: String,

    /// Backing spreadsheet row, used for the mark-done write-back
    pub row: Option<i64>,
}

/// One task exactly as the sheet endpoint sends it, before validation.
/// Every field is kept as a raw JSON value so a single malformed cell
/// cannot fail the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTask {
    #[serde(default)]
    pub room: Value,
    #[serde(default)]
    pub category: Value,
    #[serde(default)]
    pub task: Value,
    #[serde(default)]
    pub freq: Value,
    #[serde(rename = "daysSince", default)]
    pub days_since: Value,
    #[serde(rename = "nextDueIn", default)]
    pub next_due_in: Value,
    #[serde(default)]
    pub overdue: Value,
    #[serde(rename = "lastDone", default)]
    pub last_done: Value,
    // The backend has shipped the supply list under both names
    #[serde(default)]
    pub items: Value,
    #[serde(rename = "Artykuły", default)]
    pub artykuly: Value,
    #[serde(default)]
    pub row: Value,
    #[serde(rename = "row_id", default)]
    pub row_id: Value,
}

/// The `{ "tasks": [...] }` payload returned by the task source.
#[derive(Debug, Default, Deserialize)]
pub struct TaskFeed {
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

/// Normalize a raw JSON value to a number.
///
/// Null, empty string and anything non-numeric map to `None`; `0` stays
/// `Some(0.0)` — zero is never conflated with "missing".
pub fn norm_num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Normalize a raw JSON value to a non-empty string.
pub fn norm_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a raw JSON value to a boolean, JS-truthiness style.
pub fn norm_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            s == "true" || s == "1"
        }
        _ => false,
    }
}

impl Task {
    /// Validate a raw sheet row into a `Task`.
    ///
    /// Returns `None` for rows without a task name — the sheet pads its
    /// range with empty rows and those are not chores.
    pub fn from_raw(raw: &RawTask) -> Option<Self> {
        let task = norm_str(&raw.task)?;

        let articles = norm_str(&raw.items)
            .or_else(|| norm_str(&raw.artykuly))
            .unwrap_or_default();

        // `row` wins over the legacy `row_id` when both are present
        let row = norm_num(&raw.row)
            .or_else(|| norm_num(&raw.row_id))
            .map(|n| n as i64);

        Some(Task {
            room: norm_str(&raw.room),
            category: norm_str(&raw.category),
            task,
            freq: norm_num(&raw.freq),
            days_since: norm_num(&raw.days_since),
            next_due_in: norm_num(&raw.next_due_in),
            overdue: norm_bool(&raw.overdue),
            last_done: norm_str(&raw.last_done),
            articles,
            row,
        })
    }

    /// Identity key for matching tasks across refresh cycles.
    ///
    /// `room|category|task`, never the row number: the backing sheet may
    /// renumber rows between two fetches, and a renumbered task must stay
    /// the same card.
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.room.as_deref().unwrap_or(""),
            self.category.as_deref().unwrap_or(""),
            self.task
        )
    }

    /// Stable 8-character hex id derived from the identity key.
    /// Used for DOM element ids.
    pub fn stable_id(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.identity_key().hash(&mut hasher);
        format!("{:08x}", hasher.finish() as u32)
    }

    /// Parse the free-text `articles` field into individual supply names.
    /// Splits on commas and newlines, trims, drops empties.
    pub fn supplies(&self) -> Vec<String> {
        self.articles
            .split(['\n', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Format an ISO-ish date string for card display, `—` when unparseable.
pub fn fmt_date(s: &str) -> String {
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => d.format("%-d %b %Y").to_string(),
        Err(_) => "—".to_string(),
    }
}
