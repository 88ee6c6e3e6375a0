use anyhow::Result;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::logic::{compute_counts, metrics};
use crate::pipeline::{
    base_filter, collect_supplies, distinct_categories, distinct_rooms, filter_and_sort, Filters,
    SortMode,
};
use crate::types::Task;
use crate::view::{cards_for, CardModel};

/// How often the page polls `/api/diff` for incremental updates.
const POLL_MS: u64 = 15_000;

/// Generate a static HTML snapshot of the dashboard.
pub fn generate_html(tasks: &[Task], path: &Path) -> Result<()> {
    let markup = render_page(tasks, &Filters::default(), SortMode::Status, 0);
    fs::write(path, markup.into_string())?;
    Ok(())
}

/// Render the full dashboard page for the given filter selection.
///
/// KPI figures and counter pills always reflect the whole task list; only
/// the card grid and the supplies panel narrow with the filters.
pub fn render_page(tasks: &[Task], filters: &Filters, sort: SortMode, seq: u64) -> Markup {
    let kpi = metrics(tasks);
    let counts = compute_counts(tasks);

    let base = base_filter(tasks, filters);
    let supplies = collect_supplies(&base);
    let cards = cards_for(filter_and_sort(tasks, filters, sort));

    let rooms = distinct_rooms(tasks);
    let categories = distinct_categories(tasks);

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Faccende" }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    div.topbar {
                        h1 { "Faccende" }
                        span #"cl-status" {}
                        button #"refresh" type="button" { "Refresh" }
                    }

                    div.kpis {
                        div.kpi { span.kpi-val #"kpi-today" { (kpi.today) } span.kpi-label { "due today" } }
                        div.kpi { span.kpi-val #"kpi-overdue" { (kpi.overdue) } span.kpi-label { "overdue" } }
                        div.kpi { span.kpi-val #"kpi-total" { (kpi.total) } span.kpi-label { "tasks" } }
                        div.kpi { span.kpi-val #"kpi-delay" { (kpi.avg_delay) "d" } span.kpi-label { "avg delay" } }
                    }

                    div.counters {
                        span.count.overdue { span #"cl-overdue" { (counts.overdue) } " overdue" }
                        span.count.due { span #"cl-due" { (counts.due) } " due" }
                        span.count.coming { span #"cl-coming" { (counts.coming) } " coming" }
                        div.health {
                            div.health-bar {
                                div.health-fill style={ "width:" (counts.pct) "%" } {}
                            }
                            span #"cl-health" { (counts.ok) " / " (counts.total) " — " (counts.pct) "%" }
                        }
                    }

                    @if counts.overdue + counts.due + counts.coming == 0 {
                        div #"cl-zerostate" { "Nothing needs doing. Enjoy it." }
                    }

                    form #"filters" method="get" action="/" {
                        select name="room" {
                            option value="" { "All rooms" }
                            @for r in &rooms {
                                option value=(r) selected[filters.room.as_deref() == Some(r.as_str())] { (r) }
                            }
                        }
                        select name="category" {
                            option value="" { "All categories" }
                            @for c in &categories {
                                option value=(c) selected[filters.category.as_deref() == Some(c.as_str())] { (c) }
                            }
                        }
                        select name="sort" {
                            option value="status" selected[sort == SortMode::Status] { "By status" }
                            option value="soonest" selected[sort == SortMode::Soonest] { "Soonest first" }
                            option value="room" selected[sort == SortMode::Room] { "By room" }
                        }
                        label.due-toggle {
                            input type="checkbox" name="due" value="1" checked[filters.due_only];
                            " Due only"
                        }
                        input type="hidden" name="supplies" value=(supplies_param(filters));
                        noscript { button type="submit" { "Apply" } }
                    }

                    div.supplies-panel {
                        span.supplies-label { "Supplies:" }
                        div #"supplies-list" {
                            @if supplies.is_empty() {
                                "—"
                            } @else {
                                @for item in &supplies {
                                    @let active = filters.supplies.contains(&item.to_lowercase());
                                    a.need-chip.active[active] href=(chip_href(filters, sort, item)) { (item) }
                                }
                            }
                        }
                    }

                    div #"grid" data-seq=(seq) {
                        @for card in &cards {
                            (render_card(card))
                        }
                    }
                }

                div.undo-toast #"undo-toast" role="status" aria-live="polite" {
                    span.undo-toast-text {}
                    button.undo-toast-btn type="button" { "Undo" }
                }

                script {
                    (PreEscaped(format!(
                        "const POLL_MS = {};\nconst UPDATE_FLASH_MS = {};\nconst LEAVE_MS = {};\nconst UNDO_WINDOW_MS = {};",
                        POLL_MS,
                        crate::diff::UPDATE_FLASH_MS,
                        crate::diff::LEAVE_MS,
                        crate::undo::UNDO_WINDOW_MS,
                    )))
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

/// One card. Must stay in lockstep with `cardInner` in the embedded
/// script, which rebuilds the same markup when applying diff plans.
pub fn render_card(card: &CardModel) -> Markup {
    let cls = match card.frame {
        Some(frame) => format!("card {frame}"),
        None => "card".to_string(),
    };

    html! {
        div class=(cls) data-key=(card.key) id={ "card-" (card.dom_id) } {
            div.header {
                div.title-wrap {
                    div.title { (card.title) }
                    div.meta { (card.meta) }
                    @if !card.supplies.is_empty() {
                        div.needs {
                            @for s in &card.supplies {
                                span.need-chip { (s) }
                            }
                        }
                    }
                }
                div.badges {
                    @match card.row {
                        Some(row) => {
                            button class={ "pill pill-" (card.status.slug()) } data-row=(row) data-action="done" {
                                (card.status)
                            }
                        }
                        None => {
                            span class={ "pill pill-" (card.status.slug()) } { (card.status) }
                        }
                    }
                }
            }
            div.progress {
                div class=(card.progress_color) style={ "width:" (card.progress_pct) "%" } {}
            }
            div.footer {
                span { (card.due_label) }
                span { (card.since_label) }
            }
        }
    }
}

/// The active supply selection as a comma list for the hidden form field.
fn supplies_param(filters: &Filters) -> String {
    filters
        .supplies
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

/// Href for a supply chip: the current query with that supply toggled.
fn chip_href(filters: &Filters, sort: SortMode, supply: &str) -> String {
    let mut toggled = filters.clone();
    let key = supply.to_lowercase();
    if !toggled.supplies.remove(&key) {
        toggled.supplies.insert(key);
    }

    let mut pairs: Vec<(&str, String)> = Vec::new();
    if let Some(room) = &toggled.room {
        pairs.push(("room", room.clone()));
    }
    if let Some(category) = &toggled.category {
        pairs.push(("category", category.clone()));
    }
    if toggled.due_only {
        pairs.push(("due", "1".to_string()));
    }
    if sort != SortMode::Status {
        pairs.push(("sort", sort.as_param().to_string()));
    }
    let supplies = supplies_param(&toggled);
    if !supplies.is_empty() {
        pairs.push(("supplies", supplies));
    }

    if pairs.is_empty() {
        return "/".to_string();
    }
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencode(v)))
        .collect();
    format!("/?{}", query.join("&"))
}

/// Minimal percent-encoding for query string values.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b',' => {
                out.push(b as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

const CSS: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #101418;
    color: #e8ecef;
    line-height: 1.4;
    padding: 24px;
}

.container { max-width: 1100px; margin: 0 auto; }

.topbar { display: flex; align-items: baseline; gap: 16px; margin-bottom: 20px; }
.topbar h1 { font-size: 1.6em; font-weight: 800; letter-spacing: -0.02em; }
#cl-status { color: #8aa; font-size: 0.85em; flex: 1; }
#refresh {
    background: #1d2731; color: #e8ecef; border: 1px solid #31404d;
    border-radius: 6px; padding: 6px 14px; cursor: pointer;
}
#refresh:hover { background: #25323e; }

.kpis { display: flex; gap: 12px; margin-bottom: 14px; flex-wrap: wrap; }
.kpi {
    background: #171e25; border: 1px solid #242f3a; border-radius: 8px;
    padding: 10px 16px; display: flex; flex-direction: column; min-width: 92px;
}
.kpi-val { font-size: 1.4em; font-weight: 700; }
.kpi-label { color: #7f8d99; font-size: 0.75em; text-transform: uppercase; letter-spacing: 0.06em; }

.counters { display: flex; align-items: center; gap: 14px; margin-bottom: 18px; flex-wrap: wrap; }
.count { font-size: 0.9em; color: #9fb0bd; }
.count span { font-weight: 700; color: #e8ecef; }
.count.overdue span { color: #ff6b6b; }
.count.due span { color: #ffd166; }
.count.coming span { color: #b5e48c; }
.health { display: flex; align-items: center; gap: 8px; flex: 1; min-width: 220px; }
.health-bar { flex: 1; height: 8px; background: #1d2731; border-radius: 4px; overflow: hidden; }
.health-fill { height: 100%; background: #52b788; transition: width 0.4s; }
#cl-health { font-size: 0.8em; color: #9fb0bd; white-space: nowrap; }

#cl-zerostate {
    background: #14211b; border: 1px solid #1f3a2c; color: #8fd4a8;
    border-radius: 8px; padding: 14px; margin-bottom: 18px;
}

#filters { display: flex; gap: 10px; align-items: center; margin-bottom: 12px; flex-wrap: wrap; }
#filters select {
    background: #1d2731; color: #e8ecef; border: 1px solid #31404d;
    border-radius: 6px; padding: 6px 8px;
}
.due-toggle { font-size: 0.9em; color: #9fb0bd; cursor: pointer; }

.supplies-panel { display: flex; gap: 10px; align-items: baseline; margin-bottom: 20px; flex-wrap: wrap; }
.supplies-label { color: #7f8d99; font-size: 0.8em; text-transform: uppercase; letter-spacing: 0.06em; }
#supplies-list { display: flex; gap: 6px; flex-wrap: wrap; color: #556; }
.need-chip {
    display: inline-block; background: #1d2731; color: #9fb0bd;
    border: 1px solid #31404d; border-radius: 999px; padding: 2px 10px;
    font-size: 0.78em; text-decoration: none;
}
a.need-chip:hover { border-color: #52b788; }
a.need-chip.active { background: #1f3a2c; color: #8fd4a8; border-color: #52b788; }

#grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(300px, 1fr)); gap: 14px; }

.card {
    background: #171e25; border: 1px solid #242f3a; border-radius: 10px;
    padding: 14px; display: flex; flex-direction: column; gap: 10px;
    transition: opacity 0.3s, transform 0.3s, border-color 0.3s;
}
.card.dead { border-color: #7a1f2b; }
.card.overdue { border-color: #c0392b; }
.card.due { border-color: #b8860b; }
.card.coming { border-color: #5a7d2a; }

.card.enter { opacity: 0; transform: translateY(8px); }
.card.leaving { opacity: 0; transform: scale(0.96); }
.card.update { border-color: #4aa3df; }

.header { display: flex; gap: 10px; }
.title-wrap { flex: 1; }
.title { font-weight: 700; margin-bottom: 2px; }
.meta { color: #7f8d99; font-size: 0.8em; }
.needs { margin-top: 6px; display: flex; gap: 4px; flex-wrap: wrap; }

.pill {
    border: none; border-radius: 999px; padding: 4px 12px;
    font-size: 0.72em; font-weight: 800; letter-spacing: 0.05em; cursor: pointer;
}
.pill-dead { background: #7a1f2b; color: #ffd7dc; }
.pill-overdue { background: #c0392b; color: #fff; }
.pill-due { background: #b8860b; color: #fff; }
.pill-coming { background: #5a7d2a; color: #eaffd0; }
.pill-fresh { background: #24513b; color: #b7e4c7; }
.pill:disabled { opacity: 0.5; cursor: wait; }

.progress { height: 6px; background: #1d2731; border-radius: 3px; overflow: hidden; }
.progress > div { height: 100%; transition: width 0.4s; }
.progress > .green { background: #52b788; }
.progress > .lime { background: #b5e48c; }
.progress > .yellow { background: #ffd166; }
.progress > .red { background: #ff6b6b; }
.progress > .dead { background: #7a1f2b; }

.footer { display: flex; justify-content: space-between; color: #7f8d99; font-size: 0.78em; }

.undo-toast {
    position: fixed; left: 50%; bottom: 24px; transform: translate(-50%, 80px);
    background: #1d2731; border: 1px solid #31404d; border-radius: 8px;
    padding: 10px 16px; display: flex; gap: 12px; align-items: center;
    transition: transform 0.25s; z-index: 10;
}
.undo-toast.show { transform: translate(-50%, 0); }
.undo-toast-btn {
    background: none; border: none; color: #4aa3df; font-weight: 700; cursor: pointer;
}
"#;

const JAVASCRIPT: &str = r#"
const $ = s => document.querySelector(s);

// Filter controls reload the page with new query params
const form = $('#filters');
if (form) {
    form.addEventListener('change', () => form.submit());
}

function esc(s) {
    return String(s).replace(/[&<>"]/g, c => (
        { '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;' }[c]
    ));
}

// Must stay in lockstep with render_card on the server
function cardInner(card) {
    const chips = card.supplies.length
        ? `<div class="needs">${card.supplies.map(s => `<span class="need-chip">${esc(s)}</span>`).join('')}</div>`
        : '';
    const slug = card.status.toLowerCase();
    const pill = card.row == null
        ? `<span class="pill pill-${slug}">${card.status}</span>`
        : `<button class="pill pill-${slug}" data-row="${card.row}" data-action="done">${card.status}</button>`;
    return `
    <div class="header">
      <div class="title-wrap">
        <div class="title">${esc(card.title)}</div>
        <div class="meta">${esc(card.meta)}</div>
        ${chips}
      </div>
      <div class="badges">${pill}</div>
    </div>
    <div class="progress"><div class="${card.progress_color}" style="width:${card.progress_pct}%"></div></div>
    <div class="footer"><span>${esc(card.due_label)}</span><span>${esc(card.since_label)}</span></div>`;
}

function buildCard(card) {
    const el = document.createElement('div');
    el.className = card.frame ? `card ${card.frame}` : 'card';
    el.dataset.key = card.key;
    el.id = `card-${card.dom_id}`;
    el.innerHTML = cardInner(card);
    return el;
}

// One timer per card and per concern; scheduling a new one cancels the old
const flashTimers = new Map();
const leaveTimers = new Map();

function applyPlan(plan) {
    const grid = $('#grid');
    if (!grid) return;

    const nodes = new Map([...grid.children].map(el => [el.dataset.key, el]));

    for (const op of plan.ops) {
        if (op.op === 'insert') {
            const el = buildCard(op.card);
            el.classList.add('enter');
            grid.appendChild(el);
            requestAnimationFrame(() => el.classList.remove('enter'));
            nodes.set(op.card.key, el);
        } else if (op.op === 'update') {
            const el = nodes.get(op.card.key);
            if (!el) continue;
            el.className = op.card.frame ? `card ${op.card.frame}` : 'card';
            el.innerHTML = cardInner(op.card);
            el.classList.add('update');
            clearTimeout(flashTimers.get(op.card.key));
            flashTimers.set(op.card.key,
                setTimeout(() => el.classList.remove('update'), UPDATE_FLASH_MS));
        } else if (op.op === 'remove') {
            const el = nodes.get(op.key);
            if (!el) continue;
            nodes.delete(op.key);
            el.classList.add('leaving');
            clearTimeout(leaveTimers.get(op.key));
            leaveTimers.set(op.key, setTimeout(() => el.remove(), LEAVE_MS));
        }
    }

    // Append-to-reorder: re-appending an existing child moves it to the
    // end, so after this loop grid order equals plan order
    for (const key of plan.order) {
        const el = nodes.get(key);
        if (el) grid.appendChild(el);
    }
}

let seq = Number($('#grid')?.dataset.seq || 0);

async function pollDiff() {
    try {
        const r = await fetch(`/api/diff?since=${seq}`);
        const j = await r.json();
        if (j.full) {
            // too far behind to patch incrementally
            location.reload();
            return;
        }
        seq = j.seq;
        if (j.plan) applyPlan(j.plan);
    } catch (e) {
        const st = $('#cl-status');
        if (st) st.textContent = 'error';
        console.error('diff poll failed:', e);
    }
}

// Incremental updates track the unfiltered default view only; filtered
// pages are re-rendered server-side on each navigation
if (!location.search) {
    setInterval(pollDiff, POLL_MS);
}

let undoTimer = null;

function showToast(message) {
    const toast = $('#undo-toast');
    if (!toast) return;
    toast.querySelector('.undo-toast-text').textContent = message;
    toast.classList.add('show');
}

function hideToast() {
    const toast = $('#undo-toast');
    if (toast) toast.classList.remove('show');
}

document.addEventListener('click', async ev => {
    const btn = ev.target.closest('[data-action="done"]');
    if (btn) {
        const row = Number(btn.dataset.row || 0);
        if (!row) return;
        btn.disabled = true;
        try {
            await fetch(`/api/done?row=${row}`, { method: 'POST' });
            showToast('Marked done.');
            clearTimeout(undoTimer);
            undoTimer = setTimeout(() => { hideToast(); location.reload(); }, UNDO_WINDOW_MS);
        } catch (e) {
            console.error('mark done failed:', e);
            btn.disabled = false;
        }
        return;
    }

    if (ev.target.closest('.undo-toast-btn')) {
        clearTimeout(undoTimer);
        hideToast();
        try {
            await fetch('/api/undo', { method: 'POST' });
        } catch (e) {
            console.error('undo failed:', e);
        }
        location.reload();
    }
});

const refresh = $('#refresh');
if (refresh) {
    refresh.addEventListener('click', async () => {
        refresh.disabled = true;
        refresh.textContent = 'Refreshing…';
        try {
            await fetch('/api/refresh');
        } catch (e) {
            console.error('refresh failed:', e);
        }
        location.reload();
    });
}
"#;
