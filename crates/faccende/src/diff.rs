use serde::Serialize;
use std::collections::HashMap;

use crate::view::CardModel;

/// How long a render target should flash the update highlight on a card.
pub const UPDATE_FLASH_MS: u64 = 300;

/// How long a render target keeps a leaving card around for its exit
/// animation before dropping the node. One timer, no transition-end
/// listener racing it.
pub const LEAVE_MS: u64 = 400;

/// One operation against the rendered list. Keys are task identity keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ListOp {
    Insert { card: CardModel },
    Update { card: CardModel },
    Remove { key: String },
}

/// The minimal change set between two renders, plus the full target
/// order. Surviving nodes are reordered by re-appending in `order`
/// sequence; re-appending an existing child moves it without cloning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderPlan {
    pub ops: Vec<ListOp>,
    pub order: Vec<String>,
}

impl RenderPlan {
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Lifecycle of a rendered card. `Updating` is transient: the render
/// target settles it back to `Steady` after `UPDATE_FLASH_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPhase {
    Entering,
    Steady,
    Updating,
    Leaving,
}

/// Keyed diff between the previously rendered card list and the next one.
///
/// Holds the last rendered state so each call emits only what changed:
/// updates for keys present in both lists whose model differs, inserts
/// for new keys, removes for dropped keys, and always the new order.
#[derive(Debug, Default)]
pub struct Reconciler {
    cards: HashMap<String, CardModel>,
    phases: HashMap<String, CardPhase>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff against the previous render and adopt `next` as current.
    pub fn reconcile(&mut self, next: &[CardModel]) -> RenderPlan {
        let mut ops = Vec::new();
        let mut order = Vec::with_capacity(next.len());

        for card in next {
            if order.contains(&card.key) {
                // duplicate identity keys collapse to the first occurrence
                continue;
            }
            order.push(card.key.clone());

            match self.cards.get(&card.key) {
                Some(prev) if prev == card => {
                    // unchanged: survives in place, no op
                }
                Some(_) => {
                    self.phases.insert(card.key.clone(), CardPhase::Updating);
                    self.cards.insert(card.key.clone(), card.clone());
                    ops.push(ListOp::Update { card: card.clone() });
                }
                None => {
                    self.phases.insert(card.key.clone(), CardPhase::Entering);
                    self.cards.insert(card.key.clone(), card.clone());
                    ops.push(ListOp::Insert { card: card.clone() });
                }
            }
        }

        let removed: Vec<String> = self
            .cards
            .keys()
            .filter(|k| !order.contains(k))
            .cloned()
            .collect();
        for key in removed {
            self.cards.remove(&key);
            self.phases.insert(key.clone(), CardPhase::Leaving);
            ops.push(ListOp::Remove { key });
        }

        RenderPlan { ops, order }
    }

    /// Current phase of a card, if it is rendered or mid-exit.
    pub fn phase(&self, key: &str) -> Option<CardPhase> {
        self.phases.get(key).copied()
    }

    /// Advance a card past its transient phase: entering and updating
    /// cards settle to steady, leaving cards are dropped for good.
    /// Called by the render target when its single timer fires.
    pub fn settle(&mut self, key: &str) -> Option<CardPhase> {
        match self.phases.get(key)? {
            CardPhase::Entering | CardPhase::Updating => {
                self.phases.insert(key.to_string(), CardPhase::Steady);
                Some(CardPhase::Steady)
            }
            CardPhase::Leaving => {
                self.phases.remove(key);
                None
            }
            CardPhase::Steady => Some(CardPhase::Steady),
        }
    }

    /// Number of cards currently rendered (leaving cards excluded).
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::cards_for;
    use crate::types::Task;

    fn make_task(room: &str, name: &str, row: i64) -> Task {
        Task {
            room: Some(room.to_string()),
            category: Some("Floors".to_string()),
            task: name.to_string(),
            freq: Some(10.0),
            days_since: Some(1.0),
            next_due_in: Some(9.0),
            overdue: false,
            last_done: None,
            articles: String::new(),
            row: Some(row),
        }
    }

    fn op_keys(plan: &RenderPlan) -> Vec<(&'static str, String)> {
        plan.ops
            .iter()
            .map(|op| match op {
                ListOp::Insert { card } => ("insert", card.key.clone()),
                ListOp::Update { card } => ("update", card.key.clone()),
                ListOp::Remove { key } => ("remove", key.clone()),
            })
            .collect()
    }

    // ========== reconcile tests ==========

    #[test]
    fn test_first_render_inserts_everything_in_order() {
        let tasks = vec![make_task("Kitchen", "Mop", 1), make_task("Bath", "Scrub", 2)];
        let cards = cards_for(&tasks);

        let mut rec = Reconciler::new();
        let plan = rec.reconcile(&cards);

        assert_eq!(
            op_keys(&plan),
            vec![
                ("insert", "Kitchen|Floors|Mop".to_string()),
                ("insert", "Bath|Floors|Scrub".to_string()),
            ]
        );
        assert_eq!(plan.order, vec!["Kitchen|Floors|Mop", "Bath|Floors|Scrub"]);
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn test_unchanged_render_is_noop_with_order() {
        let tasks = vec![make_task("Kitchen", "Mop", 1)];
        let cards = cards_for(&tasks);

        let mut rec = Reconciler::new();
        rec.reconcile(&cards);
        let plan = rec.reconcile(&cards);

        assert!(plan.is_noop());
        assert_eq!(plan.order, vec!["Kitchen|Floors|Mop"]);
    }

    #[test]
    fn test_changed_card_updates_in_place() {
        let mut task = make_task("Kitchen", "Mop", 1);
        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(std::slice::from_ref(&task)));

        task.days_since = Some(5.0);
        let plan = rec.reconcile(&cards_for(std::slice::from_ref(&task)));

        assert_eq!(op_keys(&plan), vec![("update", "Kitchen|Floors|Mop".to_string())]);
        assert_eq!(rec.phase("Kitchen|Floors|Mop"), Some(CardPhase::Updating));
    }

    #[test]
    fn test_row_renumbering_keeps_the_same_card() {
        // the sheet renumbered the row; room/category/task are unchanged,
        // so this must be an in-place update, never remove + insert
        let before = make_task("Kitchen", "Mop", 12);
        let after = make_task("Kitchen", "Mop", 44);

        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(std::slice::from_ref(&before)));
        let plan = rec.reconcile(&cards_for(std::slice::from_ref(&after)));

        assert_eq!(op_keys(&plan), vec![("update", "Kitchen|Floors|Mop".to_string())]);
    }

    #[test]
    fn test_dropped_card_is_removed() {
        let a = make_task("Kitchen", "Mop", 1);
        let b = make_task("Bath", "Scrub", 2);

        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(&[a.clone(), b]));
        let plan = rec.reconcile(&cards_for(std::slice::from_ref(&a)));

        assert_eq!(op_keys(&plan), vec![("remove", "Bath|Floors|Scrub".to_string())]);
        assert_eq!(plan.order, vec!["Kitchen|Floors|Mop"]);
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_reorder_without_changes_is_order_only() {
        let a = make_task("Kitchen", "Mop", 1);
        let b = make_task("Bath", "Scrub", 2);

        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(&[a.clone(), b.clone()]));
        let plan = rec.reconcile(&cards_for(&[b, a]));

        assert!(plan.is_noop());
        assert_eq!(plan.order, vec!["Bath|Floors|Scrub", "Kitchen|Floors|Mop"]);
    }

    #[test]
    fn test_duplicate_keys_collapse_to_first() {
        let a = make_task("Kitchen", "Mop", 1);
        let dup = make_task("Kitchen", "Mop", 9);

        let mut rec = Reconciler::new();
        let plan = rec.reconcile(&cards_for(&[a, dup]));

        assert_eq!(plan.ops.len(), 1);
        assert_eq!(plan.order.len(), 1);
    }

    // ========== phase tests ==========

    #[test]
    fn test_phase_lifecycle_enter_settle_update_settle() {
        let task = make_task("Kitchen", "Mop", 1);
        let key = "Kitchen|Floors|Mop";

        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(std::slice::from_ref(&task)));
        assert_eq!(rec.phase(key), Some(CardPhase::Entering));

        assert_eq!(rec.settle(key), Some(CardPhase::Steady));
        assert_eq!(rec.phase(key), Some(CardPhase::Steady));

        let mut changed = task.clone();
        changed.days_since = Some(9.0);
        rec.reconcile(&cards_for(std::slice::from_ref(&changed)));
        assert_eq!(rec.phase(key), Some(CardPhase::Updating));
        assert_eq!(rec.settle(key), Some(CardPhase::Steady));
    }

    #[test]
    fn test_phase_leaving_then_gone() {
        let task = make_task("Kitchen", "Mop", 1);
        let key = "Kitchen|Floors|Mop";

        let mut rec = Reconciler::new();
        rec.reconcile(&cards_for(std::slice::from_ref(&task)));
        rec.reconcile(&[]);

        assert_eq!(rec.phase(key), Some(CardPhase::Leaving));
        assert!(rec.is_empty());

        assert_eq!(rec.settle(key), None);
        assert_eq!(rec.phase(key), None);
    }

    #[test]
    fn test_reappearing_while_leaving_is_reinserted() {
        let task = make_task("Kitchen", "Mop", 1);
        let cards = cards_for(std::slice::from_ref(&task));

        let mut rec = Reconciler::new();
        rec.reconcile(&cards);
        rec.reconcile(&[]);
        // card is mid-exit; the next refresh brings it back
        let plan = rec.reconcile(&cards);

        assert_eq!(op_keys(&plan), vec![("insert", "Kitchen|Floors|Mop".to_string())]);
        assert_eq!(rec.phase("Kitchen|Floors|Mop"), Some(CardPhase::Entering));
    }

    #[test]
    fn test_settle_unknown_key() {
        let mut rec = Reconciler::new();
        assert_eq!(rec.settle("nope"), None);
    }
}
