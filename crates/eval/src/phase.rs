//! Phase/milestone state machine and conditions-precedent checklists.
//!
//! The active phase is recomputed on demand: transition predicates are
//! evaluated in declaration order and the first true predicate selects
//! its target phase; otherwise the first-declared phase is active. A
//! predicate that fails to evaluate is treated as not-taken so one bad
//! transition cannot take down the phase display.
//!
//! Milestone status is a pure function of dates and the achieved flag;
//! checklist state is runtime ledger state, not AST mutation.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use proviso_core::Program;
use time::Date;

use crate::expr::Evaluator;
use crate::ledger::BasketLedger;
use crate::periods::FinancialStore;
use crate::types::{
    CpChecklist, CpItemState, CpItemStatus, MilestoneState, MilestoneStatus, PhaseStatus, iso,
};

/// Days before the longstop date at which a pending milestone becomes
/// at-risk.
pub const DEFAULT_WARNING_WINDOW_DAYS: i64 = 90;

// ──────────────────────────────────────────────
// Phase resolution
// ──────────────────────────────────────────────

/// Resolve the active phase. `None` when the program declares no phases.
pub(crate) fn current_phase(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    current_date: Date,
) -> Option<PhaseStatus> {
    let initial = program.phases().next()?;

    let mut active = initial.name.as_str();
    let mut eval = Evaluator::new(program, store, baskets, current_date);
    for transition in program.transitions() {
        if eval.eval_bool(&transition.predicate).unwrap_or(false) {
            active = transition.to_phase.as_str();
            break;
        }
    }

    let suspended = program
        .phases()
        .find(|p| p.name == active)
        .map(|p| p.suspended_covenants.clone())
        .unwrap_or_default();

    Some(PhaseStatus {
        name: active.to_string(),
        suspended_covenants: suspended,
    })
}

/// Covenants suspended by the active phase.
pub(crate) fn suspended_covenants(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    current_date: Date,
) -> BTreeSet<String> {
    current_phase(program, store, baskets, current_date)
        .map(|p| p.suspended_covenants.into_iter().collect())
        .unwrap_or_default()
}

// ──────────────────────────────────────────────
// Milestones
// ──────────────────────────────────────────────

/// Status precedence: achieved, then breached (past longstop), then
/// at-risk (inside the warning window), then pending.
pub(crate) fn milestone_state(
    achieved: bool,
    longstop_date: Date,
    current_date: Date,
    warning_window_days: i64,
) -> MilestoneState {
    if achieved {
        return MilestoneState::Achieved;
    }
    if current_date > longstop_date {
        return MilestoneState::Breached;
    }
    let days_left = (longstop_date - current_date).whole_days();
    if days_left <= warning_window_days {
        MilestoneState::AtRisk
    } else {
        MilestoneState::Pending
    }
}

pub(crate) fn all_milestone_statuses(
    program: &Program,
    current_date: Date,
    warning_window_days: i64,
) -> Vec<MilestoneStatus> {
    program
        .milestones()
        .map(|m| MilestoneStatus {
            name: m.name.clone(),
            state: milestone_state(m.achieved, m.longstop_date, current_date, warning_window_days),
            target_date: iso(m.target_date),
            longstop_date: iso(m.longstop_date),
            days_until_longstop: (m.longstop_date - current_date).whole_days(),
        })
        .collect()
}

// ──────────────────────────────────────────────
// Conditions precedent
// ──────────────────────────────────────────────

/// Runtime checklist state keyed by (block name, item name). Items with
/// no recorded state are pending.
#[derive(Debug, Clone, Default)]
pub struct CpLedger {
    states: BTreeMap<(String, String), CpItemState>,
}

impl CpLedger {
    pub fn new() -> CpLedger {
        CpLedger::default()
    }

    pub fn state(&self, block: &str, item: &str) -> CpItemState {
        self.states
            .get(&(block.to_string(), item.to_string()))
            .copied()
            .unwrap_or(CpItemState::Pending)
    }

    pub fn set(&mut self, block: &str, item: &str, state: CpItemState) {
        self.states
            .insert((block.to_string(), item.to_string()), state);
    }
}

/// Build the checklist for a conditions-precedent block. Waived and
/// not-applicable items count toward completion.
pub(crate) fn cp_checklist(
    program: &Program,
    ledger: &CpLedger,
    name: &str,
) -> Option<CpChecklist> {
    let block = program.conditions_precedent(name)?;
    let items: Vec<CpItemStatus> = block
        .items
        .iter()
        .map(|item| CpItemStatus {
            name: item.name.clone(),
            description: item.description.clone(),
            state: ledger.state(name, &item.name),
        })
        .collect();

    let complete = items.iter().filter(|i| i.state.is_complete()).count();
    let completion_pct = if items.is_empty() {
        100.0
    } else {
        complete as f64 / items.len() as f64 * 100.0
    };

    Some(CpChecklist {
        name: block.name.clone(),
        items,
        completion_pct,
    })
}
