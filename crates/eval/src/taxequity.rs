//! Tax-equity structures, flip events, credits, and depreciation.
//!
//! A flip event is associated to exactly one structure by name; a
//! trigger flips that structure's allocation state and no other's.
//! Depreciation and credit schedules are pure per-year calculators with
//! no cross-structure state.

use std::collections::BTreeMap;

use proviso_core::{DepreciationMethod, FlipTrigger, Program};
use time::Date;

use crate::expr::Evaluator;
use crate::ledger::BasketLedger;
use crate::periods::FinancialStore;
use crate::types::{
    DepreciationYear, FlipEventStatus, FlipOutcome, TaxCreditStatus, TaxEquityStructureStatus,
    iso,
};

/// Tolerance for return-based flip triggers. This is the one place the
/// language allows an inexact comparison: achieved IRR is itself the
/// output of iterative solvers, so demanding bit-exact equality with the
/// target would make date-of-flip depend on solver noise.
const FLIP_EPSILON: f64 = 1e-6;

/// Runtime flip state, keyed by event name.
#[derive(Debug, Clone, Default)]
pub struct FlipLedger {
    events: BTreeMap<String, FlipRecord>,
}

#[derive(Debug, Clone)]
pub struct FlipRecord {
    pub trigger_date: Date,
    pub trigger_value: Option<f64>,
}

impl FlipLedger {
    pub fn new() -> FlipLedger {
        FlipLedger::default()
    }

    pub fn triggered(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    pub fn record(&self, event: &str) -> Option<&FlipRecord> {
        self.events.get(event)
    }
}

// ──────────────────────────────────────────────
// Flip events
// ──────────────────────────────────────────────

/// Attempt to trigger a flip event. Only the structure the event names
/// is affected; every other structure's state is untouched.
pub(crate) fn trigger_flip(
    program: &Program,
    flips: &mut FlipLedger,
    event_name: &str,
    date: Date,
    value: f64,
) -> FlipOutcome {
    let event = match program.flip_event(event_name) {
        Some(e) => e,
        None => {
            return FlipOutcome {
                success: false,
                triggered: false,
                reason: Some(format!("unknown flip event: {}", event_name)),
            };
        }
    };
    if program.tax_equity_structure(&event.structure).is_none() {
        return FlipOutcome {
            success: false,
            triggered: false,
            reason: Some(format!(
                "flip event '{}' references unknown structure '{}'",
                event_name, event.structure
            )),
        };
    }
    if flips.triggered(event_name) {
        return FlipOutcome {
            success: true,
            triggered: true,
            reason: Some("already triggered".to_string()),
        };
    }

    let met = match &event.trigger {
        FlipTrigger::TargetReturn(target) => value >= target - FLIP_EPSILON,
        FlipTrigger::Date(trigger_date) => date >= *trigger_date,
    };
    if !met {
        let reason = match &event.trigger {
            FlipTrigger::TargetReturn(target) => {
                format!("achieved return {} below target {}", value, target)
            }
            FlipTrigger::Date(trigger_date) => {
                format!("before trigger date {}", iso(*trigger_date))
            }
        };
        return FlipOutcome {
            success: true,
            triggered: false,
            reason: Some(reason),
        };
    }

    flips.events.insert(
        event_name.to_string(),
        FlipRecord {
            trigger_date: date,
            trigger_value: match event.trigger {
                FlipTrigger::TargetReturn(_) => Some(value),
                FlipTrigger::Date(_) => None,
            },
        },
    );
    FlipOutcome {
        success: true,
        triggered: true,
        reason: None,
    }
}

pub(crate) fn flip_event_status(
    program: &Program,
    flips: &FlipLedger,
    name: &str,
) -> Option<FlipEventStatus> {
    let event = program.flip_event(name)?;
    let record = flips.record(name);
    Some(FlipEventStatus {
        name: event.name.clone(),
        structure: event.structure.clone(),
        triggered: record.is_some(),
        trigger_date: record.map(|r| iso(r.trigger_date)),
        trigger_value: record.and_then(|r| r.trigger_value),
    })
}

// ──────────────────────────────────────────────
// Structures
// ──────────────────────────────────────────────

/// A structure has flipped when any triggered flip event names it.
pub(crate) fn structure_status(
    program: &Program,
    flips: &FlipLedger,
    name: &str,
) -> Option<TaxEquityStructureStatus> {
    let structure = program.tax_equity_structure(name)?;
    let events: Vec<String> = program
        .flip_events()
        .filter(|e| e.structure == name)
        .map(|e| e.name.clone())
        .collect();
    let has_flipped = events.iter().any(|e| flips.triggered(e));

    Some(TaxEquityStructureStatus {
        name: structure.name.clone(),
        kind: structure.kind.keyword().to_string(),
        has_flipped,
        investor_allocation: if has_flipped {
            structure.investor_post_flip
        } else {
            structure.investor_pre_flip
        },
        target_return: structure.target_return,
        flip_events: events,
    })
}

// ──────────────────────────────────────────────
// Depreciation
// ──────────────────────────────────────────────

/// MACRS half-year convention percentages.
const MACRS_5: [f64; 6] = [0.2000, 0.3200, 0.1920, 0.1152, 0.1152, 0.0576];
const MACRS_7: [f64; 8] = [
    0.1429, 0.2449, 0.1749, 0.1249, 0.0893, 0.0892, 0.0893, 0.0446,
];

/// Depreciation rate for year `year` (1-based). Zero past the schedule.
pub(crate) fn depreciation_rate(method: &DepreciationMethod, year: u32) -> f64 {
    if year == 0 {
        return 0.0;
    }
    let idx = (year - 1) as usize;
    match method {
        DepreciationMethod::Macrs5 => MACRS_5.get(idx).copied().unwrap_or(0.0),
        DepreciationMethod::Macrs7 => MACRS_7.get(idx).copied().unwrap_or(0.0),
        DepreciationMethod::StraightLine { years } => {
            if *years > 0 && year <= *years {
                1.0 / *years as f64
            } else {
                0.0
            }
        }
    }
}

pub(crate) fn depreciation_for_year(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    current_date: Date,
    schedule: &str,
    year: u32,
) -> Option<Result<DepreciationYear, crate::types::EvalError>> {
    let decl = program.depreciation_schedule(schedule)?;
    let mut eval = Evaluator::new(program, store, baskets, current_date);
    Some(eval.eval_number(&decl.basis).map(|basis| {
        let rate = depreciation_rate(&decl.method, year);
        DepreciationYear {
            schedule: decl.name.clone(),
            year,
            rate,
            amount: basis * rate,
        }
    }))
}

// ──────────────────────────────────────────────
// Credits
// ──────────────────────────────────────────────

pub(crate) fn tax_credit_status(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    current_date: Date,
    name: &str,
) -> Option<TaxCreditStatus> {
    let credit = program.tax_credit(name)?;
    let mut eval = Evaluator::new(program, store, baskets, current_date);
    let (amount, error) = match eval.eval_number(&credit.amount) {
        Ok(n) => (Some(n), None),
        Err(e) => (None, Some(e.to_string())),
    };
    Some(TaxCreditStatus {
        name: credit.name.clone(),
        kind: match credit.kind {
            proviso_core::CreditKind::Itc => "ITC".to_string(),
            proviso_core::CreditKind::Ptc => "PTC".to_string(),
        },
        amount,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proviso_core::{
        CreditKind, DepreciationSchedule, Expr, FlipEvent, Statement, StructureKind,
        TaxCredit, TaxEquityStructure,
    };
    use std::collections::BTreeMap as Map;
    use time::macros::date;

    use crate::periods::FinancialData;

    fn program_with_structures() -> Program {
        let mut program = Program::new();
        for (name, target) in [("SolarLP", 0.0675), ("WindLP", 0.08)] {
            program.insert(Statement::TaxEquityStructure(TaxEquityStructure {
                name: name.to_string(),
                kind: StructureKind::PartnershipFlip,
                investor_pre_flip: 0.99,
                investor_post_flip: 0.05,
                target_return: Some(target),
            }));
        }
        program.insert(Statement::FlipEvent(FlipEvent {
            name: "SolarFlip".to_string(),
            structure: "SolarLP".to_string(),
            trigger: FlipTrigger::TargetReturn(0.0675),
        }));
        program.insert(Statement::FlipEvent(FlipEvent {
            name: "WindFlip".to_string(),
            structure: "WindLP".to_string(),
            trigger: FlipTrigger::TargetReturn(0.08),
        }));
        program
    }

    fn empty_store() -> FinancialStore {
        let mut store = FinancialStore::empty();
        store.load(FinancialData::Single(Map::new()), date!(2027 - 06 - 30));
        store
    }

    #[test]
    fn flip_affects_only_named_structure() {
        let program = program_with_structures();
        let mut flips = FlipLedger::new();

        let outcome = trigger_flip(&program, &mut flips, "SolarFlip", date!(2027 - 06 - 30), 0.07);
        assert!(outcome.success);
        assert!(outcome.triggered);

        let solar = structure_status(&program, &flips, "SolarLP").unwrap();
        assert!(solar.has_flipped);
        assert_eq!(solar.investor_allocation, 0.05);

        let wind = structure_status(&program, &flips, "WindLP").unwrap();
        assert!(!wind.has_flipped);
        assert_eq!(wind.investor_allocation, 0.99);
    }

    #[test]
    fn return_trigger_uses_epsilon() {
        let program = program_with_structures();
        let mut flips = FlipLedger::new();

        // A hair under target still triggers within tolerance.
        let outcome = trigger_flip(
            &program,
            &mut flips,
            "SolarFlip",
            date!(2027 - 06 - 30),
            0.0675 - 1e-9,
        );
        assert!(outcome.triggered);
    }

    #[test]
    fn below_target_does_not_trigger() {
        let program = program_with_structures();
        let mut flips = FlipLedger::new();

        let outcome =
            trigger_flip(&program, &mut flips, "SolarFlip", date!(2027 - 06 - 30), 0.05);
        assert!(outcome.success);
        assert!(!outcome.triggered);
        assert!(outcome.reason.unwrap().contains("below target"));
        assert!(!flips.triggered("SolarFlip"));
    }

    #[test]
    fn date_trigger() {
        let mut program = Program::new();
        program.insert(Statement::TaxEquityStructure(TaxEquityStructure {
            name: "SolarLP".to_string(),
            kind: StructureKind::SaleLeaseback,
            investor_pre_flip: 0.99,
            investor_post_flip: 0.05,
            target_return: None,
        }));
        program.insert(Statement::FlipEvent(FlipEvent {
            name: "DateFlip".to_string(),
            structure: "SolarLP".to_string(),
            trigger: FlipTrigger::Date(date!(2030 - 01 - 01)),
        }));
        let mut flips = FlipLedger::new();

        assert!(!trigger_flip(&program, &mut flips, "DateFlip", date!(2029 - 12 - 31), 0.0).triggered);
        assert!(trigger_flip(&program, &mut flips, "DateFlip", date!(2030 - 01 - 01), 0.0).triggered);

        let status = flip_event_status(&program, &flips, "DateFlip").unwrap();
        assert!(status.triggered);
        assert_eq!(status.trigger_date.as_deref(), Some("2030-01-01"));
        assert_eq!(status.trigger_value, None);
    }

    #[test]
    fn unknown_event_fails() {
        let program = program_with_structures();
        let mut flips = FlipLedger::new();
        let outcome =
            trigger_flip(&program, &mut flips, "NoSuch", date!(2027 - 06 - 30), 0.0);
        assert!(!outcome.success);
    }

    #[test]
    fn macrs_5_sums_to_one() {
        let total: f64 = (1..=6)
            .map(|y| depreciation_rate(&DepreciationMethod::Macrs5, y))
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(depreciation_rate(&DepreciationMethod::Macrs5, 7), 0.0);
    }

    #[test]
    fn depreciation_year_amounts() {
        let mut program = Program::new();
        program.insert(Statement::DepreciationSchedule(DepreciationSchedule {
            name: "PanelDep".to_string(),
            method: DepreciationMethod::Macrs5,
            basis: Expr::number(1_000_000.0),
        }));
        let store = empty_store();
        let baskets = BasketLedger::new();

        let year2 = depreciation_for_year(
            &program,
            &store,
            &baskets,
            date!(2027 - 06 - 30),
            "PanelDep",
            2,
        )
        .unwrap()
        .unwrap();
        assert_eq!(year2.rate, 0.32);
        assert_eq!(year2.amount, 320_000.0);
    }

    #[test]
    fn straight_line_depreciation() {
        let method = DepreciationMethod::StraightLine { years: 10 };
        assert_eq!(depreciation_rate(&method, 1), 0.1);
        assert_eq!(depreciation_rate(&method, 10), 0.1);
        assert_eq!(depreciation_rate(&method, 11), 0.0);
    }

    #[test]
    fn itc_credit_amount() {
        let mut program = Program::new();
        program.insert(Statement::TaxCredit(TaxCredit {
            name: "SolarITC".to_string(),
            kind: CreditKind::Itc,
            amount: Expr::binary(
                proviso_core::BinOp::Mul,
                Expr::number(0.30),
                Expr::ident("eligible_basis"),
            ),
        }));
        let mut store = FinancialStore::empty();
        let mut data = Map::new();
        data.insert("eligible_basis".to_string(), 2_000_000.0);
        store.load(FinancialData::Single(data), date!(2027 - 06 - 30));
        let baskets = BasketLedger::new();

        let status =
            tax_credit_status(&program, &store, &baskets, date!(2027 - 06 - 30), "SolarITC")
                .unwrap();
        assert_eq!(status.kind, "ITC");
        assert_eq!(status.amount, Some(600_000.0));
    }
}
