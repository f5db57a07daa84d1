//! End-to-end compliance scenarios through the public Interpreter API.
//!
//! Organized by area:
//!   A. Covenant checks and cure coupling
//!   B. Division-by-zero in every arithmetic context
//!   C. Waterfall shortfalls and reserve routing
//!   D. Trailing-period data sufficiency
//!   E. Phase suspension end to end
//!
//! Each test hand-constructs a `Program` the way the dashboard's parser
//! would produce one.

use std::collections::BTreeMap;

use proviso_core::{
    Basket, BasketKind, BinOp, CmpOp, Covenant, CureRight, CureType, Define, Expr, Func,
    Milestone, Phase, Program, Statement, ThresholdStep, Tier, TierAmount, TrailingAgg,
    Transition, Waterfall,
};
use proviso_eval::{
    EvalError, EvalWarning, FinancialData, Interpreter, MutationError, PeriodData, PeriodType,
};
use time::macros::date;

fn single(metrics: &[(&str, f64)]) -> FinancialData {
    let mut map = BTreeMap::new();
    for (k, v) in metrics {
        map.insert(k.to_string(), *v);
    }
    FinancialData::Single(map)
}

fn covenant(name: &str, metric: Expr, op: CmpOp, threshold: f64, cure: Option<CureRight>) -> Statement {
    Statement::Covenant(Covenant {
        name: name.to_string(),
        metric,
        operator: op,
        thresholds: vec![ThresholdStep {
            value: Expr::number(threshold),
            until: None,
        }],
        cure,
    })
}

// ──────────────────────────────────────────────
// A. Covenants and cures
// ──────────────────────────────────────────────

#[test]
fn compliance_matches_operator_exactly() {
    let mut program = Program::new();
    program.insert(covenant("AtLimit", Expr::ident("x"), CmpOp::Le, 4.5, None));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp.load_financials(single(&[("x", 4.5)])).unwrap();

    // <= is inclusive and epsilon-free.
    let result = interp.check_covenant("AtLimit").unwrap();
    assert!(result.compliant);
    assert_eq!(result.headroom_pct, Some(0.0));
}

#[test]
fn shared_cure_mechanism_couples_covenants_end_to_end() {
    let shared = CureRight {
        mechanism: "SponsorEquityCure".to_string(),
        cure_type: CureType::EquityCure,
        max_uses: Some(2),
        max_amount: None,
    };
    let mut program = Program::new();
    program.insert(covenant(
        "MaxLeverage",
        Expr::ident("leverage"),
        CmpOp::Le,
        4.5,
        Some(shared.clone()),
    ));
    program.insert(covenant(
        "MinInterestCover",
        Expr::ident("icr"),
        CmpOp::Ge,
        2.0,
        Some(shared),
    ));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp
        .load_financials(single(&[("leverage", 5.0), ("icr", 1.5)]))
        .unwrap();

    assert!(interp.apply_cure("MaxLeverage", 1_000_000.0).success);
    assert!(interp.apply_cure("MaxLeverage", 1_000_000.0).success);

    // The mechanism is exhausted for the sibling covenant too. This
    // coupling is intentional and must stay visible.
    let sibling = interp.check_covenant_with_cure("MinInterestCover").unwrap();
    assert!(!sibling.cure.unwrap().can_apply);
    let refused = interp.apply_cure("MinInterestCover", 1_000_000.0);
    assert!(!refused.success);
}

#[test]
fn cure_never_changes_basket_usage() {
    let mut program = Program::new();
    program.insert(Statement::Basket(Basket {
        name: "GeneralPurpose".to_string(),
        kind: BasketKind::Fixed,
        capacity: Expr::number(50.0),
    }));
    program.insert(covenant(
        "MaxLeverage",
        Expr::ident("leverage"),
        CmpOp::Le,
        4.5,
        Some(CureRight {
            mechanism: "EquityCure".to_string(),
            cure_type: CureType::EquityCure,
            max_uses: None,
            max_amount: None,
        }),
    ));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp.load_financials(single(&[("leverage", 5.0)])).unwrap();
    interp.use_basket("GeneralPurpose", 20.0, None).unwrap();

    interp.apply_cure("MaxLeverage", 9_999_999.0);

    assert_eq!(interp.get_basket_used("GeneralPurpose"), 20.0);
}

#[test]
fn cyclic_define_is_a_typed_error_not_a_crash() {
    let mut program = Program::new();
    program.insert(Statement::Define(Define {
        name: "A".to_string(),
        formula: Expr::binary(BinOp::Add, Expr::ident("B"), Expr::number(1.0)),
    }));
    program.insert(Statement::Define(Define {
        name: "B".to_string(),
        formula: Expr::ident("A"),
    }));
    program.insert(covenant("UsesCycle", Expr::ident("A"), CmpOp::Le, 10.0, None));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp.load_financials(single(&[])).unwrap();

    match interp.check_covenant("UsesCycle").unwrap_err() {
        EvalError::CircularDefinition { cycle } => {
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("expected CircularDefinition, got {:?}", other),
    }
}

// ──────────────────────────────────────────────
// B. Division by zero, everywhere
// ──────────────────────────────────────────────

#[test]
fn division_by_zero_in_every_arithmetic_context() {
    let div_zero = || Expr::binary(BinOp::Div, Expr::ident("x"), Expr::number(0.0));

    let mut program = Program::new();
    program.insert(covenant("Cov", div_zero(), CmpOp::Le, 1.0, None));
    program.insert(Statement::Basket(Basket {
        name: "B".to_string(),
        kind: BasketKind::Fixed,
        capacity: div_zero(),
    }));
    program.insert(Statement::Waterfall(Waterfall {
        name: "W".to_string(),
        tiers: vec![Tier {
            priority: 1,
            name: "T".to_string(),
            amount: TierAmount::Amount(div_zero()),
            condition: None,
            fund_reserve: None,
            shortfall_reserve: None,
        }],
    }));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp.load_financials(single(&[("x", 1.0)])).unwrap();

    // Covenant threshold context.
    assert_eq!(
        interp.check_covenant("Cov").unwrap_err(),
        EvalError::DivisionByZero
    );
    // Basket capacity context.
    let status = interp.get_basket_status("B").unwrap();
    assert!(status.error.unwrap().contains("division by zero"));
    assert_eq!(status.capacity, None);
    // Waterfall tier amount context.
    assert!(matches!(
        interp.execute_waterfall("W", 100.0).unwrap_err(),
        MutationError::Eval(EvalError::DivisionByZero)
    ));
}

// ──────────────────────────────────────────────
// C. Waterfalls
// ──────────────────────────────────────────────

#[test]
fn zero_revenue_waterfall_reports_shortfall_and_failed_draw() {
    let mut program = Program::new();
    program.insert(Statement::Reserve(proviso_core::Reserve {
        name: "OpexReserve".to_string(),
        target: None,
    }));
    program.insert(Statement::Waterfall(Waterfall {
        name: "Operating".to_string(),
        tiers: vec![Tier {
            priority: 1,
            name: "Opex".to_string(),
            amount: TierAmount::Amount(Expr::ident("operating_expenses")),
            condition: None,
            fund_reserve: None,
            shortfall_reserve: Some("OpexReserve".to_string()),
        }],
    }));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));
    interp
        .load_financials(single(&[("operating_expenses", 100.0)]))
        .unwrap();

    let result = interp.execute_waterfall("Operating", 0.0).unwrap();
    let tier = &result.tiers[0];
    assert_eq!(tier.shortfall, 100.0);
    let draw = tier.reserve_draw.as_ref().unwrap();
    assert_eq!(draw.drawn, 0.0);
    assert!(draw.error.as_ref().unwrap().contains("insufficient balance"));

    // After funding the reserve the same waterfall covers the shortfall.
    interp.fund_reserve("OpexReserve", 250.0).unwrap();
    let result = interp.execute_waterfall("Operating", 0.0).unwrap();
    let draw = result.tiers[0].reserve_draw.as_ref().unwrap();
    assert_eq!(draw.drawn, 100.0);
    let statuses = interp.get_all_reserve_statuses();
    assert_eq!(statuses[0].balance, 150.0);
}

// ──────────────────────────────────────────────
// D. Trailing-period sufficiency
// ──────────────────────────────────────────────

#[test]
fn trailing_covenant_distinguishes_insufficient_data() {
    let mut program = Program::new();
    program.insert(Statement::Define(Define {
        name: "LTM_EBITDA".to_string(),
        formula: Expr::Trailing {
            periods: 4,
            agg: TrailingAgg::Sum,
            expr: Box::new(Expr::ident("ebitda")),
        },
    }));
    program.insert(covenant(
        "MinLtmEbitda",
        Expr::ident("LTM_EBITDA"),
        CmpOp::Ge,
        40.0,
        None,
    ));
    let mut interp = Interpreter::new(program, date!(2027 - 06 - 30));

    let mk = |label: &str, end, v: f64| {
        let mut data = BTreeMap::new();
        data.insert("ebitda".to_string(), v);
        PeriodData {
            period: label.to_string(),
            period_type: PeriodType::Quarterly,
            period_end: end,
            data,
        }
    };
    interp
        .load_financials(FinancialData::MultiPeriod(vec![
            mk("Q1", date!(2027 - 03 - 31), 12.0),
            mk("Q2", date!(2027 - 06 - 30), 13.0),
        ]))
        .unwrap();

    let result = interp.check_covenant("MinLtmEbitda").unwrap();
    // Only two quarters sum to 25: not compliant, and the warning tells
    // the caller this is a data-sufficiency issue, not a clean breach.
    assert!(!result.compliant);
    assert_eq!(
        result.warnings,
        vec![EvalWarning::InsufficientPeriods {
            requested: 4,
            available: 2
        }]
    );
}

// ──────────────────────────────────────────────
// E. Phase suspension
// ──────────────────────────────────────────────

#[test]
fn construction_phase_suspends_covenant_until_cod() {
    let mut program = Program::new();
    program.insert(Statement::Phase(Phase {
        name: "Construction".to_string(),
        suspended_covenants: vec!["MinDSCR".to_string()],
    }));
    program.insert(Statement::Phase(Phase {
        name: "Operations".to_string(),
        suspended_covenants: vec![],
    }));
    program.insert(Statement::Milestone(Milestone {
        name: "COD".to_string(),
        target_date: date!(2027 - 06 - 30),
        longstop_date: date!(2028 - 06 - 30),
        achieved: false,
        achieved_date: None,
    }));
    program.insert(Statement::Transition(Transition {
        name: "ToOperations".to_string(),
        to_phase: "Operations".to_string(),
        predicate: Expr::call(Func::AllOf, vec![Expr::ident("COD")]),
    }));
    program.insert(covenant("MinDSCR", Expr::ident("dscr"), CmpOp::Ge, 1.2, None));

    let mut interp = Interpreter::new(program.clone(), date!(2027 - 01 - 01));
    interp.load_financials(single(&[("dscr", 0.4)])).unwrap();

    assert_eq!(interp.get_current_phase().unwrap().name, "Construction");
    let result = interp.check_covenant("MinDSCR").unwrap();
    assert!(result.compliant);
    assert!(result.suspended);

    // Achieve COD: the transition fires and the covenant is tested.
    let mut achieved = program;
    achieved.insert(Statement::Milestone(Milestone {
        name: "COD".to_string(),
        target_date: date!(2027 - 06 - 30),
        longstop_date: date!(2028 - 06 - 30),
        achieved: true,
        achieved_date: Some(date!(2027 - 05 - 15)),
    }));
    let mut interp = Interpreter::new(achieved, date!(2027 - 06 - 30));
    interp.load_financials(single(&[("dscr", 0.4)])).unwrap();

    assert_eq!(interp.get_current_phase().unwrap().name, "Operations");
    let result = interp.check_covenant("MinDSCR").unwrap();
    assert!(!result.compliant);
    assert!(!result.suspended);
}
