//! Covenant compliance checks and cure-right application.
//!
//! A check evaluates the covenant's metric and active threshold step for
//! the injected current date, so historical evaluation is deterministic.
//! Errors in one covenant's DEFINE chain abort that covenant's check
//! only; `check_all` isolates failures per covenant.
//!
//! Cure consumption is keyed by mechanism identity: covenants naming the
//! same mechanism share uses and amounts. Applying a cure records
//! consumption only; it never re-checks the covenant and never touches
//! basket ledgers.

use std::collections::BTreeSet;

use proviso_core::{Covenant, Program};
use time::Date;

use crate::expr::Evaluator;
use crate::ledger::{BasketLedger, CureLedger};
use crate::periods::FinancialStore;
use crate::types::{
    CovenantResult, CovenantWithCure, CureAvailability, CureOutcome, EvalError,
};

/// Read-only context shared by covenant checks.
pub(crate) struct CovenantCtx<'a> {
    pub program: &'a Program,
    pub store: &'a FinancialStore,
    pub baskets: &'a BasketLedger,
    pub suspended: &'a BTreeSet<String>,
    pub current_date: Date,
    /// Pinned period for historical checks; `None` means latest.
    pub period: Option<usize>,
}

impl<'a> CovenantCtx<'a> {
    fn evaluator(&self) -> Evaluator<'a> {
        let eval = Evaluator::new(self.program, self.store, self.baskets, self.current_date);
        match self.period {
            Some(idx) => eval.at_period(idx),
            None => eval,
        }
    }
}

/// Check one covenant. Evaluator errors propagate to the caller.
pub(crate) fn check(ctx: &CovenantCtx<'_>, name: &str) -> Result<CovenantResult, EvalError> {
    let covenant = ctx
        .program
        .covenant(name)
        .ok_or_else(|| EvalError::UnknownElement {
            kind: "covenant".to_string(),
            name: name.to_string(),
        })?;
    check_decl(ctx, covenant)
}

fn check_decl(ctx: &CovenantCtx<'_>, covenant: &Covenant) -> Result<CovenantResult, EvalError> {
    let suspended = ctx.suspended.contains(&covenant.name);
    let mut eval = ctx.evaluator();

    let merits = eval.covenant_on_merits(covenant);
    let warnings = std::mem::take(&mut eval.warnings);

    let (actual, threshold) = match merits {
        Ok(pair) => pair,
        Err(err) if suspended => {
            // Suspension dominates: the covenant is not tested in this
            // phase, so an evaluation failure is reported but does not
            // flip the compliance flag.
            let mut result =
                CovenantResult::failed(&covenant.name, covenant.operator.symbol(), err.to_string());
            result.compliant = true;
            result.suspended = true;
            return Ok(result);
        }
        Err(err) => return Err(err),
    };

    let on_merits = covenant.operator.apply(actual, threshold);
    Ok(CovenantResult {
        name: covenant.name.clone(),
        actual: Some(actual),
        threshold: Some(threshold),
        operator: covenant.operator.symbol().to_string(),
        compliant: suspended || on_merits,
        headroom_pct: headroom_pct(covenant, actual, threshold),
        suspended,
        warnings,
        error: None,
    })
}

/// Check every covenant, isolating per-covenant failures: one cyclic
/// DEFINE must not block evaluation of unrelated covenants.
pub(crate) fn check_all(ctx: &CovenantCtx<'_>) -> Vec<CovenantResult> {
    ctx.program
        .covenants()
        .map(|covenant| {
            check_decl(ctx, covenant).unwrap_or_else(|err| {
                CovenantResult::failed(
                    &covenant.name,
                    covenant.operator.symbol(),
                    err.to_string(),
                )
            })
        })
        .collect()
}

/// Signed headroom as a percentage of threshold: positive iff the
/// covenant passes on the merits. `None` when the threshold is zero or
/// the operator is equality.
fn headroom_pct(covenant: &Covenant, actual: f64, threshold: f64) -> Option<f64> {
    if threshold == 0.0 {
        return None;
    }
    let looser_up = covenant.operator.larger_threshold_is_looser()?;
    let pct = if looser_up {
        (threshold - actual) / threshold * 100.0
    } else {
        (actual - threshold) / threshold * 100.0
    };
    Some(pct)
}

// ──────────────────────────────────────────────
// Cure rights
// ──────────────────────────────────────────────

/// The cure view for one covenant: shared consumption read through the
/// mechanism identity, limits read from this covenant's declaration.
pub(crate) fn cure_availability(
    cures: &CureLedger,
    covenant: &Covenant,
) -> Option<CureAvailability> {
    let cure = covenant.cure.as_ref()?;
    let uses_consumed = cures.uses_consumed(&cure.mechanism);
    let amount_consumed = cures.amount_consumed(&cure.mechanism);

    let uses_remaining = cure.max_uses.map(|max| max.saturating_sub(uses_consumed));
    let amount_remaining = cure.max_amount.map(|max| (max - amount_consumed).max(0.0));

    let can_apply = uses_remaining.map_or(true, |r| r > 0)
        && amount_remaining.map_or(true, |r| r > 0.0);

    Some(CureAvailability {
        mechanism: cure.mechanism.clone(),
        cure_type: cure.cure_type.keyword().to_string(),
        uses_consumed,
        uses_remaining,
        amount_consumed,
        amount_remaining,
        can_apply,
    })
}

pub(crate) fn check_with_cure(
    ctx: &CovenantCtx<'_>,
    cures: &CureLedger,
    name: &str,
) -> Result<CovenantWithCure, EvalError> {
    let covenant = ctx
        .program
        .covenant(name)
        .ok_or_else(|| EvalError::UnknownElement {
            kind: "covenant".to_string(),
            name: name.to_string(),
        })?;
    Ok(CovenantWithCure {
        covenant: check_decl(ctx, covenant)?,
        cure: cure_availability(cures, covenant),
    })
}

/// Apply a cure against the named covenant's mechanism. All-or-nothing:
/// limit checks run before any consumption is recorded, and a refusal
/// leaves the ledger untouched.
pub(crate) fn apply_cure(
    program: &Program,
    cures: &mut CureLedger,
    covenant_name: &str,
    amount: f64,
) -> CureOutcome {
    let covenant = match program.covenant(covenant_name) {
        Some(c) => c,
        None => {
            return CureOutcome {
                success: false,
                reason: Some(format!("unknown covenant: {}", covenant_name)),
            };
        }
    };
    let cure = match &covenant.cure {
        Some(c) => c,
        None => {
            return CureOutcome {
                success: false,
                reason: Some(format!(
                    "covenant '{}' has no cure right",
                    covenant_name
                )),
            };
        }
    };

    let uses_consumed = cures.uses_consumed(&cure.mechanism);
    if let Some(max_uses) = cure.max_uses {
        if uses_consumed >= max_uses {
            return CureOutcome {
                success: false,
                reason: Some(format!(
                    "cure mechanism '{}' exhausted: {} of {} uses consumed",
                    cure.mechanism, uses_consumed, max_uses
                )),
            };
        }
    }
    let amount_consumed = cures.amount_consumed(&cure.mechanism);
    if let Some(max_amount) = cure.max_amount {
        if amount_consumed + amount > max_amount {
            return CureOutcome {
                success: false,
                reason: Some(format!(
                    "cure mechanism '{}' exhausted: {} of {} amount consumed, requested {}",
                    cure.mechanism, amount_consumed, max_amount, amount
                )),
            };
        }
    }

    cures.consume(&cure.mechanism, cure.cure_type, amount);
    CureOutcome {
        success: true,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proviso_core::{
        BinOp, CmpOp, CureRight, CureType, Define, Expr, Statement, ThresholdStep,
    };
    use std::collections::BTreeMap;
    use time::macros::date;

    use crate::periods::FinancialData;

    fn covenant_stmt(name: &str, metric: Expr, op: CmpOp, threshold: f64) -> Statement {
        Statement::Covenant(Covenant {
            name: name.to_string(),
            metric,
            operator: op,
            thresholds: vec![ThresholdStep {
                value: Expr::number(threshold),
                until: None,
            }],
            cure: None,
        })
    }

    fn loaded_store(metrics: &[(&str, f64)]) -> FinancialStore {
        let mut map = BTreeMap::new();
        for (k, v) in metrics {
            map.insert(k.to_string(), *v);
        }
        let mut store = FinancialStore::empty();
        store.load(FinancialData::Single(map), date!(2027 - 06 - 30));
        store
    }

    #[test]
    fn compliant_check_with_headroom() {
        let mut program = Program::new();
        program.insert(covenant_stmt(
            "MaxLeverage",
            Expr::ident("leverage"),
            CmpOp::Le,
            4.5,
        ));
        let store = loaded_store(&[("leverage", 3.46)]);
        let baskets = BasketLedger::new();
        let suspended = BTreeSet::new();
        let ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };

        let result = check(&ctx, "MaxLeverage").unwrap();
        assert!(result.compliant);
        assert_eq!(result.actual, Some(3.46));
        assert_eq!(result.threshold, Some(4.5));
        let headroom = result.headroom_pct.unwrap();
        assert!((headroom - 23.11).abs() < 0.01);
        assert!(!result.suspended);
    }

    #[test]
    fn headroom_sign_tracks_compliance() {
        let mut program = Program::new();
        program.insert(covenant_stmt(
            "MinDSCR",
            Expr::ident("dscr"),
            CmpOp::Ge,
            1.2,
        ));
        let store = loaded_store(&[("dscr", 1.08)]);
        let baskets = BasketLedger::new();
        let suspended = BTreeSet::new();
        let ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };

        let result = check(&ctx, "MinDSCR").unwrap();
        assert!(!result.compliant);
        assert!(result.headroom_pct.unwrap() < 0.0);
    }

    #[test]
    fn step_schedule_selects_by_current_date() {
        let mut program = Program::new();
        program.insert(Statement::Covenant(Covenant {
            name: "MaxLeverage".to_string(),
            metric: Expr::ident("leverage"),
            operator: CmpOp::Le,
            thresholds: vec![
                ThresholdStep {
                    value: Expr::number(4.5),
                    until: Some(date!(2027 - 12 - 31)),
                },
                ThresholdStep {
                    value: Expr::number(4.0),
                    until: None,
                },
            ],
            cure: None,
        }));
        let store = loaded_store(&[("leverage", 4.2)]);
        let baskets = BasketLedger::new();
        let suspended = BTreeSet::new();

        let mut ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };
        assert!(check(&ctx, "MaxLeverage").unwrap().compliant);

        // After the step-down the same leverage breaches.
        ctx.current_date = date!(2028 - 03 - 31);
        let result = check(&ctx, "MaxLeverage").unwrap();
        assert_eq!(result.threshold, Some(4.0));
        assert!(!result.compliant);
    }

    #[test]
    fn suspended_covenant_reports_tagged_pass() {
        let mut program = Program::new();
        program.insert(covenant_stmt(
            "MinDSCR",
            Expr::ident("dscr"),
            CmpOp::Ge,
            1.2,
        ));
        let store = loaded_store(&[("dscr", 0.5)]);
        let baskets = BasketLedger::new();
        let mut suspended = BTreeSet::new();
        suspended.insert("MinDSCR".to_string());
        let ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };

        let result = check(&ctx, "MinDSCR").unwrap();
        assert!(result.compliant);
        assert!(result.suspended);
        // The merits are still visible to the caller.
        assert!(result.headroom_pct.unwrap() < 0.0);
    }

    #[test]
    fn one_bad_define_does_not_block_others() {
        let mut program = Program::new();
        program.insert(Statement::Define(Define {
            name: "Broken".to_string(),
            formula: Expr::ident("Broken"),
        }));
        program.insert(covenant_stmt(
            "UsesBroken",
            Expr::ident("Broken"),
            CmpOp::Le,
            1.0,
        ));
        program.insert(covenant_stmt("Fine", Expr::ident("x"), CmpOp::Le, 10.0));
        let store = loaded_store(&[("x", 5.0)]);
        let baskets = BasketLedger::new();
        let suspended = BTreeSet::new();
        let ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };

        let results = check_all(&ctx);
        assert_eq!(results.len(), 2);
        let broken = results.iter().find(|r| r.name == "UsesBroken").unwrap();
        assert!(!broken.compliant);
        assert!(broken.error.as_ref().unwrap().contains("circular definition"));
        let fine = results.iter().find(|r| r.name == "Fine").unwrap();
        assert!(fine.compliant);
        assert!(fine.error.is_none());
    }

    #[test]
    fn shared_mechanism_consumption_couples_covenants() {
        let cure = CureRight {
            mechanism: "SponsorEquityCure".to_string(),
            cure_type: CureType::EquityCure,
            max_uses: Some(2),
            max_amount: None,
        };
        let mut program = Program::new();
        for name in ["MaxLeverage", "MinInterestCover"] {
            program.insert(Statement::Covenant(Covenant {
                name: name.to_string(),
                metric: Expr::ident("x"),
                operator: CmpOp::Le,
                thresholds: vec![ThresholdStep {
                    value: Expr::number(1.0),
                    until: None,
                }],
                cure: Some(cure.clone()),
            }));
        }
        let mut cures = CureLedger::new();

        assert!(apply_cure(&program, &mut cures, "MaxLeverage", 10.0).success);
        assert!(apply_cure(&program, &mut cures, "MaxLeverage", 10.0).success);

        // Both uses consumed through one covenant exhaust the mechanism
        // for the other. Intentional coupling; see DESIGN.md.
        let other = cure_availability(&cures, program.covenant("MinInterestCover").unwrap())
            .unwrap();
        assert_eq!(other.uses_consumed, 2);
        assert!(!other.can_apply);

        let refused = apply_cure(&program, &mut cures, "MinInterestCover", 10.0);
        assert!(!refused.success);
        assert!(refused.reason.unwrap().contains("exhausted"));
    }

    #[test]
    fn cure_amount_limit_is_all_or_nothing() {
        let mut program = Program::new();
        program.insert(Statement::Covenant(Covenant {
            name: "MaxLeverage".to_string(),
            metric: Expr::ident("x"),
            operator: CmpOp::Le,
            thresholds: vec![ThresholdStep {
                value: Expr::number(1.0),
                until: None,
            }],
            cure: Some(CureRight {
                mechanism: "EquityCure".to_string(),
                cure_type: CureType::EquityCure,
                max_uses: None,
                max_amount: Some(10_000_000.0),
            }),
        }));
        let mut cures = CureLedger::new();

        assert!(apply_cure(&program, &mut cures, "MaxLeverage", 8_000_000.0).success);
        let refused = apply_cure(&program, &mut cures, "MaxLeverage", 5_000_000.0);
        assert!(!refused.success);
        // Refused application left consumption unchanged.
        assert_eq!(cures.amount_consumed("EquityCure"), 8_000_000.0);
    }

    #[test]
    fn division_by_zero_propagates_from_metric() {
        let mut program = Program::new();
        program.insert(covenant_stmt(
            "Ratio",
            Expr::binary(BinOp::Div, Expr::ident("a"), Expr::ident("b")),
            CmpOp::Le,
            1.0,
        ));
        let store = loaded_store(&[("a", 1.0), ("b", 0.0)]);
        let baskets = BasketLedger::new();
        let suspended = BTreeSet::new();
        let ctx = CovenantCtx {
            program: &program,
            store: &store,
            baskets: &baskets,
            suspended: &suspended,
            current_date: date!(2027 - 06 - 30),
            period: None,
        };

        assert_eq!(check(&ctx, "Ratio").unwrap_err(), EvalError::DivisionByZero);
    }
}
