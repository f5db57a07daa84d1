//! Waterfall execution engine.
//!
//! Tiers execute strictly in ascending priority order against the
//! revenue passed in. Reserve mutations are staged on a scratch ledger
//! and committed only after every tier has executed, so any failure
//! (self-referential tier, evaluation error) leaves the real ledgers
//! unchanged.

use proviso_core::{Program, TierAmount, Waterfall};
use time::Date;

use crate::expr::Evaluator;
use crate::ledger::{BasketLedger, ReserveLedger};
use crate::periods::FinancialStore;
use crate::types::{MutationError, ReserveDraw, TierResult, WaterfallResult};

pub(crate) fn execute(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    reserves: &mut ReserveLedger,
    current_date: Date,
    name: &str,
    revenue: f64,
) -> Result<WaterfallResult, MutationError> {
    let waterfall = program
        .waterfall(name)
        .ok_or_else(|| MutationError::UnknownElement {
            kind: "waterfall".to_string(),
            name: name.to_string(),
        })?;

    // A tier must not both fund and draw the same reserve in one pass;
    // the net effect would be ambiguous. Checked before any mutation.
    check_self_reference(waterfall)?;

    let mut tiers: Vec<_> = waterfall.tiers.iter().collect();
    tiers.sort_by_key(|t| t.priority);

    let mut staged = reserves.clone();
    let mut eval = Evaluator::new(program, store, baskets, current_date);
    let mut results = Vec::with_capacity(tiers.len());
    let mut remaining = revenue;

    for tier in tiers {
        if let Some(condition) = &tier.condition {
            if !eval.eval_bool(condition)? {
                results.push(TierResult {
                    priority: tier.priority,
                    name: tier.name.clone(),
                    executed: false,
                    required: 0.0,
                    paid: 0.0,
                    shortfall: 0.0,
                    reserve_draw: None,
                    funded_reserve: None,
                });
                continue;
            }
        }

        let required = match &tier.amount {
            TierAmount::Amount(expr) => eval.eval_number(expr)?,
            TierAmount::Remainder => remaining,
        };
        let paid = required.min(remaining);
        remaining -= paid;
        // Cash shortfall before any reserve draw.
        let shortfall = required - paid;

        let reserve_draw = match (&tier.shortfall_reserve, shortfall > 0.0) {
            (Some(reserve), true) => Some(match staged.draw(reserve, shortfall) {
                Ok(_) => ReserveDraw {
                    reserve: reserve.clone(),
                    requested: shortfall,
                    drawn: shortfall,
                    error: None,
                },
                Err(err) => ReserveDraw {
                    reserve: reserve.clone(),
                    requested: shortfall,
                    drawn: 0.0,
                    error: Some(err.to_string()),
                },
            }),
            _ => None,
        };

        let funded_reserve = match &tier.fund_reserve {
            Some(reserve) => {
                if paid > 0.0 {
                    staged.fund(reserve, paid);
                }
                Some(reserve.clone())
            }
            None => None,
        };

        results.push(TierResult {
            priority: tier.priority,
            name: tier.name.clone(),
            executed: true,
            required,
            paid,
            shortfall,
            reserve_draw,
            funded_reserve,
        });
    }

    *reserves = staged;
    Ok(WaterfallResult {
        name: waterfall.name.clone(),
        revenue,
        tiers: results,
        remaining,
    })
}

fn check_self_reference(waterfall: &Waterfall) -> Result<(), MutationError> {
    for tier in &waterfall.tiers {
        if let (Some(fund), Some(draw)) = (&tier.fund_reserve, &tier.shortfall_reserve) {
            if fund == draw {
                return Err(MutationError::ReserveSelfReference {
                    tier: tier.name.clone(),
                    reserve: fund.clone(),
                });
            }
        }
    }
    Ok(())
}
