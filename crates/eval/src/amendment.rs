//! Amendment application: whole-statement replace/add/remove over the
//! program arena, plus ledger reconciliation.
//!
//! Replacing a Basket or Reserve preserves its ledger entry unless the
//! amendment carries an explicit reset clause: utilization history is a
//! compliance fact that survives a capacity amendment. Removing a
//! statement drops its ledger entry with it.
//!
//! Application is all-or-nothing: the operation list is validated before
//! the first arena or ledger mutation.

use proviso_core::{AmendmentOp, Program, Statement, StatementKind};

use crate::ledger::{BasketLedger, ReserveLedger};
use crate::types::AmendmentOutcome;

pub(crate) fn apply_ops(
    program: &mut Program,
    baskets: &mut BasketLedger,
    reserves: &mut ReserveLedger,
    ops: &[AmendmentOp],
) -> AmendmentOutcome {
    // Validate first so a bad op list changes nothing.
    for op in ops {
        if let AmendmentOp::Remove { kind, name } = op {
            if !program.contains(*kind, name) {
                return AmendmentOutcome {
                    success: false,
                    applied: 0,
                    reason: Some(format!("cannot remove unknown {} '{}'", kind, name)),
                };
            }
        }
    }

    for op in ops {
        match op {
            AmendmentOp::Replace {
                statement,
                reset_ledger,
            } => {
                reconcile_replace(baskets, reserves, statement, *reset_ledger);
                program.insert((**statement).clone());
            }
            AmendmentOp::Add { statement } => {
                program.insert((**statement).clone());
            }
            AmendmentOp::Remove { kind, name } => {
                program.remove(*kind, name);
                match kind {
                    StatementKind::Basket => baskets.remove(name),
                    StatementKind::Reserve => reserves.remove(name),
                    _ => {}
                }
            }
        }
    }

    AmendmentOutcome {
        success: true,
        applied: ops.len(),
        reason: None,
    }
}

fn reconcile_replace(
    baskets: &mut BasketLedger,
    reserves: &mut ReserveLedger,
    statement: &Statement,
    reset_ledger: bool,
) {
    if !reset_ledger {
        return;
    }
    match statement {
        Statement::Basket(b) => baskets.reset(&b.name),
        Statement::Reserve(r) => reserves.reset(&r.name),
        _ => {}
    }
}
