//! Production-side statuses: performance guarantees, technical
//! milestones, regulatory requirements, degradation and seasonal
//! factors.
//!
//! These are all read-only derivations over the program and the loaded
//! financial data; nothing here touches a ledger.

use proviso_core::Program;
use time::Date;

use crate::expr::Evaluator;
use crate::ledger::BasketLedger;
use crate::periods::FinancialStore;
use crate::types::{
    PerformanceGuaranteeStatus, RegulatoryRequirementStatus, TechnicalMilestoneStatus, iso,
};

pub(crate) fn performance_guarantee_status(
    program: &Program,
    store: &FinancialStore,
    baskets: &BasketLedger,
    current_date: Date,
    name: &str,
) -> Option<PerformanceGuaranteeStatus> {
    let guarantee = program.performance_guarantee(name)?;
    let mut eval = Evaluator::new(program, store, baskets, current_date);

    let evaluated = eval
        .eval_number(&guarantee.metric)
        .and_then(|actual| eval.eval_number(&guarantee.guaranteed).map(|g| (actual, g)));

    Some(match evaluated {
        Ok((actual, guaranteed)) => {
            let met = guarantee.operator.apply(actual, guaranteed);
            PerformanceGuaranteeStatus {
                name: guarantee.name.clone(),
                actual: Some(actual),
                guaranteed: Some(guaranteed),
                operator: guarantee.operator.symbol().to_string(),
                met,
                shortfall: if met { 0.0 } else { (guaranteed - actual).max(0.0) },
                error: None,
            }
        }
        Err(err) => PerformanceGuaranteeStatus {
            name: guarantee.name.clone(),
            actual: None,
            guaranteed: None,
            operator: guarantee.operator.symbol().to_string(),
            met: false,
            shortfall: 0.0,
            error: Some(err.to_string()),
        },
    })
}

pub(crate) fn technical_milestone_status(
    program: &Program,
    current_date: Date,
    name: &str,
) -> Option<TechnicalMilestoneStatus> {
    let milestone = program.technical_milestone(name)?;
    Some(TechnicalMilestoneStatus {
        name: milestone.name.clone(),
        achieved: milestone.achieved,
        overdue: !milestone.achieved && current_date > milestone.target_date,
        target_date: iso(milestone.target_date),
        certified_by: milestone.certified_by.clone(),
    })
}

pub(crate) fn regulatory_requirement_status(
    program: &Program,
    current_date: Date,
    name: &str,
) -> Option<RegulatoryRequirementStatus> {
    let requirement = program.regulatory_requirement(name)?;
    let expired = requirement
        .expiry
        .map(|e| current_date > e)
        .unwrap_or(false);
    Some(RegulatoryRequirementStatus {
        name: requirement.name.clone(),
        authority: requirement.authority.clone(),
        obtained: requirement.obtained,
        expired,
        expiry: requirement.expiry.map(iso),
    })
}

/// Compounded output factor after `years_in_service` full years of
/// degradation: `(1 - rate)^years`.
pub(crate) fn degradation_factor(program: &Program, name: &str, years_in_service: u32) -> Option<f64> {
    let schedule = program.degradation_schedule(name)?;
    Some((1.0 - schedule.annual_rate).powi(years_in_service as i32))
}

/// Seasonal production factor for a period label, 1.0 when the label is
/// not listed.
pub(crate) fn seasonal_factor(program: &Program, name: &str, period_label: &str) -> Option<f64> {
    let adjustment = program.seasonal_adjustment(name)?;
    Some(
        adjustment
            .factors
            .iter()
            .find(|(label, _)| label == period_label)
            .map(|(_, factor)| *factor)
            .unwrap_or(1.0),
    )
}
