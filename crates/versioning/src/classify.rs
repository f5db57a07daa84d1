//! Change classifier: negotiation-impact labels for diffed elements.
//!
//! A rule table per element kind and field assigns each change a
//! direction. The core directional rule: for a maximum-style covenant
//! (`<=`/`<`) a higher threshold loosens the constraint (borrower
//! favorable); for a minimum-style covenant (`>=`/`>`) it tightens it.
//! Fields with no rule classify as unclear rather than guessing.

use std::collections::BTreeMap;

use proviso_core::{ElementKey, StatementKind};
use serde::Serialize;
use serde_json::Value;

use crate::compile::{CanonicalElement, CompiledState};
use crate::diff::{DiffResult, FieldChange};

/// Negotiation impact of one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    BorrowerFavorable,
    LenderFavorable,
    Neutral,
    Unclear,
}

impl Impact {
    fn invert(self) -> Impact {
        match self {
            Impact::BorrowerFavorable => Impact::LenderFavorable,
            Impact::LenderFavorable => Impact::BorrowerFavorable,
            other => other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Impact::BorrowerFavorable => "borrower_favorable",
            Impact::LenderFavorable => "lender_favorable",
            Impact::Neutral => "neutral",
            Impact::Unclear => "unclear",
        }
    }
}

/// One classified change, ready for changelog rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub impact: Impact,
    pub title: String,
    pub description: String,
    pub element_kind: String,
    pub element_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_value: Option<String>,
    pub section_reference: String,
    pub source_form: String,
}

/// Aggregated result of one comparison. Immutable, produced fresh per
/// comparison, never persisted inside an interpreter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSummary {
    pub from_version: u32,
    pub to_version: u32,
    pub author: String,
    pub total_changes: usize,
    pub counts_by_kind: BTreeMap<String, usize>,
    pub counts_by_impact: BTreeMap<String, usize>,
    pub changes: Vec<Change>,
}

impl ChangeSummary {
    pub fn new(from_version: u32, to_version: u32, author: &str, changes: Vec<Change>) -> ChangeSummary {
        let mut counts_by_kind = BTreeMap::new();
        let mut counts_by_impact = BTreeMap::new();
        for change in &changes {
            *counts_by_kind.entry(change.element_kind.clone()).or_insert(0) += 1;
            *counts_by_impact
                .entry(change.impact.label().to_string())
                .or_insert(0) += 1;
        }
        ChangeSummary {
            from_version,
            to_version,
            author: author.to_string(),
            total_changes: changes.len(),
            counts_by_kind,
            counts_by_impact,
            changes,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Classify every diffed element into changes.
pub fn classify_diff(
    before: &CompiledState,
    after: &CompiledState,
    diff: &DiffResult,
) -> Vec<Change> {
    let mut changes = Vec::new();

    for key in &diff.removed {
        if let Some(element) = before.elements.get(key) {
            changes.push(classify_presence(key, element, false));
        }
    }
    for key in &diff.added {
        if let Some(element) = after.elements.get(key) {
            changes.push(classify_presence(key, element, true));
        }
    }
    for modification in &diff.modified {
        let element = after
            .elements
            .get(&modification.key)
            .or_else(|| before.elements.get(&modification.key));
        let Some(element) = element else { continue };
        for field_change in &modification.fields {
            changes.push(classify_field(&modification.key, element, field_change));
        }
    }

    changes
}

// ──────────────────────────────────────────────
// Added / removed elements
// ──────────────────────────────────────────────

/// Impact of introducing an element of this kind. A new restriction or
/// obligation favors the lender; a new permission favors the borrower.
fn added_impact(kind: StatementKind) -> Impact {
    match kind {
        StatementKind::Covenant
        | StatementKind::Prohibit
        | StatementKind::Event
        | StatementKind::Milestone
        | StatementKind::TechnicalMilestone
        | StatementKind::PerformanceGuarantee
        | StatementKind::RegulatoryRequirement
        | StatementKind::Reserve
        | StatementKind::ConditionsPrecedent => Impact::LenderFavorable,
        StatementKind::Basket => Impact::BorrowerFavorable,
        StatementKind::Define
        | StatementKind::Waterfall
        | StatementKind::Phase
        | StatementKind::Transition
        | StatementKind::SeasonalAdjustment
        | StatementKind::DegradationSchedule
        | StatementKind::Amendment => Impact::Neutral,
        StatementKind::TaxEquityStructure
        | StatementKind::TaxCredit
        | StatementKind::DepreciationSchedule
        | StatementKind::FlipEvent
        | StatementKind::Condition => Impact::Unclear,
    }
}

fn classify_presence(key: &ElementKey, element: &CanonicalElement, added: bool) -> Change {
    let (kind, name) = key;
    let impact = if added {
        added_impact(*kind)
    } else {
        added_impact(*kind).invert()
    };
    let verb = if added { "added" } else { "removed" };
    Change {
        impact,
        title: format!("{} {} {}", kind_label(*kind), name, verb),
        description: format!(
            "{} '{}' was {} in this version.",
            kind_label(*kind),
            name,
            verb
        ),
        element_kind: kind.keyword().to_string(),
        element_name: name.clone(),
        field: None,
        before_value: if added {
            None
        } else {
            Some(element.source_form.clone())
        },
        after_value: if added {
            Some(element.source_form.clone())
        } else {
            None
        },
        section_reference: section_reference(*kind),
        source_form: element.source_form.clone(),
    }
}

// ──────────────────────────────────────────────
// Modified fields
// ──────────────────────────────────────────────

fn classify_field(key: &ElementKey, element: &CanonicalElement, fc: &FieldChange) -> Change {
    let (kind, name) = key;
    let (impact, title, description) = match (kind, fc.field.as_str()) {
        (StatementKind::Covenant, "thresholds") => {
            let operator = element
                .fields
                .get("operator")
                .and_then(|v| v.as_str())
                .unwrap_or("<=");
            classify_thresholds(name, operator, &fc.before, &fc.after)
        }
        (StatementKind::Covenant, "cure") => classify_cure(name, &fc.before, &fc.after),
        (StatementKind::Covenant, "metric") => (
            Impact::Unclear,
            format!("{} tested metric changed", name),
            format!(
                "The formula tested by covenant '{}' changed; direction of impact depends on the new definition.",
                name
            ),
        ),
        (StatementKind::Basket, "capacity") => {
            directional(&fc.before, &fc.after, Impact::BorrowerFavorable).map_or_else(
                || {
                    (
                        Impact::Unclear,
                        format!("{} capacity formula changed", name),
                        format!("Basket '{}' capacity changed to a different formula.", name),
                    )
                },
                |impact| {
                    let word = if impact == Impact::BorrowerFavorable {
                        "increased"
                    } else {
                        "decreased"
                    };
                    (
                        impact,
                        format!("{} capacity {}", name, word),
                        format!(
                            "Basket '{}' capacity {} from {} to {}.",
                            name, word, fc.before, fc.after
                        ),
                    )
                },
            )
        }
        (StatementKind::Reserve, "target") => {
            directional(&fc.before, &fc.after, Impact::LenderFavorable).map_or_else(
                || {
                    (
                        Impact::Unclear,
                        format!("{} target changed", name),
                        format!("Reserve '{}' target funding level changed.", name),
                    )
                },
                |impact| {
                    (
                        impact,
                        format!("{} target funding changed", name),
                        format!(
                            "Reserve '{}' target moved from {} to {}; a larger reserve traps more cash.",
                            name, fc.before, fc.after
                        ),
                    )
                },
            )
        }
        (StatementKind::Milestone, "longstop_date")
        | (StatementKind::Milestone, "target_date")
        | (StatementKind::TechnicalMilestone, "target_date") => {
            classify_date_shift(name, &fc.field, &fc.before, &fc.after)
        }
        (StatementKind::Phase, "suspended_covenants") => {
            let before_len = fc.before.as_array().map(|a| a.len()).unwrap_or(0);
            let after_len = fc.after.as_array().map(|a| a.len()).unwrap_or(0);
            let impact = match after_len.cmp(&before_len) {
                std::cmp::Ordering::Greater => Impact::BorrowerFavorable,
                std::cmp::Ordering::Less => Impact::LenderFavorable,
                std::cmp::Ordering::Equal => Impact::Unclear,
            };
            (
                impact,
                format!("{} suspension set changed", name),
                format!(
                    "Phase '{}' now suspends {} covenants (was {}).",
                    name, after_len, before_len
                ),
            )
        }
        (StatementKind::PerformanceGuarantee, "guaranteed") => {
            directional(&fc.before, &fc.after, Impact::LenderFavorable).map_or_else(
                || {
                    (
                        Impact::Unclear,
                        format!("{} guarantee level changed", name),
                        format!("Guarantee '{}' level changed to a different formula.", name),
                    )
                },
                |impact| {
                    (
                        impact,
                        format!("{} guarantee level changed", name),
                        format!(
                            "Guarantee '{}' moved from {} to {}.",
                            name, fc.before, fc.after
                        ),
                    )
                },
            )
        }
        _ => (
            Impact::Unclear,
            format!("{} {} changed", name, fc.field),
            format!(
                "{} '{}' field '{}' changed; no classification rule applies.",
                kind_label(*kind),
                name,
                fc.field
            ),
        ),
    };

    Change {
        impact,
        title,
        description,
        element_kind: kind.keyword().to_string(),
        element_name: name.clone(),
        field: Some(fc.field.clone()),
        before_value: Some(fc.before.to_string()),
        after_value: Some(fc.after.to_string()),
        section_reference: section_reference(*kind),
        source_form: element.source_form.clone(),
    }
}

/// Numeric direction helper: `up_impact` when the value increased, its
/// inverse when it decreased, `None` when either side is non-numeric.
fn directional(before: &Value, after: &Value, up_impact: Impact) -> Option<Impact> {
    let b = before.as_f64()?;
    let a = after.as_f64()?;
    if a > b {
        Some(up_impact)
    } else if a < b {
        Some(up_impact.invert())
    } else {
        Some(Impact::Neutral)
    }
}

/// Threshold schedules: compare the first differing step. A numeric
/// move is classified against the covenant's operator; an UNTIL date
/// move is a step-down shift (earlier is lender favorable).
fn classify_thresholds(
    name: &str,
    operator: &str,
    before: &Value,
    after: &Value,
) -> (Impact, String, String) {
    let unclear = |detail: &str| {
        (
            Impact::Unclear,
            format!("{} threshold schedule changed", name),
            format!("Covenant '{}' threshold schedule changed: {}.", name, detail),
        )
    };

    let (Some(before_steps), Some(after_steps)) = (before.as_array(), after.as_array()) else {
        return unclear("schedule restructured");
    };

    for (b, a) in before_steps.iter().zip(after_steps.iter()) {
        let bv = b.get("value").and_then(|v| v.as_f64());
        let av = a.get("value").and_then(|v| v.as_f64());
        if let (Some(bv), Some(av)) = (bv, av) {
            if bv != av {
                // Direction relative to the inequality: a looser limit
                // favors the borrower.
                let looser = match operator {
                    "<=" | "<" => av > bv,
                    ">=" | ">" => av < bv,
                    _ => return unclear("equality threshold changed"),
                };
                let impact = if looser {
                    Impact::BorrowerFavorable
                } else {
                    Impact::LenderFavorable
                };
                let word = if looser { "loosened" } else { "tightened" };
                return (
                    impact,
                    format!("{} threshold {}", name, word),
                    format!(
                        "Covenant '{}' threshold {} from {} {} to {} {}.",
                        name, word, operator, bv, operator, av
                    ),
                );
            }
        }
        let b_until = b.get("until").and_then(|v| v.as_str());
        let a_until = a.get("until").and_then(|v| v.as_str());
        if b_until != a_until {
            return match (b_until, a_until) {
                (Some(bu), Some(au)) => {
                    // ISO dates compare lexicographically.
                    let earlier = au < bu;
                    let impact = if earlier {
                        Impact::LenderFavorable
                    } else {
                        Impact::BorrowerFavorable
                    };
                    let word = if earlier { "accelerated" } else { "deferred" };
                    (
                        impact,
                        format!("{} step-down {}", name, word),
                        format!(
                            "Covenant '{}' step-down date moved from {} to {}.",
                            name, bu, au
                        ),
                    )
                }
                _ => unclear("step gating changed"),
            };
        }
    }

    if before_steps.len() != after_steps.len() {
        return unclear("steps added or removed");
    }
    unclear("schedule restructured")
}

fn classify_cure(name: &str, before: &Value, after: &Value) -> (Impact, String, String) {
    match (before.is_null(), after.is_null()) {
        (true, false) => (
            Impact::BorrowerFavorable,
            format!("{} cure right added", name),
            format!("Covenant '{}' gained a cure right.", name),
        ),
        (false, true) => (
            Impact::LenderFavorable,
            format!("{} cure right removed", name),
            format!("Covenant '{}' lost its cure right.", name),
        ),
        _ => {
            for limit in ["max_uses", "max_amount"] {
                let b = before.get(limit).and_then(|v| v.as_f64());
                let a = after.get(limit).and_then(|v| v.as_f64());
                if b != a {
                    if let Some(impact) = directional(
                        &before.get(limit).cloned().unwrap_or(Value::Null),
                        &after.get(limit).cloned().unwrap_or(Value::Null),
                        Impact::BorrowerFavorable,
                    ) {
                        let word = if impact == Impact::BorrowerFavorable {
                            "expanded"
                        } else {
                            "reduced"
                        };
                        return (
                            impact,
                            format!("{} cure {} {}", name, limit, word),
                            format!(
                                "Covenant '{}' cure {} changed from {:?} to {:?}.",
                                name, limit, b, a
                            ),
                        );
                    }
                }
            }
            (
                Impact::Unclear,
                format!("{} cure terms changed", name),
                format!("Covenant '{}' cure mechanism terms changed.", name),
            )
        }
    }
}

fn classify_date_shift(
    name: &str,
    field: &str,
    before: &Value,
    after: &Value,
) -> (Impact, String, String) {
    match (before.as_str(), after.as_str()) {
        (Some(b), Some(a)) => {
            let later = a > b;
            let impact = if later {
                Impact::BorrowerFavorable
            } else {
                Impact::LenderFavorable
            };
            let word = if later { "extended" } else { "pulled in" };
            (
                impact,
                format!("{} {} {}", name, field, word),
                format!("Milestone '{}' {} moved from {} to {}.", name, field, b, a),
            )
        }
        _ => (
            Impact::Unclear,
            format!("{} {} changed", name, field),
            format!("Milestone '{}' {} changed.", name, field),
        ),
    }
}

// ──────────────────────────────────────────────
// Labels
// ──────────────────────────────────────────────

fn kind_label(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Define => "Definition",
        StatementKind::Covenant => "Covenant",
        StatementKind::Basket => "Basket",
        StatementKind::Reserve => "Reserve",
        StatementKind::Waterfall => "Waterfall",
        StatementKind::Phase => "Phase",
        StatementKind::Transition => "Transition",
        StatementKind::Milestone => "Milestone",
        StatementKind::ConditionsPrecedent => "Conditions precedent",
        StatementKind::TaxEquityStructure => "Tax equity structure",
        StatementKind::TaxCredit => "Tax credit",
        StatementKind::DepreciationSchedule => "Depreciation schedule",
        StatementKind::FlipEvent => "Flip event",
        StatementKind::PerformanceGuarantee => "Performance guarantee",
        StatementKind::TechnicalMilestone => "Technical milestone",
        StatementKind::RegulatoryRequirement => "Regulatory requirement",
        StatementKind::DegradationSchedule => "Degradation schedule",
        StatementKind::SeasonalAdjustment => "Seasonal adjustment",
        StatementKind::Prohibit => "Prohibition",
        StatementKind::Event => "Event",
        StatementKind::Condition => "Condition",
        StatementKind::Amendment => "Amendment",
    }
}

fn section_reference(kind: StatementKind) -> String {
    match kind {
        StatementKind::Define => "Definitions",
        StatementKind::Covenant => "Financial Covenants",
        StatementKind::Basket | StatementKind::Prohibit => "Negative Covenants",
        StatementKind::Reserve | StatementKind::Waterfall => "Cash Management",
        StatementKind::Phase
        | StatementKind::Transition
        | StatementKind::Milestone
        | StatementKind::TechnicalMilestone
        | StatementKind::ConditionsPrecedent => "Construction Provisions",
        StatementKind::TaxEquityStructure
        | StatementKind::TaxCredit
        | StatementKind::DepreciationSchedule
        | StatementKind::FlipEvent => "Tax Equity Provisions",
        StatementKind::PerformanceGuarantee
        | StatementKind::DegradationSchedule
        | StatementKind::SeasonalAdjustment => "Operating Provisions",
        StatementKind::RegulatoryRequirement => "Regulatory Matters",
        StatementKind::Event => "Events of Default",
        StatementKind::Condition => "Conditions",
        StatementKind::Amendment => "Amendments",
    }
    .to_string()
}
