//! Changelog renderer: pure formatting over a `ChangeSummary`.
//!
//! Three presets: `detailed` lists every change with before/after
//! values, `summary` lists titles grouped under impact counts,
//! `executive` keeps only the directional changes in short prose. No
//! business logic lives here; the validation block just cross-checks
//! the summary's own counts so the UI can gate display.

use serde::Serialize;

use crate::classify::{ChangeSummary, Impact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangelogFormat {
    Detailed,
    Summary,
    Executive,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangelogOptions {
    pub format: ChangelogFormat,
}

impl Default for ChangelogOptions {
    fn default() -> Self {
        ChangelogOptions {
            format: ChangelogFormat::Detailed,
        }
    }
}

/// Internal consistency report for a rendered changelog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogValidation {
    pub counts_consistent: bool,
    pub all_classified: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeLog {
    pub text: String,
    pub summary_line: String,
    pub validation: ChangelogValidation,
}

pub fn generate_changelog(summary: &ChangeSummary, options: ChangelogOptions) -> ChangeLog {
    let text = match options.format {
        ChangelogFormat::Detailed => render_detailed(summary),
        ChangelogFormat::Summary => render_summary(summary),
        ChangelogFormat::Executive => render_executive(summary),
    };
    ChangeLog {
        text,
        summary_line: summary_line(summary),
        validation: validate(summary),
    }
}

fn summary_line(summary: &ChangeSummary) -> String {
    let borrower = count(summary, Impact::BorrowerFavorable);
    let lender = count(summary, Impact::LenderFavorable);
    format!(
        "v{} -> v{}: {} changes ({} borrower favorable, {} lender favorable)",
        summary.from_version, summary.to_version, summary.total_changes, borrower, lender
    )
}

fn count(summary: &ChangeSummary, impact: Impact) -> usize {
    summary
        .counts_by_impact
        .get(impact.label())
        .copied()
        .unwrap_or(0)
}

fn impact_tag(impact: Impact) -> &'static str {
    match impact {
        Impact::BorrowerFavorable => "[BORROWER]",
        Impact::LenderFavorable => "[LENDER]",
        Impact::Neutral => "[NEUTRAL]",
        Impact::Unclear => "[REVIEW]",
    }
}

fn render_detailed(summary: &ChangeSummary) -> String {
    let mut lines = vec![
        format!(
            "Changes from v{} to v{} (prepared by {})",
            summary.from_version, summary.to_version, summary.author
        ),
        String::new(),
    ];
    if summary.changes.is_empty() {
        lines.push("No changes.".to_string());
    }
    for change in &summary.changes {
        lines.push(format!(
            "{} {} ({})",
            impact_tag(change.impact),
            change.title,
            change.section_reference
        ));
        lines.push(format!("    {}", change.description));
        if let (Some(before), Some(after)) = (&change.before_value, &change.after_value) {
            lines.push(format!("    before: {}", before));
            lines.push(format!("    after:  {}", after));
        }
        lines.push(format!("    form: {}", change.source_form));
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

fn render_summary(summary: &ChangeSummary) -> String {
    let mut lines = vec![summary_line(summary), String::new()];
    for change in &summary.changes {
        lines.push(format!("{} {}", impact_tag(change.impact), change.title));
    }
    lines.join("\n").trim_end().to_string()
}

fn render_executive(summary: &ChangeSummary) -> String {
    let mut lines = vec![summary_line(summary)];
    let directional: Vec<_> = summary
        .changes
        .iter()
        .filter(|c| {
            matches!(
                c.impact,
                Impact::BorrowerFavorable | Impact::LenderFavorable
            )
        })
        .collect();
    if directional.is_empty() {
        lines.push("No changes shift the negotiated position.".to_string());
    } else {
        lines.push(String::new());
        for change in directional {
            lines.push(format!("- {} {}", impact_tag(change.impact), change.description));
        }
    }
    let review = count(summary, Impact::Unclear);
    if review > 0 {
        lines.push(String::new());
        lines.push(format!("{} change(s) require manual review.", review));
    }
    lines.join("\n")
}

fn validate(summary: &ChangeSummary) -> ChangelogValidation {
    let mut issues = Vec::new();

    let by_impact: usize = summary.counts_by_impact.values().sum();
    let by_kind: usize = summary.counts_by_kind.values().sum();
    let counts_consistent =
        by_impact == summary.total_changes && by_kind == summary.total_changes
            && summary.changes.len() == summary.total_changes;
    if !counts_consistent {
        issues.push(format!(
            "count mismatch: {} changes, {} by impact, {} by kind",
            summary.changes.len(),
            by_impact,
            by_kind
        ));
    }

    let unlabeled = summary
        .changes
        .iter()
        .filter(|c| c.title.is_empty() || c.description.is_empty())
        .count();
    let all_classified = unlabeled == 0;
    if !all_classified {
        issues.push(format!("{} change(s) missing title or description", unlabeled));
    }

    ChangelogValidation {
        counts_consistent,
        all_classified,
        issues,
    }
}
