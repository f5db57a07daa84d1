//! Runtime value, error, and status types for the ProViso interpreter.
//!
//! Status types are the interchange contract with the dashboard: all of
//! them serialize to JSON. Dates are rendered as ISO-8601 strings at this
//! boundary; `time::Date` stays internal.

use std::fmt;

use serde::Serialize;
use time::Date;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors raised while evaluating an expression.
///
/// These abort the single evaluation they occur in and propagate to the
/// immediate caller; they never corrupt ledgers or other elements'
/// results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Division by zero anywhere in an arithmetic context. Never silently
    /// Infinity or NaN.
    #[error("division by zero")]
    DivisionByZero,

    /// A DEFINE resolves through itself. The cycle lists the definition
    /// names in resolution order, ending where it started.
    #[error("circular definition: {}", .cycle.join(" -> "))]
    CircularDefinition { cycle: Vec<String> },

    #[error("undefined identifier: {name}")]
    UndefinedIdentifier { name: String },

    #[error("type error: {message}")]
    TypeError { message: String },

    /// A covenant/basket/reserve/milestone name that does not exist.
    #[error("unknown {kind}: {name}")]
    UnknownElement { kind: String, name: String },
}

/// Failures of mutating operations.
///
/// These are expected business outcomes, not defects: the operation
/// reports the failure and leaves every ledger unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error("cure mechanism '{mechanism}' exhausted: {reason}")]
    CureExhausted { mechanism: String, reason: String },

    #[error(
        "insufficient balance in reserve '{reserve}': requested {requested}, available {available}"
    )]
    InsufficientReserveBalance {
        reserve: String,
        requested: f64,
        available: f64,
    },

    /// A waterfall tier both funds and draws the same reserve in one pass.
    #[error("tier '{tier}' both funds and draws reserve '{reserve}'")]
    ReserveSelfReference { tier: String, reserve: String },

    #[error("unknown {kind}: {name}")]
    UnknownElement { kind: String, name: String },

    /// A mutating operation re-entered while another was in progress.
    #[error("concurrent mutation: a mutating operation is already in progress")]
    ConcurrentMutation,

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Non-fatal conditions attached to an evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalWarning {
    /// `TRAILING n PERIOD_OF` ran with fewer than n periods loaded.
    /// Callers decide whether to treat this as fail-closed.
    InsufficientPeriods { requested: u32, available: u32 },
}

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A runtime value. The numeric model is ordinary double precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Bool(_) => "Bool",
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(EvalError::TypeError {
                message: format!("expected Number, got {}", other.type_name()),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::TypeError {
                message: format!("expected Bool, got {}", other.type_name()),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Render a date as ISO-8601 for the status boundary.
pub(crate) fn iso(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

// ──────────────────────────────────────────────
// Covenant statuses
// ──────────────────────────────────────────────

/// Result of a single covenant check.
///
/// `headroom_pct` is signed: positive iff the covenant is compliant on the
/// merits. A suspended covenant reports `compliant = true` with
/// `suspended = true` so callers do not mistake suspension for passing.
/// When `error` is set the check could not be evaluated (for example a
/// circular DEFINE) and `compliant` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovenantResult {
    pub name: String,
    pub actual: Option<f64>,
    pub threshold: Option<f64>,
    pub operator: String,
    pub compliant: bool,
    pub headroom_pct: Option<f64>,
    pub suspended: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EvalWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CovenantResult {
    pub(crate) fn failed(name: &str, operator: &str, error: String) -> CovenantResult {
        CovenantResult {
            name: name.to_string(),
            actual: None,
            threshold: None,
            operator: operator.to_string(),
            compliant: false,
            headroom_pct: None,
            suspended: false,
            warnings: Vec::new(),
            error: Some(error),
        }
    }
}

/// Availability of a covenant's cure mechanism at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CureAvailability {
    pub mechanism: String,
    pub cure_type: String,
    pub uses_consumed: u32,
    pub uses_remaining: Option<u32>,
    pub amount_consumed: f64,
    pub amount_remaining: Option<f64>,
    pub can_apply: bool,
}

/// Covenant check plus the cure view the dashboard renders next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovenantWithCure {
    pub covenant: CovenantResult,
    pub cure: Option<CureAvailability>,
}

/// Outcome of applying a cure: consumption recorded, or a reason it was
/// refused. Cure application never re-checks the covenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CureOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ──────────────────────────────────────────────
// Basket and reserve statuses
// ──────────────────────────────────────────────

/// One recorded basket usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Basket capacity is re-evaluated per query; `available` may be negative
/// (over-utilized) and callers decide policy. A capacity that fails to
/// evaluate reports `error` with no capacity figures, isolated to this
/// basket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketStatus {
    pub name: String,
    pub kind: String,
    pub capacity: Option<f64>,
    pub used: f64,
    pub available: Option<f64>,
    pub overdrawn: bool,
    pub history: Vec<UsageRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EvalWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReserveStatus {
    pub name: String,
    pub balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

// ──────────────────────────────────────────────
// Waterfall results
// ──────────────────────────────────────────────

/// A shortfall routed to a reserve: the draw either covered the full
/// shortfall or failed whole, leaving the reserve untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReserveDraw {
    pub reserve: String,
    pub requested: f64,
    pub drawn: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierResult {
    pub priority: u32,
    pub name: String,
    /// False when the tier's IF gate evaluated false.
    pub executed: bool,
    pub required: f64,
    pub paid: f64,
    pub shortfall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve_draw: Option<ReserveDraw>,
    /// Reserve this tier's payment was deposited into, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funded_reserve: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallResult {
    pub name: String,
    pub revenue: f64,
    pub tiers: Vec<TierResult>,
    /// Cash left after the last tier.
    pub remaining: f64,
}

// ──────────────────────────────────────────────
// Phase / milestone / conditions precedent
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneState {
    Achieved,
    Breached,
    AtRisk,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneStatus {
    pub name: String,
    pub state: MilestoneState,
    pub target_date: String,
    pub longstop_date: String,
    /// Negative once the longstop has passed.
    pub days_until_longstop: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStatus {
    pub name: String,
    pub suspended_covenants: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CpItemState {
    Pending,
    InProgress,
    Satisfied,
    Waived,
    NotApplicable,
}

impl CpItemState {
    /// Waived and not-applicable items count as complete for checklist
    /// percentage purposes.
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            CpItemState::Satisfied | CpItemState::Waived | CpItemState::NotApplicable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpItemStatus {
    pub name: String,
    pub description: String,
    pub state: CpItemState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpChecklist {
    pub name: String,
    pub items: Vec<CpItemStatus>,
    pub completion_pct: f64,
}

// ──────────────────────────────────────────────
// Multi-period / calculation provenance
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceHistoryEntry {
    pub period: String,
    pub period_end: String,
    pub covenants: Vec<CovenantResult>,
}

/// One node of a calculation drill-down tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcNode {
    pub label: String,
    pub formula: String,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CalcNode>,
}

// ──────────────────────────────────────────────
// Tax equity statuses
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxEquityStructureStatus {
    pub name: String,
    pub kind: String,
    pub has_flipped: bool,
    /// Current investor allocation: pre-flip until the associated flip
    /// event triggers, post-flip afterward.
    pub investor_allocation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_return: Option<f64>,
    /// Flip events that name this structure.
    pub flip_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxCreditStatus {
    pub name: String,
    pub kind: String,
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepreciationYear {
    pub schedule: String,
    pub year: u32,
    pub rate: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlipEventStatus {
    pub name: String,
    pub structure: String,
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_value: Option<f64>,
}

/// Outcome of `trigger_flip`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlipOutcome {
    pub success: bool,
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ──────────────────────────────────────────────
// Production / regulatory statuses
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceGuaranteeStatus {
    pub name: String,
    pub actual: Option<f64>,
    pub guaranteed: Option<f64>,
    pub operator: String,
    pub met: bool,
    /// Positive when actual falls short of the guarantee.
    pub shortfall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalMilestoneStatus {
    pub name: String,
    pub achieved: bool,
    pub overdue: bool,
    pub target_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulatoryRequirementStatus {
    pub name: String,
    pub authority: String,
    pub obtained: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProhibitStatus {
    pub name: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unless_basket: Option<String>,
    /// Carve-out capacity remaining, when a basket is named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carve_out_available: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionStatus {
    pub name: String,
    pub satisfied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStatus {
    pub name: String,
    pub triggered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ──────────────────────────────────────────────
// Amendments
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmendmentOutcome {
    pub success: bool,
    pub applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
