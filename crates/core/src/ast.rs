//! Shared AST types for ProViso agreements.
//!
//! These types are produced by the external parser and consumed by the
//! interpreter and the versioning compiler. They live here so that both
//! crates can import them without depending on each other.
//!
//! Expression and statement trees are immutable once constructed; the only
//! sanctioned mutation path is whole-statement replacement through the
//! program arena (see `program.rs`).

use std::fmt;

use time::Date;

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

/// Binary operators, arithmetic and boolean.
///
/// Comparison operators are exact (no epsilon); the single tolerance the
/// language defines lives at the flip-event trigger site, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    /// Returns true for operators whose result is a Bool.
    pub fn is_boolean(self) -> bool {
        !matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    /// Returns true for operators where operand order does not matter.
    /// Used by the versioning compiler to canonicalize operand order so
    /// that `a + b` and `b + a` do not diff.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or
        )
    }

    /// Source-level symbol for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }
}

/// Comparison operators used in covenant requirements and guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
        }
    }

    /// Apply the comparison exactly. No epsilon.
    pub fn apply(self, actual: f64, threshold: f64) -> bool {
        match self {
            CmpOp::Lt => actual < threshold,
            CmpOp::Le => actual <= threshold,
            CmpOp::Gt => actual > threshold,
            CmpOp::Ge => actual >= threshold,
            CmpOp::Eq => actual == threshold,
        }
    }

    /// Returns true when a larger threshold loosens the constraint
    /// (maximum-style covenants such as `Leverage <= 4.50`).
    pub fn larger_threshold_is_looser(self) -> Option<bool> {
        match self {
            CmpOp::Lt | CmpOp::Le => Some(true),
            CmpOp::Gt | CmpOp::Ge => Some(false),
            CmpOp::Eq => None,
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Func {
    /// AVAILABLE(basket) -- remaining basket capacity.
    Available,
    /// COMPLIANT(covenant) -- whether the named covenant currently passes.
    Compliant,
    /// EXISTS(name) -- whether the named element or metric is present.
    Exists,
    /// GREATER_OF(a, b, ...) -- maximum of the arguments.
    GreaterOf,
    /// LESSER_OF(a, b, ...) -- minimum of the arguments.
    LesserOf,
    /// ALL_OF(m1, m2, ...) -- true when every named milestone is achieved.
    AllOf,
    /// ANY_OF(m1, m2, ...) -- true when at least one named milestone is achieved.
    AnyOf,
}

impl Func {
    pub fn keyword(self) -> &'static str {
        match self {
            Func::Available => "AVAILABLE",
            Func::Compliant => "COMPLIANT",
            Func::Exists => "EXISTS",
            Func::GreaterOf => "GREATER_OF",
            Func::LesserOf => "LESSER_OF",
            Func::AllOf => "ALL_OF",
            Func::AnyOf => "ANY_OF",
        }
    }
}

/// Reduction applied by `TRAILING n PERIOD_OF expr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrailingAgg {
    Sum,
    Average,
}

/// An expression tree.
///
/// Expressions are owned by the statement that declares them and are never
/// mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    /// A metric or Define reference, resolved at evaluation time.
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
    /// TRAILING n PERIOD_OF expr -- evaluate against each of the last n
    /// periods and reduce.
    Trailing {
        periods: u32,
        agg: TrailingAgg,
        expr: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn number(n: f64) -> Expr {
        Expr::Number(n)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: Func, args: Vec<Expr>) -> Expr {
        Expr::Call { func, args }
    }
}

impl fmt::Display for Expr {
    /// Renders the expression in source form. Binary expressions are
    /// parenthesized so the rendering is unambiguous without precedence
    /// knowledge.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Expr::Text(s) => write!(f, "\"{}\"", s),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.keyword())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Trailing { periods, agg, expr } => {
                let kw = match agg {
                    TrailingAgg::Sum => "TRAILING",
                    TrailingAgg::Average => "TRAILING_AVG",
                };
                write!(f, "{} {} PERIOD_OF {}", kw, periods, expr)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Covenants and cure rights
// ──────────────────────────────────────────────

/// One step of a date-gated threshold schedule.
///
/// `<= 4.50 UNTIL 2027-12-31, THEN <= 4.00` becomes two steps; the first
/// with `until = Some(2027-12-31)`, the second open-ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdStep {
    pub value: Expr,
    pub until: Option<Date>,
}

/// Kinds of cure mechanism the language recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CureType {
    EquityCure,
    EbitdaCure,
    CapitalContribution,
}

impl CureType {
    pub fn keyword(self) -> &'static str {
        match self {
            CureType::EquityCure => "EQUITY_CURE",
            CureType::EbitdaCure => "EBITDA_CURE",
            CureType::CapitalContribution => "CAPITAL_CONTRIBUTION",
        }
    }
}

/// A cure right attached to a covenant.
///
/// `mechanism` is the consumption identity: two covenants naming the same
/// mechanism share uses and amount consumed. This coupling is deliberate
/// and tested; see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub struct CureRight {
    pub mechanism: String,
    pub cure_type: CureType,
    pub max_uses: Option<u32>,
    pub max_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Covenant {
    pub name: String,
    pub metric: Expr,
    pub operator: CmpOp,
    pub thresholds: Vec<ThresholdStep>,
    pub cure: Option<CureRight>,
}

// ──────────────────────────────────────────────
// Baskets and reserves
// ──────────────────────────────────────────────

/// Capacity style, carried for classification; the capacity itself is
/// always an expression re-evaluated against current financial data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BasketKind {
    Fixed,
    Grower,
    Builder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub name: String,
    pub kind: BasketKind,
    pub capacity: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reserve {
    pub name: String,
    /// Target funding level, when the agreement declares one.
    pub target: Option<Expr>,
}

// ──────────────────────────────────────────────
// Waterfalls
// ──────────────────────────────────────────────

/// How a tier's required amount is computed.
#[derive(Debug, Clone, PartialEq)]
pub enum TierAmount {
    /// A fixed or expression-valued amount.
    Amount(Expr),
    /// Whatever cash remains after prior tiers.
    Remainder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub priority: u32,
    pub name: String,
    pub amount: TierAmount,
    /// Optional IF gate; the tier is skipped when this evaluates false.
    pub condition: Option<Expr>,
    /// Reserve this tier deposits its paid amount into.
    pub fund_reserve: Option<String>,
    /// Reserve drawn to cover a shortfall on this tier.
    pub shortfall_reserve: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waterfall {
    pub name: String,
    pub tiers: Vec<Tier>,
}

// ──────────────────────────────────────────────
// Phases, transitions, milestones
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    /// Covenants suspended while this phase is active.
    pub suspended_covenants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub name: String,
    pub to_phase: String,
    pub predicate: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Milestone {
    pub name: String,
    pub target_date: Date,
    pub longstop_date: Date,
    pub achieved: bool,
    pub achieved_date: Option<Date>,
}

/// A conditions-precedent block: named checklist items gating an event
/// (typically closing or a phase transition).
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionsPrecedent {
    pub name: String,
    pub items: Vec<CpItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpItem {
    pub name: String,
    pub description: String,
}

// ──────────────────────────────────────────────
// Tax equity
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StructureKind {
    PartnershipFlip,
    SaleLeaseback,
    InvertedLease,
}

impl StructureKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StructureKind::PartnershipFlip => "PARTNERSHIP_FLIP",
            StructureKind::SaleLeaseback => "SALE_LEASEBACK",
            StructureKind::InvertedLease => "INVERTED_LEASE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxEquityStructure {
    pub name: String,
    pub kind: StructureKind,
    /// Investor allocation percentages before and after the flip, 0..=1.
    pub investor_pre_flip: f64,
    pub investor_post_flip: f64,
    /// Target investor IRR that a return-based flip event tests against.
    pub target_return: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CreditKind {
    /// Investment tax credit: one-time, basis-based.
    Itc,
    /// Production tax credit: per-period, production-based.
    Ptc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxCredit {
    pub name: String,
    pub kind: CreditKind,
    /// ITC: rate x basis in year one. PTC: per-period credit amount.
    pub amount: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DepreciationMethod {
    Macrs5,
    Macrs7,
    StraightLine { years: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepreciationSchedule {
    pub name: String,
    pub method: DepreciationMethod,
    pub basis: Expr,
}

/// What triggers a flip event.
#[derive(Debug, Clone, PartialEq)]
pub enum FlipTrigger {
    /// Triggered when the investor's achieved return reaches the target.
    TargetReturn(f64),
    /// Triggered on or after a fixed date.
    Date(Date),
}

/// A flip event names exactly one structure. A trigger affects that
/// structure only, never any other.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipEvent {
    pub name: String,
    pub structure: String,
    pub trigger: FlipTrigger,
}

// ──────────────────────────────────────────────
// Production and regulatory statements
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceGuarantee {
    pub name: String,
    /// Measured metric, e.g. actual generation.
    pub metric: Expr,
    /// Guaranteed level the metric must meet.
    pub guaranteed: Expr,
    pub operator: CmpOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalMilestone {
    pub name: String,
    pub target_date: Date,
    pub achieved: bool,
    /// Certifying party, when the agreement requires one.
    pub certified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatoryRequirement {
    pub name: String,
    pub authority: String,
    pub obtained: bool,
    pub expiry: Option<Date>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DegradationSchedule {
    pub name: String,
    /// Annual output degradation rate, 0..=1 (e.g. 0.005 for 0.5%/yr).
    pub annual_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalAdjustment {
    pub name: String,
    /// Factor per period label ("Q1".."Q4" or month names), applied to
    /// expected production.
    pub factors: Vec<(String, f64)>,
}

// ──────────────────────────────────────────────
// Prohibitions, events, conditions
// ──────────────────────────────────────────────

/// A negative covenant: an action is prohibited unless a basket carve-out
/// has capacity for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Prohibit {
    pub name: String,
    pub action: String,
    pub unless_basket: Option<String>,
}

/// A named event (typically an event of default) with a trigger predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub trigger: Expr,
    pub consequence: Option<String>,
}

/// A named boolean condition evaluated on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub name: String,
    pub predicate: Expr,
}

// ──────────────────────────────────────────────
// Amendments
// ──────────────────────────────────────────────

/// A single amendment operation over the program arena.
#[derive(Debug, Clone, PartialEq)]
pub enum AmendmentOp {
    /// Replace the statement with the same (kind, name) key.
    ///
    /// `reset_ledger` is the explicit reset clause: without it, basket
    /// usage and reserve balances survive the replacement.
    Replace {
        statement: Box<Statement>,
        reset_ledger: bool,
    },
    Add {
        statement: Box<Statement>,
    },
    Remove {
        kind: StatementKind,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Amendment {
    pub name: String,
    pub ops: Vec<AmendmentOp>,
}

// ──────────────────────────────────────────────
// Statements
// ──────────────────────────────────────────────

/// Closed set of statement kinds. Used with the statement name as the
/// arena and diff key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatementKind {
    Define,
    Covenant,
    Basket,
    Reserve,
    Waterfall,
    Phase,
    Transition,
    Milestone,
    ConditionsPrecedent,
    TaxEquityStructure,
    TaxCredit,
    DepreciationSchedule,
    FlipEvent,
    PerformanceGuarantee,
    TechnicalMilestone,
    RegulatoryRequirement,
    DegradationSchedule,
    SeasonalAdjustment,
    Prohibit,
    Event,
    Condition,
    Amendment,
}

impl StatementKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StatementKind::Define => "DEFINE",
            StatementKind::Covenant => "COVENANT",
            StatementKind::Basket => "BASKET",
            StatementKind::Reserve => "RESERVE",
            StatementKind::Waterfall => "WATERFALL",
            StatementKind::Phase => "PHASE",
            StatementKind::Transition => "TRANSITION",
            StatementKind::Milestone => "MILESTONE",
            StatementKind::ConditionsPrecedent => "CONDITIONS_PRECEDENT",
            StatementKind::TaxEquityStructure => "TAX_EQUITY_STRUCTURE",
            StatementKind::TaxCredit => "TAX_CREDIT",
            StatementKind::DepreciationSchedule => "DEPRECIATION_SCHEDULE",
            StatementKind::FlipEvent => "FLIP_EVENT",
            StatementKind::PerformanceGuarantee => "PERFORMANCE_GUARANTEE",
            StatementKind::TechnicalMilestone => "TECHNICAL_MILESTONE",
            StatementKind::RegulatoryRequirement => "REGULATORY_REQUIREMENT",
            StatementKind::DegradationSchedule => "DEGRADATION_SCHEDULE",
            StatementKind::SeasonalAdjustment => "SEASONAL_ADJUSTMENT",
            StatementKind::Prohibit => "PROHIBIT",
            StatementKind::Event => "EVENT",
            StatementKind::Condition => "CONDITION",
            StatementKind::Amendment => "AMENDMENT",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A named definition: `DEFINE EBITDA AS net_income + interest + ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Define {
    pub name: String,
    pub formula: Expr,
}

/// A top-level statement. Every consumer pattern-matches this closed set;
/// adding a kind is a compile-time exhaustiveness failure everywhere that
/// needs updating.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Define(Define),
    Covenant(Covenant),
    Basket(Basket),
    Reserve(Reserve),
    Waterfall(Waterfall),
    Phase(Phase),
    Transition(Transition),
    Milestone(Milestone),
    ConditionsPrecedent(ConditionsPrecedent),
    TaxEquityStructure(TaxEquityStructure),
    TaxCredit(TaxCredit),
    DepreciationSchedule(DepreciationSchedule),
    FlipEvent(FlipEvent),
    PerformanceGuarantee(PerformanceGuarantee),
    TechnicalMilestone(TechnicalMilestone),
    RegulatoryRequirement(RegulatoryRequirement),
    DegradationSchedule(DegradationSchedule),
    SeasonalAdjustment(SeasonalAdjustment),
    Prohibit(Prohibit),
    Event(Event),
    Condition(Condition),
    Amendment(Amendment),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Define(_) => StatementKind::Define,
            Statement::Covenant(_) => StatementKind::Covenant,
            Statement::Basket(_) => StatementKind::Basket,
            Statement::Reserve(_) => StatementKind::Reserve,
            Statement::Waterfall(_) => StatementKind::Waterfall,
            Statement::Phase(_) => StatementKind::Phase,
            Statement::Transition(_) => StatementKind::Transition,
            Statement::Milestone(_) => StatementKind::Milestone,
            Statement::ConditionsPrecedent(_) => StatementKind::ConditionsPrecedent,
            Statement::TaxEquityStructure(_) => StatementKind::TaxEquityStructure,
            Statement::TaxCredit(_) => StatementKind::TaxCredit,
            Statement::DepreciationSchedule(_) => StatementKind::DepreciationSchedule,
            Statement::FlipEvent(_) => StatementKind::FlipEvent,
            Statement::PerformanceGuarantee(_) => StatementKind::PerformanceGuarantee,
            Statement::TechnicalMilestone(_) => StatementKind::TechnicalMilestone,
            Statement::RegulatoryRequirement(_) => StatementKind::RegulatoryRequirement,
            Statement::DegradationSchedule(_) => StatementKind::DegradationSchedule,
            Statement::SeasonalAdjustment(_) => StatementKind::SeasonalAdjustment,
            Statement::Prohibit(_) => StatementKind::Prohibit,
            Statement::Event(_) => StatementKind::Event,
            Statement::Condition(_) => StatementKind::Condition,
            Statement::Amendment(_) => StatementKind::Amendment,
        }
    }

    /// The statement's stable name, unique within its kind.
    pub fn name(&self) -> &str {
        match self {
            Statement::Define(s) => &s.name,
            Statement::Covenant(s) => &s.name,
            Statement::Basket(s) => &s.name,
            Statement::Reserve(s) => &s.name,
            Statement::Waterfall(s) => &s.name,
            Statement::Phase(s) => &s.name,
            Statement::Transition(s) => &s.name,
            Statement::Milestone(s) => &s.name,
            Statement::ConditionsPrecedent(s) => &s.name,
            Statement::TaxEquityStructure(s) => &s.name,
            Statement::TaxCredit(s) => &s.name,
            Statement::DepreciationSchedule(s) => &s.name,
            Statement::FlipEvent(s) => &s.name,
            Statement::PerformanceGuarantee(s) => &s.name,
            Statement::TechnicalMilestone(s) => &s.name,
            Statement::RegulatoryRequirement(s) => &s.name,
            Statement::DegradationSchedule(s) => &s.name,
            Statement::SeasonalAdjustment(s) => &s.name,
            Statement::Prohibit(s) => &s.name,
            Statement::Event(s) => &s.name,
            Statement::Condition(s) => &s.name,
            Statement::Amendment(s) => &s.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_source_form() {
        let expr = Expr::binary(
            BinOp::Div,
            Expr::ident("total_debt"),
            Expr::ident("EBITDA"),
        );
        assert_eq!(expr.to_string(), "(total_debt / EBITDA)");

        let call = Expr::call(
            Func::GreaterOf,
            vec![Expr::number(50_000_000.0), Expr::ident("ebitda_share")],
        );
        assert_eq!(call.to_string(), "GREATER_OF(50000000, ebitda_share)");

        let trailing = Expr::Trailing {
            periods: 4,
            agg: TrailingAgg::Sum,
            expr: Box::new(Expr::ident("EBITDA")),
        };
        assert_eq!(trailing.to_string(), "TRAILING 4 PERIOD_OF EBITDA");
    }

    #[test]
    fn cmp_op_is_exact() {
        assert!(CmpOp::Le.apply(4.5, 4.5));
        assert!(!CmpOp::Lt.apply(4.5, 4.5));
        assert!(CmpOp::Eq.apply(0.1 + 0.2, 0.1 + 0.2));
    }

    #[test]
    fn statement_kind_roundtrip() {
        let stmt = Statement::Covenant(Covenant {
            name: "MaxLeverage".to_string(),
            metric: Expr::ident("Leverage"),
            operator: CmpOp::Le,
            thresholds: vec![ThresholdStep {
                value: Expr::number(4.5),
                until: None,
            }],
            cure: None,
        });
        assert_eq!(stmt.kind(), StatementKind::Covenant);
        assert_eq!(stmt.name(), "MaxLeverage");
    }
}
