//! proviso-core: ProViso agreement AST and program arena.
//!
//! Defines the statement and expression trees for the ProViso credit
//! agreement language, the ordered program arena keyed by `(kind, name)`,
//! and the async parser collaborator seam.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`Program`] -- ordered statement arena, keyed by [`ElementKey`]
//! - [`Statement`] / [`StatementKind`] -- the closed statement set
//! - [`Expr`] / [`BinOp`] / [`CmpOp`] / [`Func`] -- expression trees
//! - [`AgreementParser`] / [`ParseOutcome`] -- the parser seam

pub mod ast;
pub mod parse;
pub mod program;

pub use ast::{
    Amendment, AmendmentOp, Basket, BasketKind, BinOp, CmpOp, Condition, ConditionsPrecedent,
    Covenant, CpItem, CreditKind, CureRight, CureType, Define, DegradationSchedule,
    DepreciationMethod, DepreciationSchedule, Event, Expr, FlipEvent, FlipTrigger, Func,
    Milestone, PerformanceGuarantee, Phase, Prohibit, RegulatoryRequirement, Reserve,
    SeasonalAdjustment, Statement, StatementKind, StructureKind, TaxCredit, TaxEquityStructure,
    TechnicalMilestone, ThresholdStep, Tier, TierAmount, TrailingAgg, Transition, Waterfall,
};
pub use parse::{AgreementParser, ParseOutcome, StaticParser};
pub use program::{ElementKey, Program};
