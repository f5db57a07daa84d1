//! proviso-eval: the ProViso agreement interpreter.
//!
//! An `Interpreter` owns one parsed agreement plus all of its runtime
//! state: basket/cure/reserve ledgers, conditions-precedent checklist
//! state, flip-event state, and the loaded financial data. Construct a
//! fresh instance per loaded agreement; ledgers are discarded, not
//! migrated, when a new agreement is loaded.
//!
//! Every public method is synchronous and runs to completion; the only
//! async boundary in the system is the parser seam (`load_from_code`).
//! Mutating operations are protected by a re-entrancy guard that fails
//! fast with `ConcurrentMutation` rather than corrupting ledger state.

use std::cell::Cell;
use std::collections::BTreeSet;

use proviso_core::{AgreementParser, AmendmentOp, Program, Statement};
use time::Date;

pub mod amendment;
pub mod covenant;
pub mod expr;
pub mod ledger;
pub mod periods;
pub mod phase;
pub mod production;
pub mod taxequity;
pub mod types;
pub mod waterfall;

pub use expr::Evaluator;
pub use ledger::{BasketLedger, CureLedger, ReserveLedger};
pub use periods::{FinancialData, FinancialStore, PeriodData, PeriodType};
pub use phase::{CpLedger, DEFAULT_WARNING_WINDOW_DAYS};
pub use taxequity::FlipLedger;
pub use types::{
    AmendmentOutcome, BasketStatus, CalcNode, ComplianceHistoryEntry, ConditionStatus,
    CovenantResult, CovenantWithCure, CpChecklist, CpItemState, CureAvailability, CureOutcome,
    DepreciationYear, EvalError, EvalWarning, EventStatus, FlipEventStatus, FlipOutcome,
    MilestoneState, MilestoneStatus, MutationError, PerformanceGuaranteeStatus, PhaseStatus,
    ProhibitStatus, RegulatoryRequirementStatus, ReserveStatus, TaxCreditStatus,
    TaxEquityStructureStatus, TechnicalMilestoneStatus, TierResult, UsageRecord, Value,
    WaterfallResult,
};

/// Errors fatal to loading an agreement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(String),
}

/// One loaded agreement and all of its runtime state.
#[derive(Debug)]
pub struct Interpreter {
    program: Program,
    store: FinancialStore,
    baskets: BasketLedger,
    cures: CureLedger,
    reserves: ReserveLedger,
    cp: CpLedger,
    flips: FlipLedger,
    current_date: Date,
    warning_window_days: i64,
    mutating: Cell<bool>,
}

/// RAII re-entrancy guard for mutating operations. Borrows only the
/// flag cell so the guarded operation keeps full access to the other
/// interpreter fields.
struct MutationGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> MutationGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Result<MutationGuard<'a>, MutationError> {
        if flag.get() {
            return Err(MutationError::ConcurrentMutation);
        }
        flag.set(true);
        Ok(MutationGuard { flag })
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl Interpreter {
    /// Construct an interpreter over a parsed program. The current date
    /// is injected, never wall-clock, so historical evaluation is
    /// deterministic.
    pub fn new(program: Program, current_date: Date) -> Interpreter {
        Interpreter {
            program,
            store: FinancialStore::empty(),
            baskets: BasketLedger::new(),
            cures: CureLedger::new(),
            reserves: ReserveLedger::new(),
            cp: CpLedger::new(),
            flips: FlipLedger::new(),
            current_date,
            warning_window_days: DEFAULT_WARNING_WINDOW_DAYS,
            mutating: Cell::new(false),
        }
    }

    /// Parse source text and construct a fresh interpreter. Previous
    /// interpreters (and their ledgers) are unaffected.
    pub async fn load_from_code(
        parser: &dyn AgreementParser,
        source: &str,
        current_date: Date,
    ) -> Result<Interpreter, LoadError> {
        let outcome = parser.parse(source).await;
        match outcome.program {
            Some(program) if outcome.success => Ok(Interpreter::new(program, current_date)),
            _ => Err(LoadError::Parse(
                outcome.error.unwrap_or_else(|| "unknown parse error".to_string()),
            )),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn current_date(&self) -> Date {
        self.current_date
    }

    pub fn set_current_date(&mut self, date: Date) {
        self.current_date = date;
    }

    /// Days before a longstop at which a milestone reports at-risk.
    pub fn set_warning_window_days(&mut self, days: i64) {
        self.warning_window_days = days;
    }

    fn suspended(&self) -> BTreeSet<String> {
        phase::suspended_covenants(&self.program, &self.store, &self.baskets, self.current_date)
    }

    fn covenant_ctx<'a>(
        &'a self,
        suspended: &'a BTreeSet<String>,
        period: Option<usize>,
    ) -> covenant::CovenantCtx<'a> {
        covenant::CovenantCtx {
            program: &self.program,
            store: &self.store,
            baskets: &self.baskets,
            suspended,
            current_date: self.current_date,
            period,
        }
    }

    // ── Financial data ───────────────────────────────────────────────

    /// Replace the loaded financial data wholesale.
    pub fn load_financials(&mut self, data: FinancialData) -> Result<(), MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        self.store.load(data, self.current_date);
        Ok(())
    }

    pub fn has_multi_period_data(&self) -> bool {
        self.store.has_multi_period_data()
    }

    // ── Covenants ────────────────────────────────────────────────────

    pub fn check_covenant(&self, name: &str) -> Result<CovenantResult, EvalError> {
        let suspended = self.suspended();
        covenant::check(&self.covenant_ctx(&suspended, None), name)
    }

    /// Check every covenant, isolating per-covenant failures.
    pub fn check_all_covenants(&self) -> Vec<CovenantResult> {
        let suspended = self.suspended();
        covenant::check_all(&self.covenant_ctx(&suspended, None))
    }

    pub fn check_covenant_with_cure(&self, name: &str) -> Result<CovenantWithCure, EvalError> {
        let suspended = self.suspended();
        covenant::check_with_cure(&self.covenant_ctx(&suspended, None), &self.cures, name)
    }

    /// Record cure consumption against the covenant's mechanism. Does
    /// not re-check the covenant; callers re-check afterward.
    pub fn apply_cure(&mut self, covenant_name: &str, amount: f64) -> CureOutcome {
        let _guard = match MutationGuard::enter(&self.mutating) {
            Ok(g) => g,
            Err(err) => {
                return CureOutcome {
                    success: false,
                    reason: Some(err.to_string()),
                };
            }
        };
        covenant::apply_cure(&self.program, &mut self.cures, covenant_name, amount)
    }

    /// Re-run every covenant check once per loaded period, oldest first.
    pub fn get_compliance_history(&self) -> Vec<ComplianceHistoryEntry> {
        let suspended = self.suspended();
        (0..self.store.len())
            .filter_map(|idx| {
                let period = self.store.period(idx)?;
                let ctx = self.covenant_ctx(&suspended, Some(idx));
                Some(ComplianceHistoryEntry {
                    period: period.period.clone(),
                    period_end: types::iso(period.period_end),
                    covenants: covenant::check_all(&ctx),
                })
            })
            .collect()
    }

    // ── Baskets ──────────────────────────────────────────────────────

    /// Record basket usage. Never clamps: overdraft is representable and
    /// is the caller's breach signal.
    pub fn use_basket(
        &mut self,
        name: &str,
        amount: f64,
        memo: Option<String>,
    ) -> Result<BasketStatus, MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        if self.program.basket(name).is_none() {
            return Err(MutationError::UnknownElement {
                kind: "basket".to_string(),
                name: name.to_string(),
            });
        }
        self.baskets
            .record_use(name, amount, memo, Some(types::iso(self.current_date)));
        drop(_guard);
        self.get_basket_status(name)
            .ok_or_else(|| MutationError::UnknownElement {
                kind: "basket".to_string(),
                name: name.to_string(),
            })
    }

    pub fn get_basket_used(&self, name: &str) -> f64 {
        self.baskets.used(name)
    }

    pub fn get_basket_status(&self, name: &str) -> Option<BasketStatus> {
        let basket = self.program.basket(name)?;
        let mut eval =
            Evaluator::new(&self.program, &self.store, &self.baskets, self.current_date);
        let used = self.baskets.used(name);
        let (capacity, error) = match eval.eval_number(&basket.capacity) {
            Ok(c) => (Some(c), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let available = capacity.map(|c| c - used);
        Some(BasketStatus {
            name: basket.name.clone(),
            kind: format!("{:?}", basket.kind).to_lowercase(),
            capacity,
            used,
            available,
            overdrawn: available.map(|a| a < 0.0).unwrap_or(false),
            history: self.baskets.history(name).to_vec(),
            warnings: eval.warnings,
            error,
        })
    }

    pub fn get_all_basket_statuses(&self) -> Vec<BasketStatus> {
        self.program
            .baskets()
            .filter_map(|b| self.get_basket_status(&b.name))
            .collect()
    }

    // ── Reserves ─────────────────────────────────────────────────────

    pub fn fund_reserve(&mut self, name: &str, amount: f64) -> Result<ReserveStatus, MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        if self.program.reserve(name).is_none() {
            return Err(MutationError::UnknownElement {
                kind: "reserve".to_string(),
                name: name.to_string(),
            });
        }
        self.reserves.fund(name, amount);
        drop(_guard);
        Ok(self.reserve_status(name))
    }

    pub fn draw_reserve(&mut self, name: &str, amount: f64) -> Result<ReserveStatus, MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        if self.program.reserve(name).is_none() {
            return Err(MutationError::UnknownElement {
                kind: "reserve".to_string(),
                name: name.to_string(),
            });
        }
        self.reserves.draw(name, amount)?;
        drop(_guard);
        Ok(self.reserve_status(name))
    }

    fn reserve_status(&self, name: &str) -> ReserveStatus {
        let target = self.program.reserve(name).and_then(|r| {
            let mut eval =
                Evaluator::new(&self.program, &self.store, &self.baskets, self.current_date);
            r.target.as_ref().and_then(|t| eval.eval_number(t).ok())
        });
        ReserveStatus {
            name: name.to_string(),
            balance: self.reserves.balance(name),
            target,
        }
    }

    pub fn get_all_reserve_statuses(&self) -> Vec<ReserveStatus> {
        self.program
            .reserves()
            .map(|r| self.reserve_status(&r.name))
            .collect()
    }

    // ── Waterfalls ───────────────────────────────────────────────────

    pub fn execute_waterfall(
        &mut self,
        name: &str,
        revenue: f64,
    ) -> Result<WaterfallResult, MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        waterfall::execute(
            &self.program,
            &self.store,
            &self.baskets,
            &mut self.reserves,
            self.current_date,
            name,
            revenue,
        )
    }

    // ── Phases, milestones, conditions precedent ─────────────────────

    pub fn get_current_phase(&self) -> Option<PhaseStatus> {
        phase::current_phase(&self.program, &self.store, &self.baskets, self.current_date)
    }

    pub fn get_all_milestone_statuses(&self) -> Vec<MilestoneStatus> {
        phase::all_milestone_statuses(&self.program, self.current_date, self.warning_window_days)
    }

    pub fn get_cp_checklist(&self, name: &str) -> Option<CpChecklist> {
        phase::cp_checklist(&self.program, &self.cp, name)
    }

    pub fn satisfy_condition(&mut self, block: &str, item: &str) -> Result<(), MutationError> {
        self.set_condition_state(block, item, CpItemState::Satisfied)
    }

    pub fn waive_condition(&mut self, block: &str, item: &str) -> Result<(), MutationError> {
        self.set_condition_state(block, item, CpItemState::Waived)
    }

    pub fn set_condition_state(
        &mut self,
        block: &str,
        item: &str,
        state: CpItemState,
    ) -> Result<(), MutationError> {
        let _guard = MutationGuard::enter(&self.mutating)?;
        let known = self
            .program
            .conditions_precedent(block)
            .map(|cp| cp.items.iter().any(|i| i.name == item))
            .unwrap_or(false);
        if !known {
            return Err(MutationError::UnknownElement {
                kind: "condition precedent".to_string(),
                name: format!("{}/{}", block, item),
            });
        }
        self.cp.set(block, item, state);
        Ok(())
    }

    // ── Calculation trees ────────────────────────────────────────────

    /// Drill-down tree for a DEFINE, evaluated against current data.
    pub fn get_calculation_tree(&self, define_name: &str) -> Result<CalcNode, EvalError> {
        let define = self
            .program
            .define(define_name)
            .ok_or_else(|| EvalError::UnknownElement {
                kind: "definition".to_string(),
                name: define_name.to_string(),
            })?;
        let mut eval =
            Evaluator::new(&self.program, &self.store, &self.baskets, self.current_date);
        Ok(eval.calc_tree(define_name, &define.formula))
    }

    // ── Tax equity ───────────────────────────────────────────────────

    pub fn get_tax_equity_structure_status(&self, name: &str) -> Option<TaxEquityStructureStatus> {
        taxequity::structure_status(&self.program, &self.flips, name)
    }

    pub fn get_tax_credit_status(&self, name: &str) -> Option<TaxCreditStatus> {
        taxequity::tax_credit_status(
            &self.program,
            &self.store,
            &self.baskets,
            self.current_date,
            name,
        )
    }

    pub fn get_depreciation_for_year(
        &self,
        schedule: &str,
        year: u32,
    ) -> Option<Result<DepreciationYear, EvalError>> {
        taxequity::depreciation_for_year(
            &self.program,
            &self.store,
            &self.baskets,
            self.current_date,
            schedule,
            year,
        )
    }

    pub fn get_flip_event_status(&self, name: &str) -> Option<FlipEventStatus> {
        taxequity::flip_event_status(&self.program, &self.flips, name)
    }

    /// Trigger a flip event. Only the structure the event names is
    /// affected.
    pub fn trigger_flip(&mut self, event: &str, date: Date, value: f64) -> FlipOutcome {
        let _guard = match MutationGuard::enter(&self.mutating) {
            Ok(g) => g,
            Err(err) => {
                return FlipOutcome {
                    success: false,
                    triggered: false,
                    reason: Some(err.to_string()),
                };
            }
        };
        taxequity::trigger_flip(&self.program, &mut self.flips, event, date, value)
    }

    // ── Production and regulatory ────────────────────────────────────

    pub fn get_performance_guarantee_status(&self, name: &str) -> Option<PerformanceGuaranteeStatus> {
        production::performance_guarantee_status(
            &self.program,
            &self.store,
            &self.baskets,
            self.current_date,
            name,
        )
    }

    pub fn get_technical_milestone_status(&self, name: &str) -> Option<TechnicalMilestoneStatus> {
        production::technical_milestone_status(&self.program, self.current_date, name)
    }

    pub fn get_regulatory_requirement_status(
        &self,
        name: &str,
    ) -> Option<RegulatoryRequirementStatus> {
        production::regulatory_requirement_status(&self.program, self.current_date, name)
    }

    pub fn get_degradation_factor(&self, name: &str, years_in_service: u32) -> Option<f64> {
        production::degradation_factor(&self.program, name, years_in_service)
    }

    pub fn get_seasonal_factor(&self, name: &str, period_label: &str) -> Option<f64> {
        production::seasonal_factor(&self.program, name, period_label)
    }

    // ── Prohibitions, conditions, events ─────────────────────────────

    pub fn get_prohibit_status(&self, name: &str) -> Option<ProhibitStatus> {
        let prohibit = self.program.prohibit(name)?;
        let carve_out_available = prohibit.unless_basket.as_ref().and_then(|basket| {
            self.get_basket_status(basket).and_then(|s| s.available)
        });
        Some(ProhibitStatus {
            name: prohibit.name.clone(),
            action: prohibit.action.clone(),
            unless_basket: prohibit.unless_basket.clone(),
            carve_out_available,
        })
    }

    pub fn get_condition_status(&self, name: &str) -> Option<ConditionStatus> {
        let condition = self.program.condition(name)?;
        let mut eval =
            Evaluator::new(&self.program, &self.store, &self.baskets, self.current_date);
        let (satisfied, error) = match eval.eval_bool(&condition.predicate) {
            Ok(b) => (Some(b), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Some(ConditionStatus {
            name: condition.name.clone(),
            satisfied,
            error,
        })
    }

    pub fn get_event_status(&self, name: &str) -> Option<EventStatus> {
        let event = self.program.event(name)?;
        let mut eval =
            Evaluator::new(&self.program, &self.store, &self.baskets, self.current_date);
        let (triggered, error) = match eval.eval_bool(&event.trigger) {
            Ok(b) => (Some(b), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Some(EventStatus {
            name: event.name.clone(),
            triggered,
            consequence: event.consequence.clone(),
            error,
        })
    }

    // ── Amendments ───────────────────────────────────────────────────

    /// Apply an amendment. An `Amendment` statement applies its
    /// operation list; any other statement is a single whole-statement
    /// replace-or-add with no ledger reset.
    pub fn apply_amendment(&mut self, statement: Statement) -> AmendmentOutcome {
        let ops = match statement {
            Statement::Amendment(a) => a.ops,
            other => vec![AmendmentOp::Replace {
                statement: Box::new(other),
                reset_ledger: false,
            }],
        };
        self.apply_amendment_ops(&ops)
    }

    pub fn apply_amendment_ops(&mut self, ops: &[AmendmentOp]) -> AmendmentOutcome {
        let _guard = match MutationGuard::enter(&self.mutating) {
            Ok(g) => g,
            Err(err) => {
                return AmendmentOutcome {
                    success: false,
                    applied: 0,
                    reason: Some(err.to_string()),
                };
            }
        };
        amendment::apply_ops(
            &mut self.program,
            &mut self.baskets,
            &mut self.reserves,
            ops,
        )
    }
}

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────
