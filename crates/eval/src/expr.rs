//! Expression evaluator.
//!
//! One `Evaluator` is constructed per evaluation pass. It resolves
//! identifiers through DEFINE statements (memoized per pass, per period)
//! and current-period metrics, with an explicit resolving stack so a
//! cyclic definition surfaces as a typed `CircularDefinition` error
//! instead of exhausting the call stack.
//!
//! Division by zero is always a `DivisionByZero` error, never a silent
//! Infinity or NaN. `TRAILING n PERIOD_OF` clips to the periods actually
//! loaded and attaches an `InsufficientPeriods` warning when short, so
//! callers can distinguish "compliant" from "insufficient data".

use std::collections::BTreeMap;

use proviso_core::{BinOp, Covenant, Expr, Func, Program, ThresholdStep, TrailingAgg};
use time::Date;

use crate::ledger::BasketLedger;
use crate::periods::FinancialStore;
use crate::types::{CalcNode, EvalError, EvalWarning, Value};

/// Sentinel period key for memoization when no data is loaded.
const NO_PERIOD: usize = usize::MAX;

pub struct Evaluator<'a> {
    program: &'a Program,
    store: &'a FinancialStore,
    baskets: &'a BasketLedger,
    current_date: Date,
    /// Period the evaluation resolves metrics against; `None` means the
    /// latest loaded period.
    period: Option<usize>,
    /// DEFINE names currently being resolved, in resolution order.
    resolving: Vec<String>,
    /// Per-pass memo of DEFINE results, keyed by (name, period).
    memo: BTreeMap<(String, usize), Value>,
    /// Non-fatal conditions accumulated during this pass.
    pub warnings: Vec<EvalWarning>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        program: &'a Program,
        store: &'a FinancialStore,
        baskets: &'a BasketLedger,
        current_date: Date,
    ) -> Evaluator<'a> {
        Evaluator {
            program,
            store,
            baskets,
            current_date,
            period: None,
            resolving: Vec::new(),
            memo: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Pin the evaluation to a specific period (used by compliance
    /// history, which re-runs checks once per period).
    pub fn at_period(mut self, period: usize) -> Evaluator<'a> {
        self.period = Some(period);
        self
    }

    fn active_period(&self) -> usize {
        self.period
            .or_else(|| self.store.latest_index())
            .unwrap_or(NO_PERIOD)
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Ident(name) => self.resolve_ident(name),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Call { func, args } => self.eval_call(*func, args),
            Expr::Trailing { periods, agg, expr } => self.eval_trailing(*periods, *agg, expr),
        }
    }

    /// Evaluate and require a numeric result.
    pub fn eval_number(&mut self, expr: &Expr) -> Result<f64, EvalError> {
        self.eval(expr)?.as_number()
    }

    /// Evaluate and require a boolean result.
    pub fn eval_bool(&mut self, expr: &Expr) -> Result<bool, EvalError> {
        self.eval(expr)?.as_bool()
    }

    // ── Identifier resolution ────────────────────────────────────────

    fn resolve_ident(&mut self, name: &str) -> Result<Value, EvalError> {
        // DEFINE statements shadow raw metrics; a self-referential DEFINE
        // is therefore a detectable cycle, not a data lookup.
        if let Some(define) = self.program.define(name) {
            let key = (name.to_string(), self.active_period());
            if let Some(value) = self.memo.get(&key) {
                return Ok(value.clone());
            }
            if self.resolving.iter().any(|r| r == name) {
                let mut cycle: Vec<String> = self
                    .resolving
                    .iter()
                    .skip_while(|r| r.as_str() != name)
                    .cloned()
                    .collect();
                cycle.push(name.to_string());
                return Err(EvalError::CircularDefinition { cycle });
            }
            self.resolving.push(name.to_string());
            let result = self.eval(&define.formula);
            self.resolving.pop();
            let value = result?;
            self.memo.insert(key, value.clone());
            return Ok(value);
        }

        let idx = self.active_period();
        if idx != NO_PERIOD {
            if let Some(metric) = self.store.metric(idx, name) {
                return Ok(Value::Number(metric));
            }
        }

        Err(EvalError::UndefinedIdentifier {
            name: name.to_string(),
        })
    }

    // ── Binary operators ─────────────────────────────────────────────

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        match op {
            BinOp::And => {
                // Short-circuit: right side is not evaluated when left is false.
                if !self.eval_bool(lhs)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(rhs)?))
            }
            BinOp::Or => {
                if self.eval_bool(lhs)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(rhs)?))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let l = self.eval_number(lhs)?;
                let r = self.eval_number(rhs)?;
                let result = match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => {
                        if r == 0.0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        l / r
                    }
                    _ => unreachable!(),
                };
                Ok(Value::Number(result))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                self.compare(op, &l, &r)
            }
        }
    }

    /// Exact comparison. Numbers compare numerically; Text and Bool
    /// support equality only.
    fn compare(&self, op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
        let result = match (l, r) {
            (Value::Number(a), Value::Number(b)) => match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                BinOp::Ge => a >= b,
                BinOp::Eq => a == b,
                BinOp::Ne => a != b,
                _ => unreachable!(),
            },
            (Value::Text(a), Value::Text(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
                (a == b) == (op == BinOp::Eq)
            }
            (Value::Bool(a), Value::Bool(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
                (a == b) == (op == BinOp::Eq)
            }
            _ => {
                return Err(EvalError::TypeError {
                    message: format!(
                        "operator '{}' not defined for {} and {}",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    ),
                });
            }
        };
        Ok(Value::Bool(result))
    }

    // ── Built-in calls ───────────────────────────────────────────────

    fn eval_call(&mut self, func: Func, args: &[Expr]) -> Result<Value, EvalError> {
        match func {
            Func::Available => {
                let name = self.arg_name(func, args)?;
                let basket = self
                    .program
                    .basket(&name)
                    .ok_or_else(|| EvalError::UnknownElement {
                        kind: "basket".to_string(),
                        name: name.clone(),
                    })?;
                // Capacity is re-evaluated every query, never cached.
                let capacity = self.eval_number(&basket.capacity)?;
                Ok(Value::Number(capacity - self.baskets.used(&name)))
            }
            Func::Compliant => {
                let name = self.arg_name(func, args)?;
                let covenant =
                    self.program
                        .covenant(&name)
                        .ok_or_else(|| EvalError::UnknownElement {
                            kind: "covenant".to_string(),
                            name: name.clone(),
                        })?;
                // Compliance on the merits. Phase suspension is applied by
                // the covenant engine, not here, so that transition
                // predicates referencing COMPLIANT cannot recurse into
                // phase resolution.
                let (actual, threshold) = self.covenant_on_merits(covenant)?;
                Ok(Value::Bool(covenant.operator.apply(actual, threshold)))
            }
            Func::Exists => {
                let name = self.arg_name(func, args)?;
                let idx = self.active_period();
                let in_data = idx != NO_PERIOD && self.store.metric(idx, &name).is_some();
                Ok(Value::Bool(in_data || self.program.contains_name(&name)))
            }
            Func::GreaterOf | Func::LesserOf => {
                if args.is_empty() {
                    return Err(EvalError::TypeError {
                        message: format!("{} requires at least one argument", func.keyword()),
                    });
                }
                let mut result = self.eval_number(&args[0])?;
                for arg in &args[1..] {
                    let n = self.eval_number(arg)?;
                    result = if func == Func::GreaterOf {
                        result.max(n)
                    } else {
                        result.min(n)
                    };
                }
                Ok(Value::Number(result))
            }
            Func::AllOf | Func::AnyOf => {
                let mut all = true;
                let mut any = false;
                for arg in args {
                    let truth = self.milestone_truth(arg)?;
                    all &= truth;
                    any |= truth;
                }
                Ok(Value::Bool(if func == Func::AllOf { all } else { any }))
            }
        }
    }

    /// ALL_OF/ANY_OF arguments name milestones by identifier; anything
    /// else is evaluated as a boolean expression.
    fn milestone_truth(&mut self, arg: &Expr) -> Result<bool, EvalError> {
        if let Expr::Ident(name) = arg {
            if let Some(milestone) = self.program.milestone(name) {
                return Ok(milestone.achieved);
            }
        }
        self.eval_bool(arg)
    }

    /// Extract the single name argument of AVAILABLE/COMPLIANT/EXISTS.
    fn arg_name(&self, func: Func, args: &[Expr]) -> Result<String, EvalError> {
        match args {
            [Expr::Ident(name)] | [Expr::Text(name)] => Ok(name.clone()),
            _ => Err(EvalError::TypeError {
                message: format!("{} takes a single element name", func.keyword()),
            }),
        }
    }

    // ── Trailing windows ─────────────────────────────────────────────

    fn eval_trailing(
        &mut self,
        periods: u32,
        agg: TrailingAgg,
        expr: &Expr,
    ) -> Result<Value, EvalError> {
        let upto = self.active_period();
        let indices = if upto == NO_PERIOD {
            Vec::new()
        } else {
            self.store.trailing_indices(periods, upto)
        };

        if (indices.len() as u32) < periods {
            self.warnings.push(EvalWarning::InsufficientPeriods {
                requested: periods,
                available: indices.len() as u32,
            });
        }
        if indices.is_empty() {
            return Ok(Value::Number(0.0));
        }

        let saved = self.period;
        let mut sum = 0.0;
        for idx in &indices {
            self.period = Some(*idx);
            let result = self.eval_number(expr);
            self.period = saved;
            sum += result?;
        }

        let value = match agg {
            TrailingAgg::Sum => sum,
            TrailingAgg::Average => sum / indices.len() as f64,
        };
        Ok(Value::Number(value))
    }

    // ── Covenant support ─────────────────────────────────────────────

    /// Actual metric value and the active threshold for a covenant,
    /// ignoring phase suspension. Shared by the covenant engine and the
    /// COMPLIANT built-in.
    pub fn covenant_on_merits(&mut self, covenant: &Covenant) -> Result<(f64, f64), EvalError> {
        let actual = self.eval_number(&covenant.metric)?;
        let step = select_threshold_step(&covenant.thresholds, self.current_date).ok_or_else(
            || EvalError::TypeError {
                message: format!("covenant '{}' has no threshold steps", covenant.name),
            },
        )?;
        let threshold = self.eval_number(&step.value)?;
        Ok((actual, threshold))
    }

    // ── Calculation trees ────────────────────────────────────────────

    /// Build the drill-down tree for an expression: every node carries
    /// its rendered formula and evaluated value, with sub-expressions as
    /// children. Evaluation errors are recorded per node.
    pub fn calc_tree(&mut self, label: &str, expr: &Expr) -> CalcNode {
        let (value, error) = match self.eval(expr) {
            Ok(Value::Number(n)) => (Some(n), None),
            Ok(_) => (None, None),
            Err(e) => (None, Some(e.to_string())),
        };

        let children = match expr {
            Expr::Binary { lhs, rhs, .. } => {
                vec![self.calc_tree("", lhs), self.calc_tree("", rhs)]
            }
            Expr::Call { args, .. } => args.iter().map(|a| self.calc_tree("", a)).collect(),
            Expr::Trailing { expr, .. } => vec![self.calc_tree("", expr)],
            Expr::Ident(name) => match self.program.define(name) {
                Some(define) => vec![self.calc_tree(name, &define.formula)],
                None => Vec::new(),
            },
            _ => Vec::new(),
        };

        CalcNode {
            label: label.to_string(),
            formula: expr.to_string(),
            value,
            error,
            children,
        }
    }
}

/// Select the threshold step active on `date`: the first step still in
/// effect (no UNTIL, or UNTIL on/after the date). Past the whole
/// schedule, the final step governs.
pub fn select_threshold_step(steps: &[ThresholdStep], date: Date) -> Option<&ThresholdStep> {
    steps
        .iter()
        .find(|s| s.until.map_or(true, |until| date <= until))
        .or_else(|| steps.last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proviso_core::{
        Basket, BasketKind, CmpOp, Define, Milestone, Program, Statement,
    };
    use std::collections::BTreeMap;
    use time::macros::date;

    use crate::periods::FinancialData;

    fn store_with(metrics: &[(&str, f64)]) -> FinancialStore {
        let mut map = BTreeMap::new();
        for (k, v) in metrics {
            map.insert(k.to_string(), *v);
        }
        let mut store = FinancialStore::empty();
        store.load(FinancialData::Single(map), date!(2027 - 06 - 30));
        store
    }

    fn define(name: &str, formula: Expr) -> Statement {
        Statement::Define(Define {
            name: name.to_string(),
            formula,
        })
    }

    #[test]
    fn arithmetic_precedence_via_tree_shape() {
        let program = Program::new();
        let store = store_with(&[("a", 2.0), ("b", 3.0), ("c", 4.0)]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        // a + b * c parses as a + (b * c)
        let expr = Expr::binary(
            BinOp::Add,
            Expr::ident("a"),
            Expr::binary(BinOp::Mul, Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(eval.eval(&expr).unwrap(), Value::Number(14.0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let program = Program::new();
        let store = store_with(&[("x", 10.0), ("zero", 0.0)]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        let expr = Expr::binary(BinOp::Div, Expr::ident("x"), Expr::ident("zero"));
        assert_eq!(eval.eval(&expr).unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn self_referential_define_reports_cycle() {
        let mut program = Program::new();
        program.insert(define(
            "X",
            Expr::binary(BinOp::Add, Expr::ident("X"), Expr::number(1.0)),
        ));
        let store = store_with(&[]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        match eval.eval(&Expr::ident("X")).unwrap_err() {
            EvalError::CircularDefinition { cycle } => {
                assert_eq!(cycle, vec!["X".to_string(), "X".to_string()]);
            }
            other => panic!("expected CircularDefinition, got {:?}", other),
        }
    }

    #[test]
    fn mutual_cycle_reports_both_names() {
        let mut program = Program::new();
        program.insert(define("A", Expr::ident("B")));
        program.insert(define("B", Expr::ident("A")));
        let store = store_with(&[]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        match eval.eval(&Expr::ident("A")).unwrap_err() {
            EvalError::CircularDefinition { cycle } => {
                assert_eq!(cycle, vec!["A".to_string(), "B".to_string(), "A".to_string()]);
            }
            other => panic!("expected CircularDefinition, got {:?}", other),
        }
    }

    #[test]
    fn undefined_identifier() {
        let program = Program::new();
        let store = store_with(&[]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        assert_eq!(
            eval.eval(&Expr::ident("missing")).unwrap_err(),
            EvalError::UndefinedIdentifier {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn define_results_memoize_within_a_pass() {
        let mut program = Program::new();
        program.insert(define(
            "EBITDA",
            Expr::binary(BinOp::Add, Expr::ident("net_income"), Expr::ident("dna")),
        ));
        let store = store_with(&[("net_income", 10.0), ("dna", 5.0)]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        assert_eq!(eval.eval(&Expr::ident("EBITDA")).unwrap(), Value::Number(15.0));
        assert!(eval
            .memo
            .contains_key(&("EBITDA".to_string(), store.latest_index().unwrap())));
        assert_eq!(eval.eval(&Expr::ident("EBITDA")).unwrap(), Value::Number(15.0));
    }

    #[test]
    fn available_subtracts_ledger_usage() {
        let mut program = Program::new();
        program.insert(Statement::Basket(Basket {
            name: "Capex".to_string(),
            kind: BasketKind::Fixed,
            capacity: Expr::number(100.0),
        }));
        let store = store_with(&[]);
        let mut baskets = BasketLedger::new();
        baskets.record_use("Capex", 60.0, None, None);

        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));
        let expr = Expr::call(Func::Available, vec![Expr::ident("Capex")]);
        assert_eq!(eval.eval(&expr).unwrap(), Value::Number(40.0));
    }

    #[test]
    fn trailing_sum_and_shortfall_warning() {
        let program = Program::new();
        let mut store = FinancialStore::empty();
        let mk = |label: &str, end, v: f64| {
            let mut data = BTreeMap::new();
            data.insert("ebitda".to_string(), v);
            crate::periods::PeriodData {
                period: label.to_string(),
                period_type: crate::periods::PeriodType::Quarterly,
                period_end: end,
                data,
            }
        };
        store.load(
            FinancialData::MultiPeriod(vec![
                mk("Q1", date!(2027 - 03 - 31), 10.0),
                mk("Q2", date!(2027 - 06 - 30), 20.0),
            ]),
            date!(2027 - 06 - 30),
        );
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        let expr = Expr::Trailing {
            periods: 4,
            agg: TrailingAgg::Sum,
            expr: Box::new(Expr::ident("ebitda")),
        };
        assert_eq!(eval.eval(&expr).unwrap(), Value::Number(30.0));
        assert_eq!(
            eval.warnings,
            vec![EvalWarning::InsufficientPeriods {
                requested: 4,
                available: 2
            }]
        );
    }

    #[test]
    fn all_of_reads_milestone_achievement() {
        let mut program = Program::new();
        program.insert(Statement::Milestone(Milestone {
            name: "COD".to_string(),
            target_date: date!(2027 - 06 - 30),
            longstop_date: date!(2027 - 12 - 31),
            achieved: true,
            achieved_date: Some(date!(2027 - 05 - 01)),
        }));
        program.insert(Statement::Milestone(Milestone {
            name: "Interconnection".to_string(),
            target_date: date!(2027 - 03 - 31),
            longstop_date: date!(2027 - 09 - 30),
            achieved: false,
            achieved_date: None,
        }));
        let store = store_with(&[]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        let all = Expr::call(
            Func::AllOf,
            vec![Expr::ident("COD"), Expr::ident("Interconnection")],
        );
        let any = Expr::call(
            Func::AnyOf,
            vec![Expr::ident("COD"), Expr::ident("Interconnection")],
        );
        assert_eq!(eval.eval(&all).unwrap(), Value::Bool(false));
        assert_eq!(eval.eval(&any).unwrap(), Value::Bool(true));
    }

    #[test]
    fn threshold_step_selection_by_date() {
        let steps = vec![
            ThresholdStep {
                value: Expr::number(4.5),
                until: Some(date!(2027 - 12 - 31)),
            },
            ThresholdStep {
                value: Expr::number(4.0),
                until: None,
            },
        ];
        let active = select_threshold_step(&steps, date!(2027 - 06 - 30)).unwrap();
        assert_eq!(active.value, Expr::number(4.5));
        let active = select_threshold_step(&steps, date!(2028 - 01 - 01)).unwrap();
        assert_eq!(active.value, Expr::number(4.0));
    }

    #[test]
    fn exists_probes_program_and_metrics() {
        let mut program = Program::new();
        program.insert(define("EBITDA", Expr::number(1.0)));
        let store = store_with(&[("revenue", 5.0)]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        let exists = |n: &str| Expr::call(Func::Exists, vec![Expr::ident(n)]);
        assert_eq!(eval.eval(&exists("EBITDA")).unwrap(), Value::Bool(true));
        assert_eq!(eval.eval(&exists("revenue")).unwrap(), Value::Bool(true));
        assert_eq!(eval.eval(&exists("nothing")).unwrap(), Value::Bool(false));
    }

    #[test]
    fn compliant_ignores_unrelated_define_errors() {
        // A covenant whose metric is fine evaluates even when another
        // DEFINE in the program is cyclic.
        let mut program = Program::new();
        program.insert(define("Bad", Expr::ident("Bad")));
        program.insert(Statement::Covenant(proviso_core::Covenant {
            name: "MinDSCR".to_string(),
            metric: Expr::ident("dscr"),
            operator: CmpOp::Ge,
            thresholds: vec![ThresholdStep {
                value: Expr::number(1.2),
                until: None,
            }],
            cure: None,
        }));
        let store = store_with(&[("dscr", 1.35)]);
        let baskets = BasketLedger::new();
        let mut eval = Evaluator::new(&program, &store, &baskets, date!(2027 - 06 - 30));

        let expr = Expr::call(Func::Compliant, vec![Expr::ident("MinDSCR")]);
        assert_eq!(eval.eval(&expr).unwrap(), Value::Bool(true));
    }
}
