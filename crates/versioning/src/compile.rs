//! Compiler (state normalizer): parsed AST → canonical `CompiledState`.
//!
//! Each statement is normalized into a canonical field map, discarding
//! source formatting and declaration order. Expression trees
//! canonicalize the operand order of commutative operators, so
//! re-ordering an associative expression is not a spurious diff.
//!
//! The compiled state is built once per AST, never mutated, and used
//! only for diffing -- never for execution.

use std::collections::BTreeMap;

use proviso_core::{
    AmendmentOp, BinOp, CureRight, DepreciationMethod, ElementKey, Expr, FlipTrigger, Func,
    Program, Statement, ThresholdStep, Tier, TierAmount, TrailingAgg,
};
use serde_json::{Value, json};
use time::Date;

/// One statement, normalized for diffing: a flat field map plus the
/// source-form rendering shown in changelogs.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalElement {
    pub fields: BTreeMap<String, Value>,
    pub source_form: String,
}

/// Canonical, diff-ready representation of one agreement version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledState {
    pub elements: BTreeMap<ElementKey, CanonicalElement>,
}

/// Normalize every statement of a program.
pub fn compile_to_state(program: &Program) -> CompiledState {
    let mut elements = BTreeMap::new();
    for stmt in program.statements() {
        elements.insert(
            (stmt.kind(), stmt.name().to_string()),
            canonicalize_statement(stmt),
        );
    }
    CompiledState { elements }
}

fn iso(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

// ──────────────────────────────────────────────
// Expression canonicalization
// ──────────────────────────────────────────────

/// Canonical JSON for an expression tree. Chains of one commutative
/// operator are flattened into a sorted operand list, so `a + b + c`
/// and `c + (a + b)` normalize identically.
pub fn canon_expr(expr: &Expr) -> Value {
    match expr {
        Expr::Number(n) => json!(n),
        Expr::Text(s) => json!({ "text": s }),
        Expr::Ident(name) => json!({ "ref": name }),
        Expr::Binary { op, .. } if op.is_commutative() => {
            let mut operands = Vec::new();
            flatten_chain(*op, expr, &mut operands);
            let mut values: Vec<Value> = operands.into_iter().map(canon_expr).collect();
            values.sort_by_key(|v| v.to_string());
            json!({ "op": op.symbol(), "operands": values })
        }
        Expr::Binary { op, lhs, rhs } => json!({
            "op": op.symbol(),
            "lhs": canon_expr(lhs),
            "rhs": canon_expr(rhs),
        }),
        Expr::Call { func, args } => {
            let mut values: Vec<Value> = args.iter().map(canon_expr).collect();
            if matches!(
                func,
                Func::GreaterOf | Func::LesserOf | Func::AllOf | Func::AnyOf
            ) {
                values.sort_by_key(|v| v.to_string());
            }
            json!({ "fn": func.keyword(), "args": values })
        }
        Expr::Trailing { periods, agg, expr } => json!({
            "trailing": periods,
            "agg": match agg { TrailingAgg::Sum => "sum", TrailingAgg::Average => "average" },
            "of": canon_expr(expr),
        }),
    }
}

fn flatten_chain<'a>(op: BinOp, expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Binary {
            op: inner,
            lhs,
            rhs,
        } if *inner == op => {
            flatten_chain(op, lhs, out);
            flatten_chain(op, rhs, out);
        }
        other => out.push(other),
    }
}

fn canon_threshold_steps(steps: &[ThresholdStep]) -> Value {
    Value::Array(
        steps
            .iter()
            .map(|s| {
                json!({
                    "value": canon_expr(&s.value),
                    "until": s.until.map(iso),
                })
            })
            .collect(),
    )
}

fn canon_cure(cure: &CureRight) -> Value {
    json!({
        "mechanism": cure.mechanism,
        "type": cure.cure_type.keyword(),
        "max_uses": cure.max_uses,
        "max_amount": cure.max_amount,
    })
}

fn canon_tier(tier: &Tier) -> Value {
    json!({
        "priority": tier.priority,
        "name": tier.name,
        "amount": match &tier.amount {
            TierAmount::Amount(expr) => canon_expr(expr),
            TierAmount::Remainder => json!("remainder"),
        },
        "condition": tier.condition.as_ref().map(canon_expr),
        "fund_reserve": tier.fund_reserve,
        "shortfall_reserve": tier.shortfall_reserve,
    })
}

// ──────────────────────────────────────────────
// Statement canonicalization
// ──────────────────────────────────────────────

fn canonicalize_statement(stmt: &Statement) -> CanonicalElement {
    let mut fields = BTreeMap::new();
    let mut put = |name: &str, value: Value| {
        fields.insert(name.to_string(), value);
    };

    match stmt {
        Statement::Define(d) => {
            put("formula", canon_expr(&d.formula));
        }
        Statement::Covenant(c) => {
            put("metric", canon_expr(&c.metric));
            put("operator", json!(c.operator.symbol()));
            put("thresholds", canon_threshold_steps(&c.thresholds));
            put("cure", c.cure.as_ref().map(canon_cure).unwrap_or(Value::Null));
        }
        Statement::Basket(b) => {
            put("kind", json!(format!("{:?}", b.kind).to_lowercase()));
            put("capacity", canon_expr(&b.capacity));
        }
        Statement::Reserve(r) => {
            put(
                "target",
                r.target.as_ref().map(canon_expr).unwrap_or(Value::Null),
            );
        }
        Statement::Waterfall(w) => {
            let mut tiers: Vec<&Tier> = w.tiers.iter().collect();
            tiers.sort_by_key(|t| t.priority);
            put(
                "tiers",
                Value::Array(tiers.into_iter().map(canon_tier).collect()),
            );
        }
        Statement::Phase(p) => {
            let mut suspended = p.suspended_covenants.clone();
            suspended.sort();
            put("suspended_covenants", json!(suspended));
        }
        Statement::Transition(t) => {
            put("to_phase", json!(t.to_phase));
            put("predicate", canon_expr(&t.predicate));
        }
        Statement::Milestone(m) => {
            put("target_date", json!(iso(m.target_date)));
            put("longstop_date", json!(iso(m.longstop_date)));
            put("achieved", json!(m.achieved));
            put("achieved_date", json!(m.achieved_date.map(iso)));
        }
        Statement::ConditionsPrecedent(cp) => {
            put(
                "items",
                Value::Array(
                    cp.items
                        .iter()
                        .map(|i| json!({ "name": i.name, "description": i.description }))
                        .collect(),
                ),
            );
        }
        Statement::TaxEquityStructure(s) => {
            put("kind", json!(s.kind.keyword()));
            put("investor_pre_flip", json!(s.investor_pre_flip));
            put("investor_post_flip", json!(s.investor_post_flip));
            put("target_return", json!(s.target_return));
        }
        Statement::TaxCredit(c) => {
            put(
                "kind",
                json!(match c.kind {
                    proviso_core::CreditKind::Itc => "ITC",
                    proviso_core::CreditKind::Ptc => "PTC",
                }),
            );
            put("amount", canon_expr(&c.amount));
        }
        Statement::DepreciationSchedule(d) => {
            put(
                "method",
                match &d.method {
                    DepreciationMethod::Macrs5 => json!("MACRS_5"),
                    DepreciationMethod::Macrs7 => json!("MACRS_7"),
                    DepreciationMethod::StraightLine { years } => {
                        json!({ "straight_line": years })
                    }
                },
            );
            put("basis", canon_expr(&d.basis));
        }
        Statement::FlipEvent(e) => {
            put("structure", json!(e.structure));
            put(
                "trigger",
                match &e.trigger {
                    FlipTrigger::TargetReturn(r) => json!({ "target_return": r }),
                    FlipTrigger::Date(d) => json!({ "date": iso(*d) }),
                },
            );
        }
        Statement::PerformanceGuarantee(g) => {
            put("metric", canon_expr(&g.metric));
            put("guaranteed", canon_expr(&g.guaranteed));
            put("operator", json!(g.operator.symbol()));
        }
        Statement::TechnicalMilestone(m) => {
            put("target_date", json!(iso(m.target_date)));
            put("achieved", json!(m.achieved));
            put("certified_by", json!(m.certified_by));
        }
        Statement::RegulatoryRequirement(r) => {
            put("authority", json!(r.authority));
            put("obtained", json!(r.obtained));
            put("expiry", json!(r.expiry.map(iso)));
        }
        Statement::DegradationSchedule(d) => {
            put("annual_rate", json!(d.annual_rate));
        }
        Statement::SeasonalAdjustment(s) => {
            let mut factors = s.factors.clone();
            factors.sort_by(|a, b| a.0.cmp(&b.0));
            put(
                "factors",
                Value::Array(
                    factors
                        .into_iter()
                        .map(|(label, f)| json!({ "period": label, "factor": f }))
                        .collect(),
                ),
            );
        }
        Statement::Prohibit(p) => {
            put("action", json!(p.action));
            put("unless_basket", json!(p.unless_basket));
        }
        Statement::Event(e) => {
            put("trigger", canon_expr(&e.trigger));
            put("consequence", json!(e.consequence));
        }
        Statement::Condition(c) => {
            put("predicate", canon_expr(&c.predicate));
        }
        Statement::Amendment(a) => {
            put(
                "operations",
                Value::Array(a.ops.iter().map(canon_amendment_op).collect()),
            );
        }
    }

    CanonicalElement {
        fields,
        source_form: render_source_form(stmt),
    }
}

fn canon_amendment_op(op: &AmendmentOp) -> Value {
    match op {
        AmendmentOp::Replace {
            statement,
            reset_ledger,
        } => json!({
            "replace": format!("{} {}", statement.kind(), statement.name()),
            "reset_ledger": reset_ledger,
        }),
        AmendmentOp::Add { statement } => {
            json!({ "add": format!("{} {}", statement.kind(), statement.name()) })
        }
        AmendmentOp::Remove { kind, name } => {
            json!({ "remove": format!("{} {}", kind, name) })
        }
    }
}

// ──────────────────────────────────────────────
// Source-form rendering
// ──────────────────────────────────────────────

/// Compact source-level rendering, shown verbatim in changelogs.
fn render_source_form(stmt: &Statement) -> String {
    match stmt {
        Statement::Define(d) => format!("DEFINE {} AS {}", d.name, d.formula),
        Statement::Covenant(c) => {
            let mut form = format!(
                "COVENANT {} REQUIRES {} {}",
                c.name,
                c.metric,
                render_thresholds(c)
            );
            if let Some(cure) = &c.cure {
                form.push_str(&format!(" WITH {} {}", cure.cure_type.keyword(), cure.mechanism));
            }
            form
        }
        Statement::Basket(b) => format!("BASKET {} CAPACITY {}", b.name, b.capacity),
        Statement::Reserve(r) => match &r.target {
            Some(target) => format!("RESERVE {} TARGET {}", r.name, target),
            None => format!("RESERVE {}", r.name),
        },
        Statement::Waterfall(w) => format!("WATERFALL {} ({} tiers)", w.name, w.tiers.len()),
        Statement::Phase(p) => format!(
            "PHASE {} SUSPENDS [{}]",
            p.name,
            p.suspended_covenants.join(", ")
        ),
        Statement::Transition(t) => {
            format!("TRANSITION {} TO {} WHEN {}", t.name, t.to_phase, t.predicate)
        }
        Statement::Milestone(m) => format!(
            "MILESTONE {} TARGET {} LONGSTOP {}",
            m.name,
            iso(m.target_date),
            iso(m.longstop_date)
        ),
        Statement::ConditionsPrecedent(cp) => {
            format!("CONDITIONS_PRECEDENT {} ({} items)", cp.name, cp.items.len())
        }
        Statement::TaxEquityStructure(s) => format!(
            "TAX_EQUITY_STRUCTURE {} {} {}/{} PRE/POST",
            s.name,
            s.kind.keyword(),
            s.investor_pre_flip,
            s.investor_post_flip
        ),
        Statement::TaxCredit(c) => format!("TAX_CREDIT {} AMOUNT {}", c.name, c.amount),
        Statement::DepreciationSchedule(d) => {
            format!("DEPRECIATION_SCHEDULE {} BASIS {}", d.name, d.basis)
        }
        Statement::FlipEvent(e) => {
            let trigger = match &e.trigger {
                FlipTrigger::TargetReturn(r) => format!("TARGET_RETURN {}", r),
                FlipTrigger::Date(d) => format!("DATE {}", iso(*d)),
            };
            format!("FLIP_EVENT {} ON {} WHEN {}", e.name, e.structure, trigger)
        }
        Statement::PerformanceGuarantee(g) => format!(
            "PERFORMANCE_GUARANTEE {} REQUIRES {} {} {}",
            g.name,
            g.metric,
            g.operator.symbol(),
            g.guaranteed
        ),
        Statement::TechnicalMilestone(m) => {
            format!("TECHNICAL_MILESTONE {} TARGET {}", m.name, iso(m.target_date))
        }
        Statement::RegulatoryRequirement(r) => {
            format!("REGULATORY_REQUIREMENT {} FROM {}", r.name, r.authority)
        }
        Statement::DegradationSchedule(d) => {
            format!("DEGRADATION_SCHEDULE {} RATE {}", d.name, d.annual_rate)
        }
        Statement::SeasonalAdjustment(s) => {
            format!("SEASONAL_ADJUSTMENT {} ({} factors)", s.name, s.factors.len())
        }
        Statement::Prohibit(p) => match &p.unless_basket {
            Some(basket) => format!("PROHIBIT {} UNLESS AVAILABLE({})", p.action, basket),
            None => format!("PROHIBIT {}", p.action),
        },
        Statement::Event(e) => format!("EVENT {} WHEN {}", e.name, e.trigger),
        Statement::Condition(c) => format!("CONDITION {} WHEN {}", c.name, c.predicate),
        Statement::Amendment(a) => format!("AMENDMENT {} ({} operations)", a.name, a.ops.len()),
    }
}

fn render_thresholds(c: &proviso_core::Covenant) -> String {
    c.thresholds
        .iter()
        .map(|s| match s.until {
            Some(until) => format!("{} {} UNTIL {}", c.operator.symbol(), s.value, iso(until)),
            None => format!("{} {}", c.operator.symbol(), s.value),
        })
        .collect::<Vec<_>>()
        .join(", THEN ")
}
