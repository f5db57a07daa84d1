//! The program arena: an ordered collection of statements indexed by
//! `(kind, name)`.
//!
//! The arena is the only mutation surface over a parsed agreement.
//! Amendments perform key-based replace/insert/delete of whole statements,
//! never in-place field mutation, so compiled-state snapshots taken before
//! an amendment remain valid for diffing.

use std::collections::BTreeMap;

use crate::ast::{
    Basket, Condition, ConditionsPrecedent, Covenant, Define, DegradationSchedule,
    DepreciationSchedule, Event, FlipEvent, Milestone, PerformanceGuarantee, Phase, Prohibit,
    RegulatoryRequirement, Reserve, SeasonalAdjustment, Statement, StatementKind,
    TaxEquityStructure, TaxCredit, TechnicalMilestone, Transition, Waterfall,
};

/// Join key for arena lookup, diffing, and cross-references.
pub type ElementKey = (StatementKind, String);

/// An ordered, keyed collection of top-level statements.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Declaration order, preserved for order-sensitive consumers
    /// (transition evaluation, waterfall listing).
    order: Vec<ElementKey>,
    items: BTreeMap<ElementKey, Statement>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Build a program from statements in declaration order.
    ///
    /// A later statement with a duplicate (kind, name) replaces the
    /// earlier one, matching last-writer-wins source semantics.
    pub fn from_statements(statements: Vec<Statement>) -> Program {
        let mut program = Program::new();
        for stmt in statements {
            program.insert(stmt);
        }
        program
    }

    /// Insert or replace a statement under its (kind, name) key.
    pub fn insert(&mut self, stmt: Statement) {
        let key = (stmt.kind(), stmt.name().to_string());
        if self.items.insert(key.clone(), stmt).is_none() {
            self.order.push(key);
        }
    }

    /// Remove a statement by key. Returns the removed statement, if any.
    pub fn remove(&mut self, kind: StatementKind, name: &str) -> Option<Statement> {
        let key = (kind, name.to_string());
        let removed = self.items.remove(&key);
        if removed.is_some() {
            self.order.retain(|k| k != &key);
        }
        removed
    }

    pub fn get(&self, kind: StatementKind, name: &str) -> Option<&Statement> {
        self.items.get(&(kind, name.to_string()))
    }

    pub fn contains(&self, kind: StatementKind, name: &str) -> bool {
        self.items.contains_key(&(kind, name.to_string()))
    }

    /// Whether any statement of any kind carries this name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.items.keys().any(|(_, n)| n == name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Statements in declaration order.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.order.iter().filter_map(|k| self.items.get(k))
    }

    /// Statements of one kind, in declaration order.
    pub fn of_kind(&self, kind: StatementKind) -> impl Iterator<Item = &Statement> {
        self.order
            .iter()
            .filter(move |(k, _)| *k == kind)
            .filter_map(|k| self.items.get(k))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ElementKey> {
        self.order.iter()
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn define(&self, name: &str) -> Option<&Define> {
        match self.get(StatementKind::Define, name) {
            Some(Statement::Define(d)) => Some(d),
            _ => None,
        }
    }

    pub fn covenant(&self, name: &str) -> Option<&Covenant> {
        match self.get(StatementKind::Covenant, name) {
            Some(Statement::Covenant(c)) => Some(c),
            _ => None,
        }
    }

    pub fn basket(&self, name: &str) -> Option<&Basket> {
        match self.get(StatementKind::Basket, name) {
            Some(Statement::Basket(b)) => Some(b),
            _ => None,
        }
    }

    pub fn reserve(&self, name: &str) -> Option<&Reserve> {
        match self.get(StatementKind::Reserve, name) {
            Some(Statement::Reserve(r)) => Some(r),
            _ => None,
        }
    }

    pub fn waterfall(&self, name: &str) -> Option<&Waterfall> {
        match self.get(StatementKind::Waterfall, name) {
            Some(Statement::Waterfall(w)) => Some(w),
            _ => None,
        }
    }

    pub fn milestone(&self, name: &str) -> Option<&Milestone> {
        match self.get(StatementKind::Milestone, name) {
            Some(Statement::Milestone(m)) => Some(m),
            _ => None,
        }
    }

    pub fn conditions_precedent(&self, name: &str) -> Option<&ConditionsPrecedent> {
        match self.get(StatementKind::ConditionsPrecedent, name) {
            Some(Statement::ConditionsPrecedent(cp)) => Some(cp),
            _ => None,
        }
    }

    pub fn tax_equity_structure(&self, name: &str) -> Option<&TaxEquityStructure> {
        match self.get(StatementKind::TaxEquityStructure, name) {
            Some(Statement::TaxEquityStructure(s)) => Some(s),
            _ => None,
        }
    }

    pub fn tax_credit(&self, name: &str) -> Option<&TaxCredit> {
        match self.get(StatementKind::TaxCredit, name) {
            Some(Statement::TaxCredit(c)) => Some(c),
            _ => None,
        }
    }

    pub fn depreciation_schedule(&self, name: &str) -> Option<&DepreciationSchedule> {
        match self.get(StatementKind::DepreciationSchedule, name) {
            Some(Statement::DepreciationSchedule(d)) => Some(d),
            _ => None,
        }
    }

    pub fn flip_event(&self, name: &str) -> Option<&FlipEvent> {
        match self.get(StatementKind::FlipEvent, name) {
            Some(Statement::FlipEvent(e)) => Some(e),
            _ => None,
        }
    }

    pub fn prohibit(&self, name: &str) -> Option<&Prohibit> {
        match self.get(StatementKind::Prohibit, name) {
            Some(Statement::Prohibit(p)) => Some(p),
            _ => None,
        }
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        match self.get(StatementKind::Condition, name) {
            Some(Statement::Condition(c)) => Some(c),
            _ => None,
        }
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        match self.get(StatementKind::Event, name) {
            Some(Statement::Event(e)) => Some(e),
            _ => None,
        }
    }

    pub fn performance_guarantee(&self, name: &str) -> Option<&PerformanceGuarantee> {
        match self.get(StatementKind::PerformanceGuarantee, name) {
            Some(Statement::PerformanceGuarantee(g)) => Some(g),
            _ => None,
        }
    }

    pub fn technical_milestone(&self, name: &str) -> Option<&TechnicalMilestone> {
        match self.get(StatementKind::TechnicalMilestone, name) {
            Some(Statement::TechnicalMilestone(m)) => Some(m),
            _ => None,
        }
    }

    pub fn regulatory_requirement(&self, name: &str) -> Option<&RegulatoryRequirement> {
        match self.get(StatementKind::RegulatoryRequirement, name) {
            Some(Statement::RegulatoryRequirement(r)) => Some(r),
            _ => None,
        }
    }

    pub fn degradation_schedule(&self, name: &str) -> Option<&DegradationSchedule> {
        match self.get(StatementKind::DegradationSchedule, name) {
            Some(Statement::DegradationSchedule(d)) => Some(d),
            _ => None,
        }
    }

    pub fn seasonal_adjustment(&self, name: &str) -> Option<&SeasonalAdjustment> {
        match self.get(StatementKind::SeasonalAdjustment, name) {
            Some(Statement::SeasonalAdjustment(s)) => Some(s),
            _ => None,
        }
    }

    pub fn covenants(&self) -> impl Iterator<Item = &Covenant> {
        self.of_kind(StatementKind::Covenant).filter_map(|s| match s {
            Statement::Covenant(c) => Some(c),
            _ => None,
        })
    }

    pub fn baskets(&self) -> impl Iterator<Item = &Basket> {
        self.of_kind(StatementKind::Basket).filter_map(|s| match s {
            Statement::Basket(b) => Some(b),
            _ => None,
        })
    }

    pub fn reserves(&self) -> impl Iterator<Item = &Reserve> {
        self.of_kind(StatementKind::Reserve).filter_map(|s| match s {
            Statement::Reserve(r) => Some(r),
            _ => None,
        })
    }

    pub fn phases(&self) -> impl Iterator<Item = &Phase> {
        self.of_kind(StatementKind::Phase).filter_map(|s| match s {
            Statement::Phase(p) => Some(p),
            _ => None,
        })
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.of_kind(StatementKind::Transition)
            .filter_map(|s| match s {
                Statement::Transition(t) => Some(t),
                _ => None,
            })
    }

    pub fn milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.of_kind(StatementKind::Milestone)
            .filter_map(|s| match s {
                Statement::Milestone(m) => Some(m),
                _ => None,
            })
    }

    pub fn flip_events(&self) -> impl Iterator<Item = &FlipEvent> {
        self.of_kind(StatementKind::FlipEvent)
            .filter_map(|s| match s {
                Statement::FlipEvent(e) => Some(e),
                _ => None,
            })
    }

    pub fn tax_equity_structures(&self) -> impl Iterator<Item = &TaxEquityStructure> {
        self.of_kind(StatementKind::TaxEquityStructure)
            .filter_map(|s| match s {
                Statement::TaxEquityStructure(t) => Some(t),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CmpOp, Expr, ThresholdStep};

    fn covenant(name: &str, threshold: f64) -> Statement {
        Statement::Covenant(Covenant {
            name: name.to_string(),
            metric: Expr::ident("Leverage"),
            operator: CmpOp::Le,
            thresholds: vec![ThresholdStep {
                value: Expr::number(threshold),
                until: None,
            }],
            cure: None,
        })
    }

    #[test]
    fn insert_preserves_declaration_order() {
        let mut program = Program::new();
        program.insert(covenant("Zeta", 1.0));
        program.insert(covenant("Alpha", 2.0));

        let names: Vec<&str> = program.statements().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut program = Program::new();
        program.insert(covenant("A", 1.0));
        program.insert(covenant("B", 2.0));
        program.insert(covenant("A", 3.0));

        assert_eq!(program.len(), 2);
        let names: Vec<&str> = program.statements().map(|s| s.name()).collect();
        assert_eq!(names, vec!["A", "B"]);

        let a = program.covenant("A").unwrap();
        assert_eq!(a.thresholds[0].value, Expr::number(3.0));
    }

    #[test]
    fn remove_by_key() {
        let mut program = Program::new();
        program.insert(covenant("A", 1.0));
        assert!(program.remove(StatementKind::Covenant, "A").is_some());
        assert!(program.remove(StatementKind::Covenant, "A").is_none());
        assert!(program.is_empty());
    }

    #[test]
    fn names_are_scoped_by_kind() {
        let mut program = Program::new();
        program.insert(covenant("Capex", 1.0));
        program.insert(Statement::Basket(Basket {
            name: "Capex".to_string(),
            kind: crate::ast::BasketKind::Fixed,
            capacity: Expr::number(100.0),
        }));

        assert_eq!(program.len(), 2);
        assert!(program.covenant("Capex").is_some());
        assert!(program.basket("Capex").is_some());
    }
}
