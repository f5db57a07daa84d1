//! Multi-period financial data store.
//!
//! The interpreter owns exactly one loaded `FinancialData` at a time,
//! replaced wholesale on `load_financials`. Single-period (flat map) data
//! is normalized into a one-element period list so the evaluator has a
//! single resolution path. Periods are always held in chronological
//! order; unqualified identifiers resolve against the last period.

use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;

/// Granularity of a reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Quarterly,
    Monthly,
    Annual,
}

/// One period of financial data.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodData {
    /// Display label, e.g. "Q1 2027".
    pub period: String,
    pub period_type: PeriodType,
    pub period_end: Date,
    pub data: BTreeMap<String, f64>,
}

/// Financial data as loaded by the dashboard: a flat current-period map
/// or an explicit chronological period list.
#[derive(Debug, Clone, PartialEq)]
pub enum FinancialData {
    Single(BTreeMap<String, f64>),
    MultiPeriod(Vec<PeriodData>),
}

/// Normalized period store backing trailing-window queries.
#[derive(Debug, Clone, Default)]
pub struct FinancialStore {
    periods: Vec<PeriodData>,
    multi: bool,
}

impl FinancialStore {
    pub fn empty() -> FinancialStore {
        FinancialStore::default()
    }

    /// Replace the store's contents wholesale.
    ///
    /// Flat data becomes a synthetic "current" period ending at `as_of`
    /// (the interpreter's injected current date). Multi-period data is
    /// sorted chronologically by period end.
    pub fn load(&mut self, data: FinancialData, as_of: Date) {
        match data {
            FinancialData::Single(map) => {
                self.periods = vec![PeriodData {
                    period: "current".to_string(),
                    period_type: PeriodType::Quarterly,
                    period_end: as_of,
                    data: map,
                }];
                self.multi = false;
            }
            FinancialData::MultiPeriod(mut periods) => {
                periods.sort_by_key(|p| p.period_end);
                self.periods = periods;
                self.multi = true;
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.periods.is_empty()
    }

    /// True when the loaded data carried explicit periods.
    pub fn has_multi_period_data(&self) -> bool {
        self.multi
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn periods(&self) -> &[PeriodData] {
        &self.periods
    }

    pub fn period(&self, index: usize) -> Option<&PeriodData> {
        self.periods.get(index)
    }

    /// Index of the most recent period, the default resolution context.
    pub fn latest_index(&self) -> Option<usize> {
        self.periods.len().checked_sub(1)
    }

    /// Metric lookup within one period.
    pub fn metric(&self, index: usize, name: &str) -> Option<f64> {
        self.periods.get(index).and_then(|p| p.data.get(name)).copied()
    }

    /// Indices of the last `n` periods ending at `upto` (inclusive),
    /// oldest first. Returns fewer than `n` when the store is short;
    /// callers surface that as an `InsufficientPeriods` warning.
    pub fn trailing_indices(&self, n: u32, upto: usize) -> Vec<usize> {
        if self.periods.is_empty() || upto >= self.periods.len() {
            return Vec::new();
        }
        let end = upto + 1;
        let start = end.saturating_sub(n as usize);
        (start..end).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn period(label: &str, end: Date, ebitda: f64) -> PeriodData {
        let mut data = BTreeMap::new();
        data.insert("ebitda".to_string(), ebitda);
        PeriodData {
            period: label.to_string(),
            period_type: PeriodType::Quarterly,
            period_end: end,
            data,
        }
    }

    #[test]
    fn single_period_becomes_current() {
        let mut store = FinancialStore::empty();
        let mut map = BTreeMap::new();
        map.insert("revenue".to_string(), 10.0);
        store.load(FinancialData::Single(map), date!(2027 - 06 - 30));

        assert!(store.is_loaded());
        assert!(!store.has_multi_period_data());
        assert_eq!(store.len(), 1);
        assert_eq!(store.metric(0, "revenue"), Some(10.0));
    }

    #[test]
    fn multi_period_sorts_chronologically() {
        let mut store = FinancialStore::empty();
        store.load(
            FinancialData::MultiPeriod(vec![
                period("Q2 2027", date!(2027 - 06 - 30), 20.0),
                period("Q1 2027", date!(2027 - 03 - 31), 10.0),
            ]),
            date!(2027 - 06 - 30),
        );

        assert!(store.has_multi_period_data());
        assert_eq!(store.period(0).unwrap().period, "Q1 2027");
        assert_eq!(store.latest_index(), Some(1));
        assert_eq!(store.metric(1, "ebitda"), Some(20.0));
    }

    #[test]
    fn trailing_window_clips_to_available() {
        let mut store = FinancialStore::empty();
        store.load(
            FinancialData::MultiPeriod(vec![
                period("Q1", date!(2027 - 03 - 31), 1.0),
                period("Q2", date!(2027 - 06 - 30), 2.0),
                period("Q3", date!(2027 - 09 - 30), 3.0),
            ]),
            date!(2027 - 09 - 30),
        );

        assert_eq!(store.trailing_indices(2, 2), vec![1, 2]);
        assert_eq!(store.trailing_indices(4, 2), vec![0, 1, 2]);
        assert_eq!(store.trailing_indices(2, 0), vec![0]);
        assert!(FinancialStore::empty().trailing_indices(2, 0).is_empty());
    }
}
