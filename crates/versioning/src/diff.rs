//! Structural differ over two compiled states.
//!
//! For the union of element keys, each element is added, removed, or
//! present in both; present-in-both elements get per-field changes only
//! where canonical values differ. Comparison is structural (canonical
//! JSON), never textual, so formatting and associative re-ordering do
//! not produce spurious diffs.

use proviso_core::ElementKey;
use serde_json::Value;

use crate::compile::CompiledState;

/// A single field-level difference on one element.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// An element present in both versions with differing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementModification {
    pub key: ElementKey,
    pub fields: Vec<FieldChange>,
}

/// The result of diffing two compiled states.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffResult {
    pub added: Vec<ElementKey>,
    pub removed: Vec<ElementKey>,
    pub modified: Vec<ElementModification>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Diff two compiled states. Output order is deterministic: keys sort
/// by (kind, name).
pub fn diff_states(before: &CompiledState, after: &CompiledState) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, before_element) in &before.elements {
        match after.elements.get(key) {
            None => result.removed.push(key.clone()),
            Some(after_element) => {
                let fields = diff_fields(&before_element.fields, &after_element.fields);
                if !fields.is_empty() {
                    result.modified.push(ElementModification {
                        key: key.clone(),
                        fields,
                    });
                }
            }
        }
    }
    for key in after.elements.keys() {
        if !before.elements.contains_key(key) {
            result.added.push(key.clone());
        }
    }

    result
}

fn diff_fields(
    before: &std::collections::BTreeMap<String, Value>,
    after: &std::collections::BTreeMap<String, Value>,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let b = before.get(key).cloned().unwrap_or(Value::Null);
        let a = after.get(key).cloned().unwrap_or(Value::Null);
        if b != a {
            changes.push(FieldChange {
                field: key.clone(),
                before: b,
                after: a,
            });
        }
    }
    changes
}
