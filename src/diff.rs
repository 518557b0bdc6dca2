//! Change detection between two resource states.
//!
//! Re-apply decisions are coarse: the installer has no partial apply, so any
//! difference anywhere in `spec` means a full run. Plans still report each
//! changed attribute so users can see what triggered it.

use crate::translate::ConfigModel;
use crate::types::AttributeChange;
use serde_json::{Map, Value};

/// Whether two `launchpad_config` states describe the same cluster spec.
///
/// Both trees are compared after schema defaults are applied and nulls are
/// normalised, so an absent list and an empty one are equal. List order is
/// significant: reordered hook commands or flags count as a change.
pub fn spec_equal(prior: &Value, proposed: &Value) -> bool {
    match (ConfigModel::from_state(prior), ConfigModel::from_state(proposed)) {
        (Ok(prior), Ok(proposed)) => prior.spec == proposed.spec,
        // Undecodable states only compare equal if they are identical.
        _ => prior.get("spec") == proposed.get("spec"),
    }
}

/// Attribute-level differences between two state trees.
///
/// Objects are compared key by key and same-length arrays element by element.
/// Arrays whose length changed are reported as a single change. Null and
/// absent are treated as the same. Top-level attributes named in `ignore`
/// are skipped.
pub fn changes(prior: &Value, proposed: &Value, ignore: &[&str]) -> Vec<AttributeChange> {
    let mut out = Vec::new();
    let empty = Map::new();
    let prior_obj = prior.as_object().unwrap_or(&empty);
    let proposed_obj = proposed.as_object().unwrap_or(&empty);

    for key in union_keys(prior_obj, proposed_obj) {
        if ignore.contains(&key.as_str()) {
            continue;
        }
        diff_value(
            &key,
            prior_obj.get(&key).unwrap_or(&Value::Null),
            proposed_obj.get(&key).unwrap_or(&Value::Null),
            &mut out,
        );
    }
    out
}

fn diff_value(path: &str, before: &Value, after: &Value, out: &mut Vec<AttributeChange>) {
    match (before, after) {
        (a, b) if a == b => {},
        (Value::Null, b) => out.push(AttributeChange::added(path, b.clone())),
        (a, Value::Null) => out.push(AttributeChange::removed(path, a.clone())),
        (Value::Object(a), Value::Object(b)) => {
            for key in union_keys(a, b) {
                diff_value(
                    &format!("{}.{}", path, key),
                    a.get(&key).unwrap_or(&Value::Null),
                    b.get(&key).unwrap_or(&Value::Null),
                    out,
                );
            }
        },
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                diff_value(&format!("{}.{}", path, i), x, y, out);
            }
        },
        (a, b) => out.push(AttributeChange::modified(path, a.clone(), b.clone())),
    }
}

fn union_keys(a: &Map<String, Value>, b: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = a.keys().chain(b.keys()).cloned().collect();
    keys.sort();
    keys.dedup();
    keys
}
