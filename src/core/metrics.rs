// src/core/metrics.rs

//! Rebuilds nested metric trees from the flat, underscore-delimited keys the
//! analysis tool writes (`summary_bg_mean` → `summary.bg.mean`).

use crate::constants::{MAX_METRIC_DEPTH, RESERVED_KEYS, RESERVED_KEY_PREFIX};
use crate::models::MetricTree;
use serde_json::{Map, Value};

/// Whether a result key is tool bookkeeping rather than a metric.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_KEY_PREFIX) || RESERVED_KEYS.contains(&key)
}

/// Builds a metric tree from one parsed result file.
///
/// Reserved keys are dropped. Remaining keys are split on `_`: one segment is a
/// root leaf, two segments nest two levels, three nest three. Longer keys nest
/// three levels deep and keep the rest of the key, underscores included, as the
/// final name (`a_b_c_d` → `a.b.c_d`).
pub fn create_nested_metadata(data: &Map<String, Value>) -> MetricTree {
    let mut tree = MetricTree::new();
    for (key, value) in data {
        if is_reserved_key(key) {
            continue;
        }
        let path: Vec<&str> = key.splitn(MAX_METRIC_DEPTH, '_').collect();
        insert_nested(&mut tree, &path, value.clone(), key);
    }
    log::debug!("Passing {} IQM items to metadata.", tree.len());
    tree
}

fn insert_nested(tree: &mut MetricTree, path: &[&str], value: Value, full_key: &str) {
    match path {
        [] => {}
        [leaf] => {
            tree.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let node = tree
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !node.is_object() {
                // Later keys win over an earlier leaf with the same prefix.
                log::debug!(
                    "Key '{}' replaces leaf '{}' with a nested group.",
                    full_key,
                    head
                );
                *node = Value::Object(Map::new());
            }
            if let Value::Object(child) = node {
                insert_nested(child, rest, value, full_key);
            }
        }
    }
}
