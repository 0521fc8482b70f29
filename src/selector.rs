//! Label selector evaluation
//!
//! Evaluates `k8s_openapi` [`LabelSelector`]s against a label set. An absent
//! selector matches nothing, an empty selector matches everything.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::error::{OperatorError, Result};

/// Evaluate an optional selector. `None` selects nothing.
pub fn matches(selector: Option<&LabelSelector>, labels: &BTreeMap<String, String>) -> Result<bool> {
    match selector {
        Some(selector) => selector_matches(selector, labels),
        None => Ok(false),
    }
}

/// Evaluate a present selector. All `matchLabels` and all `matchExpressions` must hold.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    for requirement in selector.match_expressions.iter().flatten() {
        if !requirement_matches(requirement, labels)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let value = labels.get(&requirement.key).map(String::as_str);
    let values = requirement.values.as_deref().unwrap_or_default();

    match requirement.operator.as_str() {
        "In" => Ok(value.is_some_and(|v| values.iter().any(|req| req == v))),
        "NotIn" => Ok(!value.is_some_and(|v| values.iter().any(|req| req == v))),
        "Exists" => Ok(value.is_some()),
        "DoesNotExist" => Ok(value.is_none()),
        other => Err(OperatorError::Configuration(format!(
            "unsupported label selector operator {other:?} for key {}",
            requirement.key
        ))),
    }
}
