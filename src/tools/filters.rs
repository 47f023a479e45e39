//! Attribute filters for file search.
//!
//! Filters form a tree of comparison leaves and `and`/`or` compounds, built
//! once per request and evaluated against each chunk's attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Compare(CompareFilter),
    Compound(CompoundFilter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareFilter {
    #[serde(rename = "type")]
    pub op: CompareOp,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    #[serde(rename = "type")]
    pub op: CompoundOp,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundOp {
    And,
    Or,
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: Value) -> Self {
        Filter::Compare(CompareFilter {
            op: CompareOp::Eq,
            key: key.into(),
            value,
        })
    }

    /// AND-compose two optional filters; `None` acts as the identity.
    pub fn and_compose(a: Option<Filter>, b: Option<Filter>) -> Option<Filter> {
        match (a, b) {
            (Some(a), Some(b)) => Some(Filter::Compound(CompoundFilter {
                op: CompoundOp::And,
                filters: vec![a, b],
            })),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Evaluate against a chunk's attribute object. Missing keys fail
    /// comparison leaves.
    pub fn matches(&self, attributes: &Value) -> bool {
        match self {
            Filter::Compare(cmp) => {
                let Some(actual) = attributes.get(&cmp.key) else {
                    return false;
                };
                compare(cmp.op, actual, &cmp.value)
            }
            Filter::Compound(comp) => match comp.op {
                CompoundOp::And => comp.filters.iter().all(|f| f.matches(attributes)),
                CompoundOp::Or => comp.filters.iter().any(|f| f.matches(attributes)),
            },
        }
    }
}

fn compare(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
                return false;
            };
            match op {
                CompareOp::Gt => a > b,
                CompareOp::Gte => a >= b,
                CompareOp::Lt => a < b,
                CompareOp::Lte => a <= b,
                _ => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_compare_and_compound_shapes() {
        let filter: Filter = serde_json::from_value(json!({
            "type": "and",
            "filters": [
                {"type": "eq", "key": "team", "value": "search"},
                {"type": "gte", "key": "year", "value": 2024}
            ]
        }))
        .unwrap();
        assert!(matches!(filter, Filter::Compound(_)));

        assert!(filter.matches(&json!({"team": "search", "year": 2025})));
        assert!(!filter.matches(&json!({"team": "search", "year": 2020})));
        assert!(!filter.matches(&json!({"year": 2025})));
    }

    #[test]
    fn or_compound_matches_any_arm() {
        let filter: Filter = serde_json::from_value(json!({
            "type": "or",
            "filters": [
                {"type": "eq", "key": "lang", "value": "rust"},
                {"type": "eq", "key": "lang", "value": "go"}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&json!({"lang": "go"})));
        assert!(!filter.matches(&json!({"lang": "python"})));
    }

    #[test]
    fn and_compose_treats_none_as_identity() {
        let security = Filter::eq("tenant", json!("acme"));
        let combined = Filter::and_compose(None, Some(security.clone())).unwrap();
        assert_eq!(combined, security);

        let llm = Filter::eq("topic", json!("billing"));
        let both = Filter::and_compose(Some(llm), Some(security)).unwrap();
        assert!(both.matches(&json!({"tenant": "acme", "topic": "billing"})));
        assert!(!both.matches(&json!({"tenant": "other", "topic": "billing"})));
    }
}
