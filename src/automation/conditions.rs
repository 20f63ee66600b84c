//! Condition evaluation (§4.H): dotted-path field lookup plus the eight
//! comparison operators.

use serde_json::Value;

use super::models::{Condition, ConditionOperator, Lead};

/// Evaluate `condition` against `lead`. A missing field compares as unset;
/// unset against `eq` to a non-null value is false (§4.H).
pub fn evaluate(condition: &Condition, lead: &Lead) -> bool {
    let field_value = resolve_field(&condition.field, lead);
    apply_operator(condition.operator, field_value.as_ref(), &condition.value)
}

/// Resolve a dotted field path against a lead and render it as a string,
/// for template variable resolution (§4.H). Empty when the path is unset.
pub fn evaluate_field_as_string(path: &str, lead: &Lead) -> String {
    match resolve_field(path, lead) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Resolve a dotted field path against a lead. Top-level names map to
/// struct fields; anything else is looked up inside `metadata.extra`.
fn resolve_field(path: &str, lead: &Lead) -> Option<Value> {
    let mut parts = path.split('.');
    let head = parts.next()?;

    match head {
        "firstName" => lead.first_name.clone().map(Value::from),
        "lastName" => lead.last_name.clone().map(Value::from),
        "email" => lead.email.clone().map(Value::from),
        "phone" => Some(Value::from(lead.phone.clone())),
        "status" => Some(Value::from(lead.status.as_str())),
        "dealValue" => lead.deal_value.map(Value::from),
        "source" => lead.source.clone().map(Value::from),
        "assignedTo" => lead.assigned_to.clone().map(Value::from),
        "tags" => Some(Value::from(lead.tags.clone())),
        "score" => {
            let rest: Vec<&str> = parts.collect();
            let score = serde_json::to_value(lead.score).ok()?;
            dig(&score, &rest)
        }
        "metadata" => {
            let rest: Vec<&str> = parts.collect();
            if rest.first() == Some(&"extra") {
                dig(&lead.metadata_extra, &rest[1..])
            } else {
                None
            }
        }
        // Bare names (no leading `metadata.extra.`) are treated as direct
        // keys into `metadata.extra`, since that's the dotted-path surface
        // the spec calls out explicitly.
        other => {
            let rest: Vec<&str> = parts.collect();
            let mut full = vec![other];
            full.extend(rest);
            dig(&lead.metadata_extra, &full)
        }
    }
}

fn dig(value: &Value, path: &[&str]) -> Option<Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current.clone())
}

fn apply_operator(op: ConditionOperator, field: Option<&Value>, expected: &Value) -> bool {
    match op {
        ConditionOperator::Eq => match field {
            Some(v) => v == expected,
            None => expected.is_null(),
        },
        ConditionOperator::Neq => match field {
            Some(v) => v != expected,
            None => !expected.is_null(),
        },
        ConditionOperator::Gt => compare_numeric(field, expected, |a, b| a > b),
        ConditionOperator::Gte => compare_numeric(field, expected, |a, b| a >= b),
        ConditionOperator::Lt => compare_numeric(field, expected, |a, b| a < b),
        ConditionOperator::Lte => compare_numeric(field, expected, |a, b| a <= b),
        ConditionOperator::In => expected
            .as_array()
            .is_some_and(|arr| field.is_some_and(|v| arr.contains(v))),
        ConditionOperator::Contains => match field {
            Some(Value::String(s)) => expected.as_str().is_some_and(|needle| s.contains(needle)),
            Some(Value::Array(arr)) => arr.contains(expected),
            _ => false,
        },
    }
}

fn compare_numeric(field: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (field.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::models::{LeadRefs, LeadScore, LeadStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            first_name: Some("Ana".to_string()),
            last_name: None,
            email: None,
            phone: "919876543210".to_string(),
            pipeline_id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
            status: LeadStatus::Open,
            deal_value: Some(500.0),
            source: Some("ads".to_string()),
            assigned_to: None,
            tags: vec!["vip".to_string()],
            metadata_refs: LeadRefs::default(),
            metadata_extra: serde_json::json!({"city": "Pune"}),
            score: LeadScore { total: 42.0, ..Default::default() },
            last_contacted_at: None,
            converted_at: None,
            is_archived: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn eq_matches_struct_field() {
        let cond = Condition {
            field: "source".to_string(),
            operator: ConditionOperator::Eq,
            value: serde_json::json!("ads"),
        };
        assert!(evaluate(&cond, &sample_lead()));
    }

    #[test]
    fn gt_compares_numeric_score() {
        let cond = Condition {
            field: "score.total".to_string(),
            operator: ConditionOperator::Gt,
            value: serde_json::json!(40),
        };
        assert!(evaluate(&cond, &sample_lead()));
    }

    #[test]
    fn contains_matches_tag_array() {
        let cond = Condition {
            field: "tags".to_string(),
            operator: ConditionOperator::Contains,
            value: serde_json::json!("vip"),
        };
        assert!(evaluate(&cond, &sample_lead()));
    }

    #[test]
    fn dotted_path_reads_metadata_extra() {
        let cond = Condition {
            field: "city".to_string(),
            operator: ConditionOperator::Eq,
            value: serde_json::json!("Pune"),
        };
        assert!(evaluate(&cond, &sample_lead()));
    }

    #[test]
    fn missing_field_against_eq_nonnull_is_false() {
        let cond = Condition {
            field: "missingThing".to_string(),
            operator: ConditionOperator::Eq,
            value: serde_json::json!("x"),
        };
        assert!(!evaluate(&cond, &sample_lead()));
    }
}
