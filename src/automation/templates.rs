//! Template variable resolution (§4.H).

use serde_json::Value;
use thiserror::Error;

use super::models::{EmptyVariablePolicy, Lead, MessagingTemplate, VariableSource};

/// Context a template's variables resolve against.
pub struct ResolutionContext<'a> {
    /// The lead the template is being sent to.
    pub lead: &'a Lead,
    /// Event/context variables carried from the trigger (§4.I
    /// `enrichedVariables`).
    pub event: &'a Value,
    /// System-injected values produced during this run (e.g. `meetLink`).
    pub resolved: &'a Value,
}

/// Failure resolving a template's variables.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A position resolved empty and the template's policy is `skip_send`.
    #[error("template '{0}' aborted send: position {1} resolved empty under skip_send policy")]
    Aborted(String, u32),
}

/// Resolve every position in `template` against `ctx`, in position order.
///
/// # Errors
///
/// Returns [`TemplateError::Aborted`] if a position resolves empty and the
/// template's `empty_variable_policy` is `skip_send`.
pub fn resolve(
    template: &MessagingTemplate,
    ctx: &ResolutionContext<'_>,
) -> Result<Vec<String>, TemplateError> {
    let mut ordered = template.variables.clone();
    ordered.sort_by_key(|v| v.position);

    let mut out = Vec::with_capacity(ordered.len());
    for variable in &ordered {
        let value = resolve_source(&variable.source, ctx);
        let value = if value.is_empty() {
            match template.empty_variable_policy {
                EmptyVariablePolicy::SkipSend => {
                    return Err(TemplateError::Aborted(template.name.clone(), variable.position));
                }
                EmptyVariablePolicy::UseFallback => variable.fallback.clone().unwrap_or_default(),
                EmptyVariablePolicy::SendAnyway => String::new(),
            }
        } else {
            value
        };
        out.push(value);
    }
    Ok(out)
}

fn resolve_source(source: &VariableSource, ctx: &ResolutionContext<'_>) -> String {
    match source {
        VariableSource::Static { value } => value.clone(),
        VariableSource::LeadField { path } => super::conditions::evaluate_field_as_string(path, ctx.lead),
        VariableSource::Formula { expression } => {
            super::conditions::evaluate_field_as_string(expression, ctx.lead)
        }
        VariableSource::System { key } => dotted_lookup(ctx.resolved, key)
            .or_else(|| dotted_lookup(ctx.event, key))
            .map(value_to_string)
            .unwrap_or_default(),
        VariableSource::Manual => dotted_lookup(ctx.resolved, "manual")
            .map(value_to_string)
            .unwrap_or_default(),
    }
}

fn dotted_lookup(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current.clone())
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::models::{LeadRefs, LeadScore, LeadStatus, TemplateVariable};
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
            deal_value: None,
            source: None,
            assigned_to: None,
            tags: vec![],
            metadata_refs: LeadRefs::default(),
            metadata_extra: serde_json::json!({}),
            score: LeadScore::default(),
            last_contacted_at: None,
            converted_at: None,
            is_archived: false,
            created_at: Utc::now(),
        }
    }

    fn sample_template(policy: EmptyVariablePolicy) -> MessagingTemplate {
        MessagingTemplate {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            name: "welcome".to_string(),
            language: "en".to_string(),
            variables: vec![
                TemplateVariable {
                    position: 1,
                    source: VariableSource::LeadField { path: "firstName".to_string() },
                    fallback: Some("friend".to_string()),
                },
                TemplateVariable {
                    position: 2,
                    source: VariableSource::LeadField { path: "lastName".to_string() },
                    fallback: Some("there".to_string()),
                },
            ],
            empty_variable_policy: policy,
        }
    }

    #[test]
    fn resolves_lead_field_positions_in_order() {
        let lead = sample_lead();
        let event = serde_json::json!({});
        let resolved = serde_json::json!({});
        let ctx = ResolutionContext { lead: &lead, event: &event, resolved: &resolved };
        let template = sample_template(EmptyVariablePolicy::UseFallback);

        let values = resolve(&template, &ctx).unwrap();
        assert_eq!(values, vec!["Ana".to_string(), "there".to_string()]);
    }

    #[test]
    fn skip_send_aborts_on_empty_position() {
        let lead = sample_lead();
        let event = serde_json::json!({});
        let resolved = serde_json::json!({});
        let ctx = ResolutionContext { lead: &lead, event: &event, resolved: &resolved };
        let template = sample_template(EmptyVariablePolicy::SkipSend);

        assert!(matches!(resolve(&template, &ctx), Err(TemplateError::Aborted(_, 2))));
    }

    #[test]
    fn system_source_reads_resolved_map() {
        let lead = sample_lead();
        let event = serde_json::json!({});
        let resolved = serde_json::json!({"meetLink": "https://meet.example/abc"});
        let ctx = ResolutionContext { lead: &lead, event: &event, resolved: &resolved };
        let template = MessagingTemplate {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            name: "reminder".to_string(),
            language: "en".to_string(),
            variables: vec![TemplateVariable {
                position: 1,
                source: VariableSource::System { key: "meetLink".to_string() },
                fallback: None,
            }],
            empty_variable_policy: EmptyVariablePolicy::SendAnyway,
        };

        let values = resolve(&template, &ctx).unwrap();
        assert_eq!(values, vec!["https://meet.example/abc".to_string()]);
    }
}
