//! Tenant-owned automation and CRM domain (§3, §4.H): lead/pipeline/rule
//! storage, condition evaluation, template resolution, action execution,
//! and the engine that ties them together.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod models;
pub mod scoring;
pub mod store;
pub mod templates;

pub use actions::{ActionDeps, ReentrantTrigger};
pub use engine::{AutomationEngine, RunOutcome, TriggerContext};
pub use models::{
    ActionType, AutomationRule, Condition, ConditionOperator, EmptyVariablePolicy, Lead,
    LeadRefs, LeadScore, LeadStatus, MessagingTemplate, Pipeline, PipelineStage, RuleAction,
    TemplateVariable, TriggerConfig, TriggerKind, VariableSource,
};
pub use store::TenantStore;
pub use templates::{ResolutionContext, TemplateError};
