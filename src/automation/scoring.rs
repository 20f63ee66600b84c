//! Lead score recompute, dispatched from `crm.score_refresh` (§4.H scoring
//! dimensions already on [`super::models::LeadScore`], formula supplemented
//! here since the source spec names the dimensions but not how they
//! combine).

use chrono::Utc;

use super::models::{Lead, LeadScore, PipelineStage};

const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;
const STAGE_DEPTH_STEP: f64 = 15.0;
const DEAL_SIZE_SATURATION: f64 = 10_000.0;

/// Recompute every score component for `lead` against its current `stage`.
/// Pure; callers persist the result via `TenantStore::save_lead`.
#[allow(clippy::arithmetic_side_effects)] // all f64, divisors are nonzero constants
pub fn recompute(lead: &Lead, stage: Option<&PipelineStage>) -> LeadScore {
    let recency = match lead.last_contacted_at {
        Some(last) => {
            let days = f64::from(i32::try_from((Utc::now() - last).num_seconds() / 86_400).unwrap_or(i32::MAX));
            (100.0 * 0.5f64.powf(days.max(0.0) / RECENCY_HALF_LIFE_DAYS)).clamp(0.0, 100.0)
        }
        None => 0.0,
    };

    let tag_count = i32::try_from(lead.tags.len()).unwrap_or(i32::MAX);
    let engagement = (f64::from(tag_count) * 20.0).clamp(0.0, 100.0);

    let stage_depth = stage
        .map(|s| (f64::from(s.position) * STAGE_DEPTH_STEP).clamp(0.0, 100.0))
        .unwrap_or(0.0);

    let deal_size = lead
        .deal_value
        .map(|v| (v / DEAL_SIZE_SATURATION * 100.0).clamp(0.0, 100.0))
        .unwrap_or(0.0);

    let source_quality = match lead.source.as_deref() {
        Some("referral") => 90.0,
        Some("ads") => 60.0,
        Some("organic") => 50.0,
        Some(_) => 40.0,
        None => 40.0,
    };

    let total = (recency + engagement + stage_depth + deal_size + source_quality) / 5.0;

    LeadScore { total, recency, engagement, stage_depth, deal_size, source_quality }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::models::{LeadRefs, LeadStatus};
    use serde_json::json;
    use uuid::Uuid;

    fn sample_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            first_name: None,
            last_name: None,
            email: None,
            phone: "1".to_string(),
            pipeline_id: Uuid::new_v4(),
            stage_id: Uuid::new_v4(),
            status: LeadStatus::Open,
            deal_value: Some(5_000.0),
            source: Some("referral".to_string()),
            assigned_to: None,
            tags: vec!["hot".to_string(), "vip".to_string()],
            metadata_refs: LeadRefs::default(),
            metadata_extra: json!({}),
            score: LeadScore::default(),
            last_contacted_at: Some(Utc::now()),
            converted_at: None,
            is_archived: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_contact_scores_high_recency() {
        let score = recompute(&sample_lead(), None);
        assert!(score.recency > 90.0);
    }

    #[test]
    fn never_contacted_scores_zero_recency() {
        let mut lead = sample_lead();
        lead.last_contacted_at = None;
        assert_eq!(recompute(&lead, None).recency, 0.0);
    }

    #[test]
    fn referral_source_scores_higher_than_unknown() {
        let mut referral = sample_lead();
        referral.source = Some("referral".to_string());
        let mut unknown = sample_lead();
        unknown.source = None;
        assert!(
            recompute(&referral, None).source_quality > recompute(&unknown, None).source_quality
        );
    }
}
