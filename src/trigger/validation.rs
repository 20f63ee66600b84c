//! Input validation for `POST /workflows/trigger` (§4.I: "Reject with
//! `INVALID_TRIGGER` / `INVALID_PHONE` / `MISSING_REQUIRED` before any
//! side effect").

use super::dto::TriggerRequest;
use crate::error::CoreError;

const MAX_TRIGGER_LEN: usize = 50;
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

/// Validate a trigger request before any side effect is committed.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] carrying one of `MISSING_REQUIRED`,
/// `INVALID_TRIGGER`, `INVALID_PHONE`.
pub fn validate(req: &TriggerRequest) -> Result<(), CoreError> {
    if req.trigger.is_empty() || req.phone.is_empty() {
        return Err(CoreError::Validation("MISSING_REQUIRED".to_string()));
    }
    if req.trigger.chars().count() > MAX_TRIGGER_LEN || req.trigger.contains(' ') {
        return Err(CoreError::Validation("INVALID_TRIGGER".to_string()));
    }
    if !is_valid_phone(&req.phone) {
        return Err(CoreError::Validation("INVALID_PHONE".to_string()));
    }
    Ok(())
}

fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let len = digits.chars().count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&len) && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TriggerRequest {
        TriggerRequest {
            trigger: "form_submitted".to_string(),
            phone: "919876543210".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_a_well_formed_request() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn rejects_missing_trigger() {
        let req = TriggerRequest { trigger: String::new(), ..base() };
        assert!(matches!(validate(&req), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_trigger_with_spaces() {
        let req = TriggerRequest { trigger: "form submitted".to_string(), ..base() };
        assert!(matches!(validate(&req), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_trigger_over_fifty_chars() {
        let req = TriggerRequest { trigger: "a".repeat(51), ..base() };
        assert!(matches!(validate(&req), Err(CoreError::Validation(_))));
    }

    #[test]
    fn accepts_phone_with_leading_plus() {
        let req = TriggerRequest { phone: "+919876543210".to_string(), ..base() };
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn rejects_phone_too_short() {
        let req = TriggerRequest { phone: "123".to_string(), ..base() };
        assert!(matches!(validate(&req), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_phone_with_letters() {
        let req = TriggerRequest { phone: "91987654321a".to_string(), ..base() };
        assert!(matches!(validate(&req), Err(CoreError::Validation(_))));
    }
}
