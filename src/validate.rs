//! Invariant checks applied before any create or update reaches the store.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::models::{ApplicationPatch, ApplicationRecord, Decision, NewApplication, Response};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(text: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::MalformedDate(text.to_string()))
}

fn require_text(value: &str, err: ValidationError) -> Result<(), ValidationError> {
    if value.trim().is_empty() { Err(err) } else { Ok(()) }
}

fn check_applied_date(applied: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if applied > today {
        return Err(ValidationError::FutureAppliedDate { applied, today });
    }
    Ok(())
}

/// Validate a submitted add/edit form.
pub fn validate_new(form: &NewApplication, today: NaiveDate) -> Result<(), ValidationError> {
    require_text(&form.title, ValidationError::EmptyTitle)?;
    require_text(&form.company, ValidationError::EmptyCompany)?;
    check_applied_date(form.applied_date, today)
}

/// Validate `patch` against the record it will be applied to and fold in the
/// automatic transitions, returning the patch that should be written.
///
/// A terminal response (rejection or no response) always carries
/// `decision = Rejected` in the same write. Returning to waiting clears the
/// response date.
pub fn prepare_patch(
    current: &ApplicationRecord,
    mut patch: ApplicationPatch,
    today: NaiveDate,
) -> Result<ApplicationPatch, ValidationError> {
    if let Some(title) = &patch.title {
        require_text(title, ValidationError::EmptyTitle)?;
    }
    if let Some(company) = &patch.company {
        require_text(company, ValidationError::EmptyCompany)?;
    }
    if let Some(applied) = patch.applied_date {
        check_applied_date(applied, today)?;
    }

    match patch.response {
        Some(response) if response.is_terminal() => {
            patch.decision = Some(Decision::Rejected);
        }
        Some(Response::Waiting) => match patch.response_date {
            None => patch.response_date = Some(None),
            Some(Some(_)) => return Err(ValidationError::ResponseDateWhileWaiting),
            Some(None) => {}
        },
        _ => {}
    }

    // Stored records may already hold a terminal response with no decision.
    // A patch that touches neither field repairs that in the same write.
    if patch.response.is_none()
        && patch.decision.is_none()
        && current.response.is_terminal()
        && current.decision != Decision::Rejected
    {
        patch.decision = Some(Decision::Rejected);
    }

    let response = patch.response.unwrap_or(current.response);
    let decision = patch.decision.unwrap_or(current.decision);
    if response.is_terminal() && decision != Decision::Rejected {
        return Err(ValidationError::DecisionContradictsResponse {
            response: response.label(),
            decision: decision.label(),
        });
    }
    if response == Response::Waiting && matches!(patch.response_date, Some(Some(_))) {
        return Err(ValidationError::ResponseDateWhileWaiting);
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_record, Assessment, Interview};
    use assert_matches::assert_matches;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn form(title: &str, company: &str, applied: &str) -> NewApplication {
        NewApplication {
            title: title.to_string(),
            company: company.to_string(),
            description: String::new(),
            job_link: String::new(),
            applied_date: parse_date(applied).unwrap(),
        }
    }

    #[test]
    fn test_parse_date_accepts_iso_dates() {
        assert_eq!(
            parse_date("2025-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(
            parse_date(" 2025-02-28 ").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_parse_date_rejects_malformed_input() {
        assert_matches!(parse_date("2025-02-30"), Err(ValidationError::MalformedDate(_)));
        assert_matches!(parse_date("01/02/2025"), Err(ValidationError::MalformedDate(_)));
        assert_matches!(parse_date(""), Err(ValidationError::MalformedDate(_)));
    }

    #[test]
    fn test_blank_title_and_company_rejected() {
        assert_eq!(
            validate_new(&form("   ", "Acme", "2025-01-01"), today()),
            Err(ValidationError::EmptyTitle)
        );
        assert_eq!(
            validate_new(&form("Engineer", "", "2025-01-01"), today()),
            Err(ValidationError::EmptyCompany)
        );
    }

    #[test]
    fn test_future_applied_date_rejected() {
        assert_matches!(
            validate_new(&form("Engineer", "Acme", "2025-03-02"), today()),
            Err(ValidationError::FutureAppliedDate { .. })
        );
        assert!(validate_new(&form("Engineer", "Acme", "2025-03-01"), today()).is_ok());
    }

    #[test]
    fn test_terminal_response_forces_rejected_decision() {
        let record = sample_record("a1", "2025-01-01");
        for response in [Response::Rejection, Response::NoResponse] {
            let patch =
                prepare_patch(&record, ApplicationPatch::new().response(response), today()).unwrap();
            assert_eq!(patch.decision, Some(Decision::Rejected));

            let mut updated = record.clone();
            patch.apply_to(&mut updated);
            assert_eq!(updated.decision, Decision::Rejected);
        }
    }

    #[test]
    fn test_terminal_response_overrides_offered_in_same_patch() {
        let record = sample_record("a1", "2025-01-01");
        let patch = ApplicationPatch::new()
            .response(Response::Rejection)
            .decision(Decision::Offered);
        let patch = prepare_patch(&record, patch, today()).unwrap();
        assert_eq!(patch.decision, Some(Decision::Rejected));
    }

    #[test]
    fn test_decision_contradicting_stored_terminal_response_rejected() {
        let mut record = sample_record("a1", "2025-01-01");
        record.response = Response::Rejection;
        record.decision = Decision::Rejected;

        let result = prepare_patch(
            &record,
            ApplicationPatch::new().decision(Decision::Offered),
            today(),
        );
        assert_matches!(result, Err(ValidationError::DecisionContradictsResponse { .. }));
    }

    #[test]
    fn test_unrelated_patch_repairs_missing_rejection() {
        let mut record = sample_record("a1", "2025-01-01");
        record.response = Response::Rejection;

        let patch = ApplicationPatch {
            title: Some("Renamed".to_string()),
            ..ApplicationPatch::new()
        };
        let patch = prepare_patch(&record, patch, today()).unwrap();
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
        assert_eq!(patch.decision, Some(Decision::Rejected));

        // a consistent record gets no extra field
        record.decision = Decision::Rejected;
        let patch =
            prepare_patch(&record, ApplicationPatch::new().interview(Interview::NotScheduled), today())
                .unwrap();
        assert_eq!(patch.decision, None);
    }

    #[test]
    fn test_returning_to_waiting_clears_response_date() {
        let mut record = sample_record("a1", "2025-01-01");
        record.response = Response::Interview;
        record.response_date = Some(parse_date("2025-01-15").unwrap());

        let patch =
            prepare_patch(&record, ApplicationPatch::new().response(Response::Waiting), today())
                .unwrap();
        assert_eq!(patch.response_date, Some(None));
    }

    #[test]
    fn test_response_date_on_waiting_record_rejected() {
        let record = sample_record("a1", "2025-01-01");
        let patch = ApplicationPatch::new().response_date(Some(parse_date("2025-01-15").unwrap()));
        assert_eq!(
            prepare_patch(&record, patch, today()),
            Err(ValidationError::ResponseDateWhileWaiting)
        );
    }

    #[test]
    fn test_non_terminal_patch_passes_through_unchanged() {
        let record = sample_record("a1", "2025-01-01");
        let patch = ApplicationPatch::new()
            .response(Response::Assessment)
            .assessment(Assessment::Passed);
        assert_eq!(prepare_patch(&record, patch.clone(), today()).unwrap(), patch);
    }

    #[test]
    fn test_blank_title_in_patch_rejected() {
        let record = sample_record("a1", "2025-01-01");
        let patch = ApplicationPatch {
            title: Some(" ".to_string()),
            ..ApplicationPatch::new()
        };
        assert_eq!(
            prepare_patch(&record, patch, today()),
            Err(ValidationError::EmptyTitle)
        );
    }
}
