use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// What the employer has done with the application so far.
///
/// Stored and cached as `null` while waiting, otherwise as one of the
/// snake_case tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Response {
    #[default]
    Waiting,
    Assessment,
    Interview,
    Rejection,
    NoResponse,
}

impl Response {
    pub const ALL: [Response; 5] = [
        Response::Waiting,
        Response::Assessment,
        Response::Interview,
        Response::Rejection,
        Response::NoResponse,
    ];

    /// Wire tag, `None` while waiting.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Response::Waiting => None,
            Response::Assessment => Some("assessment"),
            Response::Interview => Some("interview"),
            Response::Rejection => Some("rejection"),
            Response::NoResponse => Some("no_response"),
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "assessment" => Some(Response::Assessment),
            "interview" => Some(Response::Interview),
            "rejection" => Some(Response::Rejection),
            "no_response" => Some(Response::NoResponse),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        self.tag().unwrap_or("waiting")
    }

    /// Rejection and no-response both close the application.
    pub fn is_terminal(self) -> bool {
        matches!(self, Response::Rejection | Response::NoResponse)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Response {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "waiting" {
            return Ok(Response::Waiting);
        }
        Response::from_tag(&lower).ok_or_else(|| ValidationError::UnknownTag {
            field: "response",
            value: s.to_string(),
            expected: "waiting, assessment, interview, rejection, no_response",
        })
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.tag() {
            None => serializer.serialize_none(),
            Some(tag) => serializer.serialize_some(tag),
        }
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(Response::Waiting),
            Some(tag) => Response::from_tag(&tag)
                .ok_or_else(|| de::Error::custom(format!("invalid response '{}'", tag))),
        }
    }
}

/// Outcome of the employer's assessment stage.
///
/// Cached as `null` (pending), `true`, `false`, or `"n/a"` when the
/// employer's pipeline has no assessment at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Assessment {
    #[default]
    Pending,
    Passed,
    Failed,
    NotApplicable,
}

impl Assessment {
    pub fn label(self) -> &'static str {
        match self {
            Assessment::Pending => "pending",
            Assessment::Passed => "passed",
            Assessment::Failed => "failed",
            Assessment::NotApplicable => "n/a",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Assessment::Pending => Assessment::Passed,
            Assessment::Passed => Assessment::Failed,
            Assessment::Failed => Assessment::NotApplicable,
            Assessment::NotApplicable => Assessment::Pending,
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Assessment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Assessment::Pending),
            "passed" | "true" => Ok(Assessment::Passed),
            "failed" | "false" => Ok(Assessment::Failed),
            "n/a" | "na" | "none" => Ok(Assessment::NotApplicable),
            _ => Err(ValidationError::UnknownTag {
                field: "assessment",
                value: s.to_string(),
                expected: "pending, passed, failed, n/a",
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AssessmentRepr {
    Flag(bool),
    Tag(String),
}

impl Serialize for Assessment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Assessment::Pending => serializer.serialize_none(),
            Assessment::Passed => serializer.serialize_bool(true),
            Assessment::Failed => serializer.serialize_bool(false),
            Assessment::NotApplicable => serializer.serialize_str("n/a"),
        }
    }
}

impl<'de> Deserialize<'de> for Assessment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<AssessmentRepr> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(Assessment::Pending),
            Some(AssessmentRepr::Flag(true)) => Ok(Assessment::Passed),
            Some(AssessmentRepr::Flag(false)) => Ok(Assessment::Failed),
            Some(AssessmentRepr::Tag(tag)) if tag == "n/a" => Ok(Assessment::NotApplicable),
            Some(AssessmentRepr::Tag(tag)) => Err(de::Error::custom(format!(
                "invalid assessment '{}'",
                tag
            ))),
        }
    }
}

/// Whether an interview has been arranged. Cached as `null`, `true`, `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interview {
    #[default]
    Pending,
    Scheduled,
    NotScheduled,
}

impl Interview {
    pub fn label(self) -> &'static str {
        match self {
            Interview::Pending => "pending",
            Interview::Scheduled => "scheduled",
            Interview::NotScheduled => "not_scheduled",
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Interview::Pending => None,
            Interview::Scheduled => Some(true),
            Interview::NotScheduled => Some(false),
        }
    }

    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Interview::Pending,
            Some(true) => Interview::Scheduled,
            Some(false) => Interview::NotScheduled,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Interview::Pending => Interview::Scheduled,
            Interview::Scheduled => Interview::NotScheduled,
            Interview::NotScheduled => Interview::Pending,
        }
    }
}

impl fmt::Display for Interview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interview {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Interview::Pending),
            "scheduled" | "true" => Ok(Interview::Scheduled),
            "not_scheduled" | "not-scheduled" | "false" => Ok(Interview::NotScheduled),
            _ => Err(ValidationError::UnknownTag {
                field: "interview",
                value: s.to_string(),
                expected: "pending, scheduled, not_scheduled",
            }),
        }
    }
}

impl Serialize for Interview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_flag().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Interview {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Interview::from_flag)
    }
}

/// Final outcome. Cached as `""`, `"Rejected"` or `"Offered Job"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Decision {
    #[default]
    Pending,
    Rejected,
    Offered,
}

impl Decision {
    pub fn wire(self) -> &'static str {
        match self {
            Decision::Pending => "",
            Decision::Rejected => "Rejected",
            Decision::Offered => "Offered Job",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "" => Some(Decision::Pending),
            "Rejected" => Some(Decision::Rejected),
            "Offered Job" => Some(Decision::Offered),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Decision::Pending => "pending",
            Decision::Rejected => "rejected",
            Decision::Offered => "offered",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Decision::Pending => Decision::Offered,
            Decision::Offered => Decision::Rejected,
            Decision::Rejected => Decision::Pending,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(decision) = Decision::from_wire(s) {
            return Ok(decision);
        }
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Decision::Pending),
            "rejected" => Ok(Decision::Rejected),
            "offered" | "offered job" => Ok(Decision::Offered),
            _ => Err(ValidationError::UnknownTag {
                field: "decision",
                value: s.to_string(),
                expected: "pending, rejected, offered",
            }),
        }
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire())
    }
}

impl<'de> Deserialize<'de> for Decision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Decision::from_wire(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid decision '{}'", raw)))
    }
}

/// One tracked job application and its pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub job_link: String,
    pub applied_date: NaiveDate,
    #[serde(default)]
    pub response: Response,
    #[serde(default)]
    pub response_date: Option<NaiveDate>,
    #[serde(default)]
    pub assessment: Assessment,
    #[serde(default)]
    pub interview: Interview,
    #[serde(default)]
    pub decision: Decision,
}

impl ApplicationRecord {
    /// A freshly submitted application: every pipeline field pending.
    pub fn new(id: String, form: &NewApplication) -> Self {
        Self {
            id,
            title: form.title.clone(),
            company: form.company.clone(),
            description: form.description.clone(),
            job_link: form.job_link.clone(),
            applied_date: form.applied_date,
            response: Response::Waiting,
            response_date: None,
            assessment: Assessment::Pending,
            interview: Interview::Pending,
            decision: Decision::Pending,
        }
    }

    /// The user-editable form fields of this record.
    pub fn form(&self) -> NewApplication {
        NewApplication {
            title: self.title.clone(),
            company: self.company.clone(),
            description: self.description.clone(),
            job_link: self.job_link.clone(),
            applied_date: self.applied_date,
        }
    }
}

/// Fields a user submits when adding (or bulk-editing) an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub job_link: String,
    pub applied_date: NaiveDate,
}

/// A partial update. `None` leaves a field untouched; `response_date` uses
/// `Some(None)` to clear the stored date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationPatch {
    pub title: Option<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    pub job_link: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub response: Option<Response>,
    pub response_date: Option<Option<NaiveDate>>,
    pub assessment: Option<Assessment>,
    pub interview: Option<Interview>,
    pub decision: Option<Decision>,
}

impl ApplicationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite every form field, as the edit dialog does.
    pub fn from_form(form: &NewApplication) -> Self {
        Self {
            title: Some(form.title.clone()),
            company: Some(form.company.clone()),
            description: Some(form.description.clone()),
            job_link: Some(form.job_link.clone()),
            applied_date: Some(form.applied_date),
            ..Self::default()
        }
    }

    /// Pipeline state of `record` that differs from a fresh application.
    pub fn pipeline_of(record: &ApplicationRecord) -> Option<Self> {
        let patch = Self {
            response: Some(record.response).filter(|r| *r != Response::Waiting),
            response_date: record
                .response_date
                .filter(|_| record.response != Response::Waiting)
                .map(Some),
            assessment: Some(record.assessment).filter(|a| *a != Assessment::Pending),
            interview: Some(record.interview).filter(|i| *i != Interview::Pending),
            decision: Some(record.decision).filter(|d| *d != Decision::Pending),
            ..Self::default()
        };
        if patch.is_empty() { None } else { Some(patch) }
    }

    pub fn response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    pub fn response_date(mut self, date: Option<NaiveDate>) -> Self {
        self.response_date = Some(date);
        self
    }

    pub fn assessment(mut self, assessment: Assessment) -> Self {
        self.assessment = Some(assessment);
        self
    }

    pub fn interview(mut self, interview: Interview) -> Self {
        self.interview = Some(interview);
        self
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, record: &mut ApplicationRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(company) = &self.company {
            record.company = company.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(job_link) = &self.job_link {
            record.job_link = job_link.clone();
        }
        if let Some(applied_date) = self.applied_date {
            record.applied_date = applied_date;
        }
        if let Some(response) = self.response {
            record.response = response;
        }
        if let Some(response_date) = self.response_date {
            record.response_date = response_date;
        }
        if let Some(assessment) = self.assessment {
            record.assessment = assessment;
        }
        if let Some(interview) = self.interview {
            record.interview = interview;
        }
        if let Some(decision) = self.decision {
            record.decision = decision;
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, applied: &str) -> ApplicationRecord {
    ApplicationRecord::new(
        id.to_string(),
        &NewApplication {
            title: "Engineer".to_string(),
            company: "Acme".to_string(),
            description: String::new(),
            job_link: String::new(),
            applied_date: applied.parse().unwrap(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_with_cached_encodings() {
        let mut record = sample_record("a1", "2025-01-01");
        record.response = Response::Assessment;
        record.assessment = Assessment::NotApplicable;
        record.interview = Interview::Scheduled;
        record.decision = Decision::Offered;

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["response"], json!("assessment"));
        assert_eq!(value["assessment"], json!("n/a"));
        assert_eq!(value["interview"], json!(true));
        assert_eq!(value["decision"], json!("Offered Job"));
        assert_eq!(value["appliedDate"], json!("2025-01-01"));
        assert_eq!(value["responseDate"], json!(null));
    }

    #[test]
    fn test_pending_fields_serialize_as_null_and_empty() {
        let value = serde_json::to_value(sample_record("a1", "2025-01-01")).unwrap();
        assert_eq!(value["response"], json!(null));
        assert_eq!(value["assessment"], json!(null));
        assert_eq!(value["interview"], json!(null));
        assert_eq!(value["decision"], json!(""));
    }

    #[test]
    fn test_legacy_record_without_pipeline_fields_defaults_to_pending() {
        let raw = json!({
            "id": "1700000000000",
            "title": "Engineer",
            "company": "Acme",
            "description": "",
            "jobLink": "",
            "appliedDate": "2025-01-01",
            "response": null,
            "responseDate": null,
            "decision": ""
        });
        let record: ApplicationRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.assessment, Assessment::Pending);
        assert_eq!(record.interview, Interview::Pending);
    }

    #[test]
    fn test_invalid_response_tag_rejected() {
        let mut value = serde_json::to_value(sample_record("a1", "2025-01-01")).unwrap();
        value["response"] = json!("ghosted");
        assert!(serde_json::from_value::<ApplicationRecord>(value).is_err());
    }

    #[test]
    fn test_invalid_assessment_tag_rejected() {
        let mut value = serde_json::to_value(sample_record("a1", "2025-01-01")).unwrap();
        value["assessment"] = json!("maybe");
        assert!(serde_json::from_value::<ApplicationRecord>(value).is_err());
    }

    #[test]
    fn test_cli_tags_parse() {
        assert_eq!("no_response".parse::<Response>().unwrap(), Response::NoResponse);
        assert_eq!("Waiting".parse::<Response>().unwrap(), Response::Waiting);
        assert_eq!("n/a".parse::<Assessment>().unwrap(), Assessment::NotApplicable);
        assert_eq!("not_scheduled".parse::<Interview>().unwrap(), Interview::NotScheduled);
        assert_eq!("Offered Job".parse::<Decision>().unwrap(), Decision::Offered);
        assert_eq!("offered".parse::<Decision>().unwrap(), Decision::Offered);
        assert!("ghosted".parse::<Response>().is_err());
    }

    #[test]
    fn test_patch_leaves_untouched_fields_alone() {
        let mut record = sample_record("a1", "2025-01-01");
        record.description = "keep me".to_string();
        ApplicationPatch::new()
            .response(Response::Interview)
            .apply_to(&mut record);
        assert_eq!(record.response, Response::Interview);
        assert_eq!(record.description, "keep me");
    }

    #[test]
    fn test_patch_can_clear_text_and_response_date() {
        let mut record = sample_record("a1", "2025-01-01");
        record.job_link = "https://example.com/job".to_string();
        record.response_date = Some("2025-01-10".parse().unwrap());

        let patch = ApplicationPatch {
            job_link: Some(String::new()),
            ..ApplicationPatch::new()
        }
        .response_date(None);
        patch.apply_to(&mut record);

        assert!(record.job_link.is_empty());
        assert_eq!(record.response_date, None);
    }

    #[test]
    fn test_pipeline_of_fresh_record_is_none() {
        assert_eq!(ApplicationPatch::pipeline_of(&sample_record("a1", "2025-01-01")), None);

        let mut record = sample_record("a1", "2025-01-01");
        record.assessment = Assessment::Passed;
        let patch = ApplicationPatch::pipeline_of(&record).unwrap();
        assert_eq!(patch.assessment, Some(Assessment::Passed));
        assert_eq!(patch.response, None);
    }
}
