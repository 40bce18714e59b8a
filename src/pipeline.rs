//! Pipeline stage derivation and the staleness rule.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ApplicationPatch, ApplicationRecord, Assessment, Decision, Interview, Response};

/// Waiting applications older than this many calendar days are considered ghosted.
pub const STALE_AFTER_DAYS: i64 = 30;

/// Single label summarizing where an application stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Applied,
    AwaitingResponse,
    AssessmentPending,
    AssessmentPassed,
    AssessmentFailed,
    InterviewPending,
    InterviewScheduled,
    Rejected,
    Offered,
    NoResponse,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Applied => "applied",
            Stage::AwaitingResponse => "awaiting response",
            Stage::AssessmentPending => "assessment pending",
            Stage::AssessmentPassed => "assessment passed",
            Stage::AssessmentFailed => "assessment failed",
            Stage::InterviewPending => "interview pending",
            Stage::InterviewScheduled => "interview scheduled",
            Stage::Rejected => "rejected",
            Stage::Offered => "offered",
            Stage::NoResponse => "no response",
        }
    }

    /// Whether the application is finished one way or another.
    pub fn is_closed(self) -> bool {
        matches!(self, Stage::Rejected | Stage::Offered | Stage::NoResponse)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the staleness rule is applied when a session loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessMode {
    /// Report stale applications, write nothing.
    #[default]
    Advisory,
    /// Commit the no-response reclassification through the store.
    Reconcile,
}

impl std::str::FromStr for StalenessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "advisory" => Ok(StalenessMode::Advisory),
            "reconcile" => Ok(StalenessMode::Reconcile),
            other => Err(format!(
                "unknown staleness mode '{}' (expected advisory or reconcile)",
                other
            )),
        }
    }
}

/// Patch marking `record` as no-response if it has waited more than
/// [`STALE_AFTER_DAYS`] calendar days. Decision is left to the transition step.
pub fn evaluate_staleness(record: &ApplicationRecord, today: NaiveDate) -> Option<ApplicationPatch> {
    if record.response != Response::Waiting {
        return None;
    }
    let waited = today.signed_duration_since(record.applied_date).num_days();
    if waited > STALE_AFTER_DAYS {
        Some(ApplicationPatch::new().response(Response::NoResponse))
    } else {
        None
    }
}

/// Derive the stage of `record`. Outcome fields take priority over any
/// intermediate flag still set from earlier in the pipeline.
pub fn derived_stage(record: &ApplicationRecord) -> Stage {
    match record.decision {
        Decision::Offered => return Stage::Offered,
        Decision::Rejected => return Stage::Rejected,
        Decision::Pending => {}
    }
    if record.response == Response::NoResponse {
        return Stage::NoResponse;
    }
    if record.interview == Interview::Scheduled {
        return Stage::InterviewScheduled;
    }
    if record.response == Response::Interview && record.interview == Interview::Pending {
        return Stage::InterviewPending;
    }
    match record.assessment {
        Assessment::Passed => return Stage::AssessmentPassed,
        Assessment::Failed => return Stage::AssessmentFailed,
        _ => {}
    }
    if record.response == Response::Assessment && record.assessment == Assessment::Pending {
        return Stage::AssessmentPending;
    }
    if record.response == Response::Waiting {
        return Stage::AwaitingResponse;
    }
    Stage::Applied
}

/// Which optional pipeline stages have anything to show across a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageVisibility {
    pub assessment: bool,
    pub interview: bool,
    pub outcome: bool,
}

pub fn stage_visibility(records: &[ApplicationRecord]) -> StageVisibility {
    StageVisibility {
        assessment: records.iter().any(|r| r.response == Response::Assessment),
        interview: records.iter().any(|r| {
            r.response == Response::Interview
                || matches!(r.assessment, Assessment::Passed | Assessment::NotApplicable)
        }),
        outcome: records.iter().any(|r| {
            r.interview == Interview::Scheduled
                || r.response == Response::Rejection
                || (r.response == Response::Interview && r.interview == Interview::NotScheduled)
        }),
    }
}
