use serde::Serialize;

use crate::models::{ApplicationRecord, Assessment, Decision, Interview, Response};

/// Summary counters over a set of applications.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    #[serde(rename = "rejectedCount")]
    pub rejected: usize,
    #[serde(rename = "assessmentPassedCount")]
    pub assessment_passed: usize,
    #[serde(rename = "offeredCount")]
    pub offered: usize,
    #[serde(rename = "respondedCount")]
    pub responded: usize,
    #[serde(rename = "interviewedCount")]
    pub interviewed: usize,
    pub response_rate: f64,
    pub interview_rate: f64,
    #[serde(rename = "awaitingResponseCount")]
    pub awaiting_response: usize,
    #[serde(rename = "pendingAssessmentCount")]
    pub pending_assessment: usize,
    #[serde(rename = "noAssessmentRequiredCount")]
    pub no_assessment_required: usize,
    #[serde(rename = "awaitingInterviewCount")]
    pub awaiting_interview: usize,
    #[serde(rename = "activeCount")]
    pub active: usize,
}

/// Percentage of `part` in `total`, one decimal place. Zero when `total` is zero.
fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

pub fn aggregate<'a, I>(records: I) -> Summary
where
    I: IntoIterator<Item = &'a ApplicationRecord>,
{
    let mut summary = Summary::default();

    for r in records {
        summary.total += 1;
        match r.decision {
            Decision::Rejected => summary.rejected += 1,
            Decision::Offered => summary.offered += 1,
            Decision::Pending => summary.active += 1,
        }
        if r.assessment == Assessment::Passed {
            summary.assessment_passed += 1;
        }
        if r.assessment == Assessment::NotApplicable {
            summary.no_assessment_required += 1;
        }
        if r.response == Response::Waiting {
            summary.awaiting_response += 1;
        } else {
            summary.responded += 1;
        }
        if r.interview == Interview::Scheduled {
            summary.interviewed += 1;
        }
        if r.response == Response::Assessment && r.assessment == Assessment::Pending {
            summary.pending_assessment += 1;
        }
        if r.interview == Interview::Pending
            && (r.assessment == Assessment::Passed || r.response == Response::Interview)
        {
            summary.awaiting_interview += 1;
        }
    }

    summary.response_rate = rate(summary.responded, summary.total);
    summary.interview_rate = rate(summary.interviewed, summary.total);
    summary
}
