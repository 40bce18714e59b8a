use chrono::NaiveDate;

/// A record failed one of its invariants. The write is never attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("company must not be empty")]
    EmptyCompany,

    #[error("'{0}' is not a valid date (expected YYYY-MM-DD)")]
    MalformedDate(String),

    #[error("applied date {applied} is after today ({today})")]
    FutureAppliedDate { applied: NaiveDate, today: NaiveDate },

    #[error("decision '{decision}' contradicts response '{response}'")]
    DecisionContradictsResponse {
        response: &'static str,
        decision: &'static str,
    },

    #[error("cannot set a response date while still waiting for a response")]
    ResponseDateWhileWaiting,

    #[error("unknown {field} '{value}' (expected one of: {expected})")]
    UnknownTag {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// The persistence collaborator failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("application {0} not found in store")]
    NotFound(String),

    #[error("database not initialized. Run 'jobtrack init' first.")]
    Uninitialized,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    #[error("local session data is corrupt: {0}")]
    CorruptLocalState(String),

    #[error("no application matches '{0}'")]
    UnknownApplication(String),

    #[error("'{0}' matches more than one application; use a longer id")]
    AmbiguousId(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
