use std::str::FromStr;

use crate::models::{ApplicationRecord, Assessment, Decision, Interview, Response};

/// Either every value, or one specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Selection<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl<T: FromStr> FromStr for Selection<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            s.parse().map(Selection::Only)
        }
    }
}

/// Independent predicates used to pick a visible subset of applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterState {
    pub response: Selection<Response>,
    pub decision: Selection<Decision>,
    pub assessment: Selection<Assessment>,
    pub interview: Selection<Interview>,
}

impl FilterState {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        self.response.matches(&record.response)
            && self.decision.matches(&record.decision)
            && self.assessment.matches(&record.assessment)
            && self.interview.matches(&record.interview)
    }

    pub fn is_active(&self) -> bool {
        !(self.response.is_all()
            && self.decision.is_all()
            && self.assessment.is_all()
            && self.interview.is_all())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn apply<'a>(&self, records: &'a [ApplicationRecord]) -> Vec<&'a ApplicationRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}
