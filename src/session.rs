//! The owned, per-session view of one user's applications.
//!
//! Local state only changes after the store confirms a write. A failed
//! write leaves the session exactly as it was.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::auth::Identity;
use crate::error::{TrackerError, TrackerResult};
use crate::filter::FilterState;
use crate::models::{ApplicationPatch, ApplicationRecord, Decision, NewApplication};
use crate::pipeline::{evaluate_staleness, StalenessMode};
use crate::stats::{aggregate, Summary};
use crate::store::{sort_newest_first, ApplicationStore, MemoryStore};
use crate::validate::{prepare_patch, validate_new};

/// Owner key used for records of a session with no identity.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Outcome of a staleness reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reclassified: Vec<String>,
    pub failed: Vec<String>,
}

pub struct Session {
    store: Box<dyn ApplicationStore>,
    identity: Option<Identity>,
    records: Vec<ApplicationRecord>,
}

impl Session {
    /// Load `identity`'s applications from `store`.
    pub fn open(store: Box<dyn ApplicationStore>, identity: Identity) -> TrackerResult<Self> {
        let records = store.list_by_user(&identity.user_id)?;
        info!(user = %identity.user_id, count = records.len(), "session opened");
        Ok(Self {
            store,
            identity: Some(identity),
            records,
        })
    }

    /// A session with no identity. Records live only in memory.
    pub fn anonymous(mut records: Vec<ApplicationRecord>) -> Self {
        sort_newest_first(&mut records);
        let store = MemoryStore::with_records(ANONYMOUS_USER, records.clone());
        debug!(count = records.len(), "anonymous session opened");
        Self {
            store: Box::new(store),
            identity: None,
            records,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_none()
    }

    fn owner(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.user_id.as_str())
            .unwrap_or(ANONYMOUS_USER)
    }

    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&ApplicationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Resolve a full id or a unique id prefix.
    pub fn resolve(&self, id_or_prefix: &str) -> TrackerResult<&ApplicationRecord> {
        if let Some(record) = self.get(id_or_prefix) {
            return Ok(record);
        }
        let mut matches = self
            .records
            .iter()
            .filter(|r| !id_or_prefix.is_empty() && r.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record),
            (Some(_), Some(_)) => Err(TrackerError::AmbiguousId(id_or_prefix.to_string())),
            _ => Err(TrackerError::UnknownApplication(id_or_prefix.to_string())),
        }
    }

    pub fn filtered(&self, filter: &FilterState) -> Vec<&ApplicationRecord> {
        filter.apply(&self.records)
    }

    pub fn summary(&self) -> Summary {
        aggregate(&self.records)
    }

    /// Validate and store a new application.
    pub fn add(&mut self, form: NewApplication, today: NaiveDate) -> TrackerResult<&ApplicationRecord> {
        validate_new(&form, today)?;
        let id = self.store.create(self.owner(), &form)?;
        info!(%id, title = %form.title, company = %form.company, "added application");

        self.records.insert(0, ApplicationRecord::new(id.clone(), &form));
        sort_newest_first(&mut self.records);
        self.get(&id)
            .ok_or(TrackerError::UnknownApplication(id))
    }

    /// Replace the form fields of an application (the edit dialog).
    pub fn edit(&mut self, id: &str, form: NewApplication, today: NaiveDate) -> TrackerResult<()> {
        validate_new(&form, today)?;
        self.update(id, ApplicationPatch::from_form(&form), today)
    }

    /// Apply a field patch: validate, fold in transitions, write, then update
    /// local state.
    pub fn update(&mut self, id: &str, patch: ApplicationPatch, today: NaiveDate) -> TrackerResult<()> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| TrackerError::UnknownApplication(id.to_string()))?;

        let patch = prepare_patch(&self.records[index], patch, today)?;
        if patch.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.store.update(id, &patch) {
            warn!(id, error = %e, "update failed; local state unchanged");
            return Err(e.into());
        }

        let record = &mut self.records[index];
        patch.apply_to(record);
        debug!(id, ?patch, "applied update");
        if patch.applied_date.is_some() {
            sort_newest_first(&mut self.records);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> TrackerResult<ApplicationRecord> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| TrackerError::UnknownApplication(id.to_string()))?;

        if let Err(e) = self.store.delete(id) {
            warn!(id, error = %e, "delete failed; local state unchanged");
            return Err(e.into());
        }
        info!(id, "deleted application");
        Ok(self.records.remove(index))
    }

    /// Undecided waiting applications past the staleness threshold with the
    /// patch that would reclassify each. Writes nothing.
    ///
    /// A recorded decision outranks the stale response, so decided
    /// applications are never candidates.
    pub fn stale_candidates(&self, today: NaiveDate) -> Vec<(String, ApplicationPatch)> {
        self.records
            .iter()
            .filter(|r| r.decision == Decision::Pending)
            .filter_map(|r| evaluate_staleness(r, today).map(|patch| (r.id.clone(), patch)))
            .collect()
    }

    /// Commit every staleness reclassification through the store. Failures are
    /// recorded and skipped.
    pub fn reconcile_staleness(&mut self, today: NaiveDate) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for (id, patch) in self.stale_candidates(today) {
            match self.update(&id, patch, today) {
                Ok(()) => report.reclassified.push(id),
                Err(e) => {
                    warn!(%id, error = %e, "could not mark application as no response");
                    report.failed.push(id);
                }
            }
        }
        if !report.reclassified.is_empty() {
            info!(count = report.reclassified.len(), "marked stale applications as no response");
        }
        report
    }

    /// Run the configured staleness policy. Advisory mode returns an empty
    /// report and leaves everything untouched.
    pub fn apply_staleness_policy(&mut self, mode: StalenessMode, today: NaiveDate) -> ReconcileReport {
        match mode {
            StalenessMode::Advisory => ReconcileReport::default(),
            StalenessMode::Reconcile => self.reconcile_staleness(today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::models::{sample_record, Assessment, Interview, Response};
    use assert_matches::assert_matches;
    use std::cell::Cell;
    use std::rc::Rc;

    fn today() -> NaiveDate {
        "2025-03-01".parse().unwrap()
    }

    fn form(title: &str, applied: &str) -> NewApplication {
        NewApplication {
            title: title.to_string(),
            company: "Acme".to_string(),
            description: String::new(),
            job_link: String::new(),
            applied_date: applied.parse().unwrap(),
        }
    }

    fn signed_in() -> Session {
        let identity = Identity {
            user_id: "u1".to_string(),
            display_name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
        };
        Session::open(Box::new(MemoryStore::new()), identity).unwrap()
    }

    /// Store that fails every write once `failing` is set.
    struct FlakyStore {
        inner: MemoryStore,
        failing: Rc<Cell<bool>>,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), GatewayError> {
            if self.failing.get() {
                Err(GatewayError::NotFound("store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl ApplicationStore for FlakyStore {
        fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, GatewayError> {
            self.inner.list_by_user(user_id)
        }

        fn create(&self, user_id: &str, fields: &NewApplication) -> Result<String, GatewayError> {
            self.check()?;
            self.inner.create(user_id, fields)
        }

        fn update(&self, id: &str, patch: &ApplicationPatch) -> Result<(), GatewayError> {
            self.check()?;
            self.inner.update(id, patch)
        }

        fn delete(&self, id: &str) -> Result<(), GatewayError> {
            self.check()?;
            self.inner.delete(id)
        }
    }

    fn flaky_session() -> (Session, Rc<Cell<bool>>) {
        let failing = Rc::new(Cell::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failing: failing.clone(),
        };
        let identity = Identity {
            user_id: "u1".to_string(),
            display_name: String::new(),
            email: String::new(),
        };
        (Session::open(Box::new(store), identity).unwrap(), failing)
    }

    #[test]
    fn test_add_then_summarize() {
        let mut session = signed_in();
        session.add(form("Engineer", "2025-01-01"), today()).unwrap();

        let summary = session.summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.responded, 0);
        assert_eq!(summary.response_rate, 0.0);
        assert_eq!(summary.awaiting_response, 1);
        assert_eq!(summary.active, 1);
    }

    #[test]
    fn test_add_rejects_invalid_form_without_writing() {
        let mut session = signed_in();
        let result = session.add(form("  ", "2025-01-01"), today());
        assert_matches!(result, Err(TrackerError::Validation(_)));
        assert!(session.records().is_empty());
    }

    #[test]
    fn test_records_stay_newest_first() {
        let mut session = signed_in();
        session.add(form("January", "2025-01-01"), today()).unwrap();
        session.add(form("February", "2025-02-01"), today()).unwrap();
        session.add(form("Mid January", "2025-01-15"), today()).unwrap();

        let titles: Vec<&str> = session.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["February", "Mid January", "January"]);
    }

    #[test]
    fn test_update_forces_rejection_and_persists() {
        let mut session = signed_in();
        let id = session.add(form("Engineer", "2025-01-01"), today()).unwrap().id.clone();

        session
            .update(&id, ApplicationPatch::new().response(Response::Rejection), today())
            .unwrap();

        let record = session.get(&id).unwrap();
        assert_eq!(record.response, Response::Rejection);
        assert_eq!(record.decision, Decision::Rejected);

        let stored = session.store.list_by_user("u1").unwrap();
        assert_eq!(stored[0].decision, Decision::Rejected);
    }

    #[test]
    fn test_failed_write_leaves_local_state_unchanged() {
        let (mut session, failing) = flaky_session();
        let id = session.add(form("Engineer", "2025-01-01"), today()).unwrap().id.clone();
        let before = session.records().to_vec();

        failing.set(true);
        let result = session.update(&id, ApplicationPatch::new().response(Response::Interview), today());
        assert_matches!(result, Err(TrackerError::Gateway(_)));
        assert_eq!(session.records(), before.as_slice());

        assert_matches!(session.delete(&id), Err(TrackerError::Gateway(_)));
        assert_eq!(session.records().len(), 1);

        assert_matches!(
            session.add(form("Another", "2025-01-02"), today()),
            Err(TrackerError::Gateway(_))
        );
        assert_eq!(session.records().len(), 1);
    }

    #[test]
    fn test_edit_replaces_form_fields_only() {
        let mut session = signed_in();
        let id = session.add(form("Engineer", "2025-01-01"), today()).unwrap().id.clone();
        session
            .update(&id, ApplicationPatch::new().response(Response::Assessment), today())
            .unwrap();

        let mut edited = form("Senior Engineer", "2025-01-05");
        edited.job_link = "https://acme.example/jobs/9".to_string();
        session.edit(&id, edited, today()).unwrap();

        let record = session.get(&id).unwrap();
        assert_eq!(record.title, "Senior Engineer");
        assert_eq!(record.job_link, "https://acme.example/jobs/9");
        assert_eq!(record.response, Response::Assessment);
    }

    #[test]
    fn test_pipeline_scenario_through_session() {
        let mut session = signed_in();
        let id = session.add(form("Engineer", "2025-01-01"), today()).unwrap().id.clone();
        for patch in [
            ApplicationPatch::new().response(Response::Assessment),
            ApplicationPatch::new().assessment(Assessment::Passed),
            ApplicationPatch::new().interview(Interview::Scheduled),
            ApplicationPatch::new().decision(Decision::Offered),
        ] {
            session.update(&id, patch, today()).unwrap();
        }
        let summary = session.summary();
        assert_eq!(summary.offered, 1);
        assert_eq!(summary.interviewed, 1);
        assert_eq!(summary.assessment_passed, 1);
        assert_eq!(summary.active, 0);
    }

    #[test]
    fn test_delete_removes_locally_and_in_store() {
        let mut session = signed_in();
        let id = session.add(form("Engineer", "2025-01-01"), today()).unwrap().id.clone();
        let removed = session.delete(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(session.records().is_empty());
        assert!(session.store.list_by_user("u1").unwrap().is_empty());
        assert_matches!(session.delete(&id), Err(TrackerError::UnknownApplication(_)));
    }

    #[test]
    fn test_resolve_by_prefix() {
        let session = Session::anonymous(vec![
            sample_record("abc-1", "2025-01-01"),
            sample_record("abd-2", "2025-01-02"),
        ]);
        assert_eq!(session.resolve("abc").unwrap().id, "abc-1");
        assert_eq!(session.resolve("abd-2").unwrap().id, "abd-2");
        assert_matches!(session.resolve("ab"), Err(TrackerError::AmbiguousId(_)));
        assert_matches!(session.resolve("zz"), Err(TrackerError::UnknownApplication(_)));
        assert_matches!(session.resolve(""), Err(TrackerError::UnknownApplication(_)));
    }

    #[test]
    fn test_advisory_staleness_writes_nothing() {
        let mut session = signed_in();
        let stale = session.add(form("Old", "2025-01-01"), today()).unwrap().id.clone();
        session.add(form("Recent", "2025-02-20"), today()).unwrap();

        let candidates = session.stale_candidates(today());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, stale);

        let report = session.apply_staleness_policy(StalenessMode::Advisory, today());
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(session.get(&stale).unwrap().response, Response::Waiting);
        assert!(session
            .store
            .list_by_user("u1")
            .unwrap()
            .iter()
            .all(|r| r.response == Response::Waiting));
    }

    #[test]
    fn test_reconcile_staleness_commits_and_rejects() {
        let mut session = signed_in();
        let stale = session.add(form("Old", "2025-01-01"), today()).unwrap().id.clone();
        let recent = session.add(form("Recent", "2025-02-20"), today()).unwrap().id.clone();

        let report = session.apply_staleness_policy(StalenessMode::Reconcile, today());
        assert_eq!(report.reclassified, vec![stale.clone()]);
        assert!(report.failed.is_empty());

        let record = session.get(&stale).unwrap();
        assert_eq!(record.response, Response::NoResponse);
        assert_eq!(record.decision, Decision::Rejected);
        assert_eq!(session.get(&recent).unwrap().response, Response::Waiting);

        let stored = session.store.list_by_user("u1").unwrap();
        let stored_stale = stored.iter().find(|r| r.id == stale).unwrap();
        assert_eq!(stored_stale.response, Response::NoResponse);

        // nothing left to do on a second pass
        assert_eq!(session.reconcile_staleness(today()), ReconcileReport::default());
    }

    #[test]
    fn test_reconcile_leaves_decided_applications_alone() {
        let mut offered = sample_record("a1", "2025-01-01");
        offered.decision = Decision::Offered;
        let undecided = sample_record("a2", "2025-01-01");
        let mut session = Session::anonymous(vec![offered, undecided]);

        let candidates: Vec<String> = session
            .stale_candidates(today())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(candidates, vec!["a2"]);

        let report = session.reconcile_staleness(today());
        assert_eq!(report.reclassified, vec!["a2".to_string()]);
        let record = session.get("a1").unwrap();
        assert_eq!(record.response, Response::Waiting);
        assert_eq!(record.decision, Decision::Offered);
    }

    #[test]
    fn test_edit_repairs_terminal_response_without_decision() {
        let mut record = sample_record("a1", "2025-01-01");
        record.response = Response::Rejection;
        let mut session = Session::anonymous(vec![record.clone()]);

        let mut form = record.form();
        form.title = "Renamed".to_string();
        session.edit("a1", form, today()).unwrap();
        session
            .update("a1", ApplicationPatch::new().assessment(Assessment::Failed), today())
            .unwrap();

        let record = session.get("a1").unwrap();
        assert_eq!(record.title, "Renamed");
        assert_eq!(record.assessment, Assessment::Failed);
        assert_eq!(record.decision, Decision::Rejected);
        assert_eq!(
            session.store.list_by_user(ANONYMOUS_USER).unwrap()[0].decision,
            Decision::Rejected
        );
    }

    #[test]
    fn test_reconcile_records_failures() {
        let (mut session, failing) = flaky_session();
        let id = session.add(form("Old", "2025-01-01"), today()).unwrap().id.clone();
        failing.set(true);

        let report = session.reconcile_staleness(today());
        assert_eq!(report.failed, vec![id.clone()]);
        assert_eq!(session.get(&id).unwrap().response, Response::Waiting);
    }

    #[test]
    fn test_anonymous_session_keeps_records_in_memory() {
        let mut session = Session::anonymous(Vec::new());
        assert!(session.is_anonymous());
        session.add(form("Engineer", "2025-01-01"), today()).unwrap();
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.store.list_by_user(ANONYMOUS_USER).unwrap().len(), 1);
    }
}
