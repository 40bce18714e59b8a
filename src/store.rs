use std::cell::RefCell;

use crate::error::GatewayError;
use crate::models::{ApplicationPatch, ApplicationRecord, NewApplication};

/// Persistence collaborator: a per-user collection of applications.
pub trait ApplicationStore {
    /// All of `user_id`'s applications, most recently applied first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, GatewayError>;

    /// Store a new application with a pending pipeline and return its id.
    fn create(&self, user_id: &str, fields: &NewApplication) -> Result<String, GatewayError>;

    /// Apply the fields present in `patch`; absent fields are untouched.
    fn update(&self, id: &str, patch: &ApplicationPatch) -> Result<(), GatewayError>;

    fn delete(&self, id: &str) -> Result<(), GatewayError>;
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Newest applied date first; insertion order breaks ties, newest first.
pub fn sort_newest_first(records: &mut [ApplicationRecord]) {
    records.sort_by(|a, b| b.applied_date.cmp(&a.applied_date));
}

/// Session-scoped store used when nobody is signed in, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RefCell<Vec<(String, ApplicationRecord)>>,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with records already owned by `user_id`, keeping their ids.
    pub fn with_records(user_id: &str, records: Vec<ApplicationRecord>) -> Self {
        let rows = records
            .into_iter()
            .map(|r| (user_id.to_string(), r))
            .collect();
        Self {
            rows: RefCell::new(rows),
        }
    }
}

impl ApplicationStore for MemoryStore {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, GatewayError> {
        let rows = self.rows.borrow();
        // Newest insertions last; reverse so ties keep newest first after the stable sort
        let mut records: Vec<ApplicationRecord> = rows
            .iter()
            .rev()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, r)| r.clone())
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn create(&self, user_id: &str, fields: &NewApplication) -> Result<String, GatewayError> {
        let id = new_id();
        self.rows
            .borrow_mut()
            .push((user_id.to_string(), ApplicationRecord::new(id.clone(), fields)));
        Ok(id)
    }

    fn update(&self, id: &str, patch: &ApplicationPatch) -> Result<(), GatewayError> {
        let mut rows = self.rows.borrow_mut();
        let (_, record) = rows
            .iter_mut()
            .find(|(_, r)| r.id == id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        patch.apply_to(record);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let mut rows = self.rows.borrow_mut();
        let before = rows.len();
        rows.retain(|(_, r)| r.id != id);
        if rows.len() == before {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
