//! Local session cache for anonymous use, and migration of its contents
//! into the store once a user signs in.

use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::{ApplicationPatch, ApplicationRecord};
use crate::session::Session;

/// JSON file holding the applications of an anonymous session.
pub struct LocalCache {
    path: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read cached records. A missing file is an empty collection; an
    /// unreadable one is [`TrackerError::CorruptLocalState`].
    pub fn load(&self) -> TrackerResult<Vec<ApplicationRecord>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| TrackerError::CorruptLocalState(e.to_string()))
    }

    /// Like [`load`](Self::load), but discard corrupt data and start empty.
    pub fn load_or_discard(&self) -> TrackerResult<Vec<ApplicationRecord>> {
        match self.load() {
            Err(TrackerError::CorruptLocalState(reason)) => {
                warn!(path = %self.path.display(), %reason, "discarding corrupt local session data");
                self.clear()?;
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Write through a sibling temp file and rename it into place, so an
    /// interrupted save never leaves a truncated cache behind.
    pub fn save(&self, records: &[ApplicationRecord]) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records).map_err(std::io::Error::other)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "local-session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn clear(&self) -> TrackerResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy every cached record into `session`'s store: one create, plus one
/// update carrying any pipeline state. Records that fail are kept in the
/// cache; the cache is removed only when all of them made it.
pub fn migrate(
    cache: &LocalCache,
    session: &mut Session,
    today: NaiveDate,
) -> TrackerResult<MigrationReport> {
    let records = cache.load()?;
    let mut report = MigrationReport::default();
    let mut leftovers = Vec::new();

    for record in records {
        match migrate_one(session, &record, today) {
            Ok(()) => report.migrated += 1,
            Err(e) => {
                warn!(title = %record.title, company = %record.company, error = %e, "could not migrate application");
                report.failed += 1;
                leftovers.push(record);
            }
        }
    }

    if leftovers.is_empty() {
        cache.clear()?;
    } else {
        cache.save(&leftovers)?;
    }
    info!(migrated = report.migrated, failed = report.failed, "local migration finished");
    Ok(report)
}

fn migrate_one(session: &mut Session, record: &ApplicationRecord, today: NaiveDate) -> TrackerResult<()> {
    let id = session.add(record.form(), today)?.id.clone();
    if let Some(pipeline) = ApplicationPatch::pipeline_of(record) {
        session.update(&id, pipeline, today)?;
    }
    Ok(())
}
