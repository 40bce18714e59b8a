use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Null, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{
    ApplicationPatch, ApplicationRecord, Assessment, Decision, Interview, NewApplication, Response,
};
use crate::store::{new_id, ApplicationStore};

const SELECT_COLUMNS: &str = "id, title, company, description, job_link, applied_date,
     response, response_date, assessment, interview, decision";

/// SQLite-backed application store. One row per application, keyed by an
/// opaque id and scoped by `user_id`.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        // assessment is untyped so it can hold NULL, 0/1 or 'n/a' as stored
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                job_link TEXT NOT NULL DEFAULT '',
                applied_date TEXT NOT NULL,
                response TEXT CHECK (response IS NULL OR response IN ('assessment', 'interview', 'rejection', 'no_response')),
                response_date INTEGER,
                assessment CHECK (assessment IS NULL OR assessment IN (0, 1, 'n/a')),
                interview INTEGER CHECK (interview IS NULL OR interview IN (0, 1)),
                decision TEXT NOT NULL DEFAULT '' CHECK (decision IN ('', 'Rejected', 'Offered Job')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id, applied_date);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<(), GatewayError> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(GatewayError::Uninitialized);
        }
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ApplicationRecord> {
        let response_date: Option<i64> = row.get(7)?;
        Ok(ApplicationRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            description: row.get(3)?,
            job_link: row.get(4)?,
            applied_date: row.get(5)?,
            response: row.get(6)?,
            response_date: response_date.and_then(timestamp_to_date),
            assessment: row.get(8)?,
            interview: row.get(9)?,
            decision: row.get(10)?,
        })
    }
}

impl ApplicationStore for Database {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, GatewayError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE user_id = ?1
             ORDER BY applied_date DESC, rowid DESC",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create(&self, user_id: &str, fields: &NewApplication) -> Result<String, GatewayError> {
        let id = new_id();
        self.conn.execute(
            "INSERT INTO applications (id, user_id, title, company, description, job_link, applied_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                user_id,
                fields.title,
                fields.company,
                fields.description,
                fields.job_link,
                fields.applied_date
            ],
        )?;
        debug!(%id, user_id, "created application");
        Ok(id)
    }

    fn update(&self, id: &str, patch: &ApplicationPatch) -> Result<(), GatewayError> {
        let mut assignments: Vec<(&str, Box<dyn ToSql>)> = Vec::new();

        if let Some(title) = &patch.title {
            assignments.push(("title", Box::new(title.clone())));
        }
        if let Some(company) = &patch.company {
            assignments.push(("company", Box::new(company.clone())));
        }
        if let Some(description) = &patch.description {
            assignments.push(("description", Box::new(description.clone())));
        }
        if let Some(job_link) = &patch.job_link {
            assignments.push(("job_link", Box::new(job_link.clone())));
        }
        if let Some(applied_date) = patch.applied_date {
            assignments.push(("applied_date", Box::new(applied_date)));
        }
        if let Some(response) = patch.response {
            assignments.push(("response", Box::new(response)));
        }
        if let Some(response_date) = patch.response_date {
            assignments.push(("response_date", Box::new(response_date.map(date_to_timestamp))));
        }
        if let Some(assessment) = patch.assessment {
            assignments.push(("assessment", Box::new(assessment)));
        }
        if let Some(interview) = patch.interview {
            assignments.push(("interview", Box::new(interview)));
        }
        if let Some(decision) = patch.decision {
            assignments.push(("decision", Box::new(decision)));
        }

        let mut sql = String::from("UPDATE applications SET updated_at = datetime('now')");
        for (i, (column, _)) in assignments.iter().enumerate() {
            sql.push_str(&format!(", {} = ?{}", column, i + 1));
        }
        sql.push_str(&format!(" WHERE id = ?{}", assignments.len() + 1));

        let mut values: Vec<Box<dyn ToSql>> =
            assignments.into_iter().map(|(_, value)| value).collect();
        values.push(Box::new(id.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        debug!(id, "updated application");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let changed = self
            .conn
            .execute("DELETE FROM applications WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        debug!(id, "deleted application");
        Ok(())
    }
}

// --- Column encodings ---

/// Response dates are stored as unix timestamps at midnight UTC.
fn date_to_timestamp(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn timestamp_to_date(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

fn invalid(what: &str, value: ValueRef<'_>) -> FromSqlError {
    FromSqlError::Other(format!("invalid {} value {:?}", what, value).into())
}

impl ToSql for Response {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.tag() {
            Some(tag) => ToSqlOutput::from(tag),
            None => ToSqlOutput::from(Null),
        })
    }
}

impl FromSql for Response {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Response::Waiting),
            ValueRef::Text(_) => {
                Response::from_tag(value.as_str()?).ok_or_else(|| invalid("response", value))
            }
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for Assessment {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Assessment::Pending => ToSqlOutput::from(Null),
            Assessment::Passed => ToSqlOutput::from(1i64),
            Assessment::Failed => ToSqlOutput::from(0i64),
            Assessment::NotApplicable => ToSqlOutput::from("n/a"),
        })
    }
}

impl FromSql for Assessment {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Assessment::Pending),
            ValueRef::Integer(1) => Ok(Assessment::Passed),
            ValueRef::Integer(0) => Ok(Assessment::Failed),
            ValueRef::Text(b"n/a") => Ok(Assessment::NotApplicable),
            other => Err(invalid("assessment", other)),
        }
    }
}

impl ToSql for Interview {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.as_flag() {
            None => ToSqlOutput::from(Null),
            Some(flag) => ToSqlOutput::from(flag as i64),
        })
    }
}

impl FromSql for Interview {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Interview::Pending),
            ValueRef::Integer(1) => Ok(Interview::Scheduled),
            ValueRef::Integer(0) => Ok(Interview::NotScheduled),
            other => Err(invalid("interview", other)),
        }
    }
}

impl ToSql for Decision {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.wire()))
    }
}

impl FromSql for Decision {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Decision::from_wire(value.as_str()?).ok_or_else(|| invalid("decision", value))
    }
}
