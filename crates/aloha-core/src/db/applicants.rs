//! Applicant record operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Applicant, ApplicantStatus, NewApplicant};

const APPLICANT_COLUMNS: &str = "id, first_name, last_name, email, position, status, \
     resume_path, id_image_path, created_at, updated_at";

fn row_to_applicant(row: &Row<'_>) -> rusqlite::Result<Applicant> {
    let status_str: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Applicant {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        position: row.get(4)?,
        status: status_str.parse().unwrap_or_default(),
        resume_path: row.get(6)?,
        id_image_path: row.get(7)?,
        created_at: parse_datetime(8, &created_at)?,
        updated_at: parse_datetime(9, &updated_at)?,
    })
}

impl Database {
    /// Insert a new applicant, returning its id
    pub fn insert_applicant(&self, applicant: &NewApplicant) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO applicants (first_name, last_name, email, position, status, resume_path, id_image_path)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                applicant.first_name,
                applicant.last_name,
                applicant.email,
                applicant.position,
                applicant.status.as_str(),
                applicant.resume_path,
                applicant.id_image_path,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get an applicant by id
    pub fn get_applicant(&self, id: i64) -> Result<Option<Applicant>> {
        let conn = self.conn()?;
        let applicant = conn
            .query_row(
                &format!("SELECT {} FROM applicants WHERE id = ?", APPLICANT_COLUMNS),
                params![id],
                row_to_applicant,
            )
            .optional()?;
        Ok(applicant)
    }

    /// Change an applicant's status, stamping `updated_at` with the current time
    pub fn update_applicant_status(&self, id: i64, status: ApplicantStatus) -> Result<()> {
        self.update_applicant_status_at(id, status, Utc::now())
    }

    /// Change an applicant's status with an explicit modification time
    pub fn update_applicant_status_at(
        &self,
        id: i64,
        status: ApplicantStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE applicants SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), format_datetime(at), id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("applicant {}", id)));
        }
        Ok(())
    }

    /// Rejected applicants last modified at or before `cutoff`
    pub fn list_purgeable_applicants(&self, cutoff: DateTime<Utc>) -> Result<Vec<Applicant>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM applicants WHERE status = ? AND updated_at <= ? ORDER BY id",
            APPLICANT_COLUMNS
        ))?;

        let applicants = stmt
            .query_map(
                params![ApplicantStatus::Rejected.as_str(), format_datetime(cutoff)],
                row_to_applicant,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(applicants)
    }

    /// Delete an applicant row. Returns whether a row was removed.
    pub fn delete_applicant(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM applicants WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Count all applicants
    pub fn count_applicants(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM applicants", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_applicant(name: &str, status: ApplicantStatus) -> NewApplicant {
        NewApplicant {
            first_name: name.to_string(),
            last_name: "Santos".to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            position: Some("Security Guard".to_string()),
            status,
            resume_path: Some(format!("/uploads/resume-{}.pdf", name)),
            id_image_path: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_applicant(&new_applicant("Maria", ApplicantStatus::Pending))
            .unwrap();

        let applicant = db.get_applicant(id).unwrap().unwrap();
        assert_eq!(applicant.first_name, "Maria");
        assert_eq!(applicant.status, ApplicantStatus::Pending);
        assert_eq!(applicant.asset_references(), vec!["/uploads/resume-Maria.pdf"]);
        assert!(db.get_applicant(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_update_status_missing_row() {
        let db = Database::in_memory().unwrap();
        let result = db.update_applicant_status(999, ApplicantStatus::Hired);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_purgeable_only_old_rejected() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        let cutoff = now - Duration::hours(72);

        let old_rejected = db
            .insert_applicant(&new_applicant("Old", ApplicantStatus::Pending))
            .unwrap();
        db.update_applicant_status_at(old_rejected, ApplicantStatus::Rejected, now - Duration::days(4))
            .unwrap();

        let fresh_rejected = db
            .insert_applicant(&new_applicant("Fresh", ApplicantStatus::Pending))
            .unwrap();
        db.update_applicant_status_at(fresh_rejected, ApplicantStatus::Rejected, now - Duration::days(2))
            .unwrap();

        let old_hired = db
            .insert_applicant(&new_applicant("Hired", ApplicantStatus::Pending))
            .unwrap();
        db.update_applicant_status_at(old_hired, ApplicantStatus::Hired, now - Duration::days(30))
            .unwrap();

        let purgeable = db.list_purgeable_applicants(cutoff).unwrap();
        let ids: Vec<i64> = purgeable.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![old_rejected]);
    }

    #[test]
    fn test_malformed_timestamp_surfaces_as_error() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_applicant(&new_applicant("Lito", ApplicantStatus::Pending))
            .unwrap();
        db.conn()
            .unwrap()
            .execute(
                "UPDATE applicants SET updated_at = 'not a date' WHERE id = ?",
                params![id],
            )
            .unwrap();

        assert!(matches!(db.get_applicant(id), Err(Error::Database(_))));
    }

    #[test]
    fn test_delete_and_count() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_applicant(&new_applicant("Ana", ApplicantStatus::Rejected))
            .unwrap();
        assert_eq!(db.count_applicants().unwrap(), 1);

        assert!(db.delete_applicant(id).unwrap());
        assert!(!db.delete_applicant(id).unwrap());
        assert_eq!(db.count_applicants().unwrap(), 0);
    }
}
