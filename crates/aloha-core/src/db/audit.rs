//! Audit log operations

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{AuditEntry, AuditPage, Pagination};

impl Database {
    /// Log an action to the audit log
    pub fn log_audit(&self, actor: &str, action: &str, details: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO audit_logs (actor, action, details)
            VALUES (?, ?, ?)
            "#,
            params![actor, action, details],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List audit log entries, newest first, one page at a time
    ///
    /// `page` is 1-based; values below 1 are treated as 1.
    pub fn list_audit_log(&self, page: i64, limit: i64) -> Result<AuditPage> {
        let conn = self.conn()?;
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1) * limit;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, actor, action, details, timestamp
            FROM audit_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit, offset], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    actor: row.get(1)?,
                    action: row.get(2)?,
                    details: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
        let total_pages = (total_records + limit - 1) / limit;

        Ok(AuditPage {
            entries,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_records,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_list_newest_first() {
        let db = Database::in_memory().unwrap();
        db.log_audit("admin", "SYSTEM_BACKUP", Some("first")).unwrap();
        db.log_audit("admin", "SYSTEM_RESTORE", None).unwrap();

        let page = db.list_audit_log(1, 15).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].action, "SYSTEM_RESTORE");
        assert_eq!(page.entries[1].details.as_deref(), Some("first"));
        assert_eq!(page.pagination.total_records, 2);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[test]
    fn test_pagination() {
        let db = Database::in_memory().unwrap();
        for i in 0..5 {
            db.log_audit("admin", "EVENT", Some(&format!("n={}", i)))
                .unwrap();
        }

        let page = db.list_audit_log(3, 2).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].details.as_deref(), Some("n=0"));
        assert_eq!(page.pagination.current_page, 3);
        assert_eq!(page.pagination.total_pages, 3);

        let clamped = db.list_audit_log(0, 0).unwrap();
        assert_eq!(clamped.pagination.current_page, 1);
        assert_eq!(clamped.entries.len(), 1);
    }

    #[test]
    fn test_empty_log() {
        let db = Database::in_memory().unwrap();
        let page = db.list_audit_log(1, 15).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.pagination.total_pages, 0);
    }
}
