//! Data models for Aloha

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Applicant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ApplicantStatus {
    /// Application received, not yet screened
    #[default]
    Pending,
    /// Scheduled for an interview
    #[serde(rename = "For Interview")]
    ForInterview,
    /// Hired and eligible for deployment
    Hired,
    /// Terminal state; purged after the retention grace period
    Rejected,
}

impl ApplicantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::ForInterview => "For Interview",
            Self::Hired => "Hired",
            Self::Rejected => "Rejected",
        }
    }

    /// Whether records in this status can be purged by retention
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl std::str::FromStr for ApplicantStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "for interview" | "for_interview" => Ok(Self::ForInterview),
            "hired" => Ok(Self::Hired),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown applicant status: {}", s)),
        }
    }
}

/// An applicant record and the uploads it references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Applicant {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    pub status: ApplicantStatus,
    /// Stored reference to the resume upload (e.g. `/uploads/resume-1700000000-42.pdf`)
    pub resume_path: Option<String>,
    /// Stored reference to the identity image upload
    pub id_image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Applicant {
    /// All non-null asset references held by this record
    pub fn asset_references(&self) -> Vec<&str> {
        [self.resume_path.as_deref(), self.id_image_path.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// New applicant for insertion
#[derive(Debug, Clone, Default)]
pub struct NewApplicant {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    pub status: ApplicantStatus,
    pub resume_path: Option<String>,
    pub id_image_path: Option<String>,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
    pub timestamp: String,
}

/// Pagination block returned with paged listings
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_records: i64,
}

/// One page of the audit log, newest first
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub pagination: Pagination,
}
