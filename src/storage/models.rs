use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of record a capability token grants access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Room,
    Task,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Room => "room",
            SubjectType::Task => "task",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSubjectType(pub String);

impl fmt::Display for UnknownSubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown subject type: {}", self.0)
    }
}

impl std::error::Error for UnknownSubjectType {}

impl FromStr for SubjectType {
    type Err = UnknownSubjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "room" => Ok(SubjectType::Room),
            "task" => Ok(SubjectType::Task),
            other => Err(UnknownSubjectType(other.to_string())),
        }
    }
}

/// Index key for a subject, e.g. `task:42`
pub fn subject_key(subject_type: SubjectType, subject_id: u64) -> String {
    format!("{subject_type}:{subject_id}")
}

/// Device kind detected from User-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    Bot,
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// An anonymous, read-only grant to one task's or room's gallery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub created_at: DateTime<Utc>,
    /// Issuing user, if the issuance was user-triggered
    pub created_by: Option<String>,
    /// The token is invalid at or after this instant
    pub expires_at: DateTime<Utc>,
    /// Surrogate id assigned by the store
    pub id: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// One-way: false -> true only
    pub revoked: bool,
    /// Opaque URL-safe secret, unique across the store
    pub secret: String,
    pub subject_id: u64,
    pub subject_type: SubjectType,
    pub use_count: u64,
}

impl CapabilityToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Not revoked and not expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// One successful validation of a capability token (immutable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub created_at: DateTime<Utc>,
    pub device_kind: DeviceKind,
    pub id: u64,
    pub ip: Option<IpAddr>,
    pub subject_id: u64,
    pub subject_type: SubjectType,
    pub token_id: u64,
    pub user_agent: Option<String>,
}

/// The caller-supplied part of an access event
#[derive(Debug, Clone, Default)]
pub struct AccessDraft {
    pub device_kind: DeviceKind,
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

// ============================================================================
// Catalog records (owned by the wider punch-list application)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn label(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
            TaskPriority::Urgent => "Urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub id: u64,
    pub priority: TaskPriority,
    pub room_id: Option<u64>,
    pub status: TaskStatus,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub caption: Option<String>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Stored file name under `<data_dir>/photos/`
    pub file_name: String,
    pub id: u64,
    pub task_id: u64,
}
