//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::config::{Config, LinkConfig, NodeConfig, RetentionConfig};
use crate::storage::models::{
    CapabilityToken, Photo, Room, SubjectType, Task, TaskPriority, TaskStatus,
};
use crate::storage::Database;
use crate::tokens::generate_secret;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// The caller must keep the returned `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A `Config` with default link bounds and no retention pruning.
pub fn test_config() -> Config {
    Config {
        links: LinkConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        retention: RetentionConfig::default(),
    }
}

pub fn test_state(db: Database) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), db))
}

pub fn make_room(id: u64, name: &str) -> Room {
    Room {
        building: None,
        floor: None,
        id,
        name: name.to_string(),
    }
}

/// An open, medium-priority task.
pub fn make_task(id: u64, room_id: Option<u64>, title: &str) -> Task {
    Task {
        created_at: Utc::now(),
        description: None,
        id,
        priority: TaskPriority::Medium,
        room_id,
        status: TaskStatus::Open,
        title: title.to_string(),
    }
}

pub fn make_photo(id: u64, task_id: u64) -> Photo {
    Photo {
        caption: None,
        content_type: Some("image/jpeg".to_string()),
        created_at: Utc::now(),
        file_name: format!("photo-{id}.jpg"),
        id,
        task_id,
    }
}

/// An unsaved, active token for the given subject.
pub fn token_for(subject_type: SubjectType, subject_id: u64) -> CapabilityToken {
    let now = Utc::now();
    CapabilityToken {
        created_at: now,
        created_by: None,
        expires_at: now + Duration::days(30),
        id: 1,
        last_used_at: None,
        revoked: false,
        secret: generate_secret(),
        subject_id,
        subject_type,
        use_count: 0,
    }
}
