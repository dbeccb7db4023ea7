use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::storage::models::{
    CapabilityToken, Photo, Room, SubjectType, Task, TaskPriority, TaskStatus,
};
use crate::storage::DatabaseError;

use super::SubjectCatalog;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] DatabaseError),
    #[error("{subject_type} {subject_id} no longer exists")]
    SubjectMissing {
        subject_id: u64,
        subject_type: SubjectType,
    },
}

#[derive(Debug, Clone)]
pub struct TaskGallery {
    pub expires_at: DateTime<Utc>,
    pub photos: Vec<Photo>,
    pub room: Option<Room>,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub photos: Vec<Photo>,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub struct RoomGallery {
    pub by_priority: BTreeMap<TaskPriority, usize>,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub expires_at: DateTime<Utc>,
    pub photo_count: usize,
    pub room: Room,
    /// Ordered by status, then most urgent first
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Clone)]
pub enum Gallery {
    Room(RoomGallery),
    Task(TaskGallery),
}

/// Load the view model for a granted token
pub fn project(
    catalog: &impl SubjectCatalog,
    token: &CapabilityToken,
) -> Result<Gallery, ProjectError> {
    let missing = || ProjectError::SubjectMissing {
        subject_id: token.subject_id,
        subject_type: token.subject_type,
    };

    match token.subject_type {
        SubjectType::Task => {
            let task = catalog.task(token.subject_id)?.ok_or_else(missing)?;
            let room = match task.room_id {
                Some(room_id) => catalog.room(room_id)?,
                None => None,
            };
            let photos = catalog.photos_for_task(task.id)?;

            Ok(Gallery::Task(TaskGallery {
                expires_at: token.expires_at,
                photos,
                room,
                task,
            }))
        }
        SubjectType::Room => {
            let room = catalog.room(token.subject_id)?.ok_or_else(missing)?;

            let mut tasks = Vec::new();
            let mut by_status = BTreeMap::new();
            let mut by_priority = BTreeMap::new();
            let mut photo_count = 0;
            for task in catalog.tasks_in_room(room.id)? {
                *by_status.entry(task.status).or_insert(0) += 1;
                *by_priority.entry(task.priority).or_insert(0) += 1;
                let photos = catalog.photos_for_task(task.id)?;
                photo_count += photos.len();
                tasks.push(TaskEntry { photos, task });
            }
            tasks.sort_by_key(|e| (e.task.status, Reverse(e.task.priority), e.task.id));

            Ok(Gallery::Room(RoomGallery {
                by_priority,
                by_status,
                expires_at: token.expires_at,
                photo_count,
                room,
                tasks,
            }))
        }
    }
}

/// Resolve a photo only if it belongs to the gallery the token grants
pub fn authorize_photo(
    catalog: &impl SubjectCatalog,
    token: &CapabilityToken,
    photo_id: u64,
) -> Result<Option<Photo>, DatabaseError> {
    let photo = match catalog.photo(photo_id)? {
        Some(p) => p,
        None => return Ok(None),
    };
    let task = match catalog.task(photo.task_id)? {
        Some(t) => t,
        None => return Ok(None),
    };

    let covered = match token.subject_type {
        SubjectType::Task => task.id == token.subject_id,
        SubjectType::Room => {
            task.room_id == Some(token.subject_id) && catalog.room(token.subject_id)?.is_some()
        }
    };

    Ok(covered.then_some(photo))
}
