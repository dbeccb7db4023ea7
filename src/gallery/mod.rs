//! Read-only gallery projection for validated capability tokens.

mod catalog;
mod projector;

pub use catalog::SubjectCatalog;
pub use projector::{
    authorize_photo, project, Gallery, ProjectError, RoomGallery, TaskEntry, TaskGallery,
};
