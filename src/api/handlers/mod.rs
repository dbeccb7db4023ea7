mod internal;
mod public;

pub use internal::{create_link, health, link_events, revoke_link, subject_events};
pub use public::{photo_file, room_photos, task_photos};
