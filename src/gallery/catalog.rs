use crate::storage::models::{Photo, Room, Task};
use crate::storage::{Database, DatabaseError};

/// Read access to the punch-list records a gallery is built from.
///
/// Has no write methods: anything holding only a
/// `SubjectCatalog` cannot change tasks, rooms, or photos.
pub trait SubjectCatalog {
    fn photo(&self, photo_id: u64) -> Result<Option<Photo>, DatabaseError>;
    fn photos_for_task(&self, task_id: u64) -> Result<Vec<Photo>, DatabaseError>;
    fn room(&self, room_id: u64) -> Result<Option<Room>, DatabaseError>;
    fn task(&self, task_id: u64) -> Result<Option<Task>, DatabaseError>;
    fn tasks_in_room(&self, room_id: u64) -> Result<Vec<Task>, DatabaseError>;
}

impl SubjectCatalog for Database {
    fn photo(&self, photo_id: u64) -> Result<Option<Photo>, DatabaseError> {
        self.get_photo(photo_id)
    }

    fn photos_for_task(&self, task_id: u64) -> Result<Vec<Photo>, DatabaseError> {
        self.get_photos_by_task(task_id)
    }

    fn room(&self, room_id: u64) -> Result<Option<Room>, DatabaseError> {
        self.get_room(room_id)
    }

    fn task(&self, task_id: u64) -> Result<Option<Task>, DatabaseError> {
        self.get_task(task_id)
    }

    fn tasks_in_room(&self, room_id: u64) -> Result<Vec<Task>, DatabaseError> {
        self.get_tasks_by_room(room_id)
    }
}
