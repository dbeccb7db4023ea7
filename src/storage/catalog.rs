use redb::{ReadableTable, WriteTransaction};

use super::db::{decode, decode_ids, encode, Database, DatabaseError};
use super::models::{Photo, Room, Task};
use super::tables::*;

impl Database {
    // ========================================================================
    // Catalog writes (seeded by the punch-list application)
    // ========================================================================

    /// Store a room
    pub fn put_room(&self, room: &Room) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ROOMS)?;
            let data = encode(room)?;
            table.insert(room.id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a task, keeping the room -> tasks index in step
    pub fn put_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;

        let previous_room: Option<u64> = {
            let table = write_txn.open_table(TASKS)?;
            let result = match table.get(task.id)? {
                Some(data) => decode::<Task>(data.value())?.room_id,
                None => None,
            };
            result
        };

        {
            let mut table = write_txn.open_table(TASKS)?;
            let data = encode(task)?;
            table.insert(task.id, data.as_slice())?;
        }

        if previous_room != task.room_id {
            if let Some(old) = previous_room {
                remove_from_index(&write_txn, ROOM_TASKS, old, task.id)?;
            }
        }
        if let Some(room_id) = task.room_id {
            add_to_index(&write_txn, ROOM_TASKS, room_id, task.id)?;
        }

        write_txn.commit()?;
        Ok(())
    }

    /// Store a photo record
    pub fn put_photo(&self, photo: &Photo) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(PHOTOS)?;
            let data = encode(photo)?;
            table.insert(photo.id, data.as_slice())?;
        }
        add_to_index(&write_txn, TASK_PHOTOS, photo.task_id, photo.id)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a task and its photo records
    pub fn delete_task(&self, task_id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let task: Option<Task> = {
            let table = write_txn.open_table(TASKS)?;
            let result = match table.get(task_id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            result
        };

        let deleted = match task {
            Some(task) => {
                {
                    let mut table = write_txn.open_table(TASKS)?;
                    table.remove(task_id)?;
                }
                if let Some(room_id) = task.room_id {
                    remove_from_index(&write_txn, ROOM_TASKS, room_id, task_id)?;
                }

                let photo_ids = {
                    let mut index_table = write_txn.open_table(TASK_PHOTOS)?;
                    let ids = decode_ids(index_table.get(task_id)?.as_ref().map(|v| v.value()))?;
                    index_table.remove(task_id)?;
                    ids
                };
                let mut photos = write_txn.open_table(PHOTOS)?;
                for photo_id in photo_ids {
                    photos.remove(photo_id)?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Delete a room. Its tasks are left in place.
    pub fn delete_room(&self, room_id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(ROOMS)?;
            let existed = table.remove(room_id)?.is_some();
            existed
        };
        {
            let mut index_table = write_txn.open_table(ROOM_TASKS)?;
            index_table.remove(room_id)?;
        }
        write_txn.commit()?;
        Ok(deleted)
    }

    // ========================================================================
    // Catalog reads
    // ========================================================================

    pub fn get_room(&self, room_id: u64) -> Result<Option<Room>, DatabaseError> {
        self.get_record(ROOMS, room_id)
    }

    pub fn get_task(&self, task_id: u64) -> Result<Option<Task>, DatabaseError> {
        self.get_record(TASKS, task_id)
    }

    pub fn get_photo(&self, photo_id: u64) -> Result<Option<Photo>, DatabaseError> {
        self.get_record(PHOTOS, photo_id)
    }

    /// Tasks filed against a room, in id order
    pub fn get_tasks_by_room(&self, room_id: u64) -> Result<Vec<Task>, DatabaseError> {
        let mut tasks: Vec<Task> = self.get_indexed(ROOM_TASKS, TASKS, room_id)?;
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    /// Photos attached to a task, oldest first
    pub fn get_photos_by_task(&self, task_id: u64) -> Result<Vec<Photo>, DatabaseError> {
        let mut photos: Vec<Photo> = self.get_indexed(TASK_PHOTOS, PHOTOS, task_id)?;
        photos.sort_by_key(|p| (p.created_at, p.id));
        Ok(photos)
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        definition: RecordTable,
        id: u64,
    ) -> Result<Option<T>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(definition)?;

        match table.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn get_indexed<T: serde::de::DeserializeOwned>(
        &self,
        index: RecordTable,
        records: RecordTable,
        owner_id: u64,
    ) -> Result<Vec<T>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let records_table = read_txn.open_table(records)?;

        let ids = decode_ids(index_table.get(owner_id)?.as_ref().map(|v| v.value()))?;
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = records_table.get(id)? {
                result.push(decode(data.value())?);
            }
        }
        Ok(result)
    }
}

fn add_to_index(
    txn: &WriteTransaction,
    index: RecordTable,
    owner_id: u64,
    child_id: u64,
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(index)?;
    let mut ids = decode_ids(table.get(owner_id)?.as_ref().map(|v| v.value()))?;
    if !ids.contains(&child_id) {
        ids.push(child_id);
        let data = encode(&ids)?;
        table.insert(owner_id, data.as_slice())?;
    }
    Ok(())
}

fn remove_from_index(
    txn: &WriteTransaction,
    index: RecordTable,
    owner_id: u64,
    child_id: u64,
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(index)?;
    let mut ids = decode_ids(table.get(owner_id)?.as_ref().map(|v| v.value()))?;
    ids.retain(|id| *id != child_id);
    if ids.is_empty() {
        table.remove(owner_id)?;
    } else {
        let data = encode(&ids)?;
        table.insert(owner_id, data.as_slice())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::storage::models::TaskStatus;
    use crate::testutil::{make_photo, make_room, make_task, setup_db};

    #[test]
    fn test_room_task_index_follows_moves() {
        let (db, _temp) = setup_db();
        db.put_room(&make_room(1, "Boiler room")).unwrap();
        db.put_room(&make_room(2, "Lobby")).unwrap();

        let mut task = make_task(10, Some(1), "Leaking valve");
        db.put_task(&task).unwrap();
        assert_eq!(db.get_tasks_by_room(1).unwrap().len(), 1);

        task.room_id = Some(2);
        task.status = TaskStatus::Done;
        db.put_task(&task).unwrap();
        assert!(db.get_tasks_by_room(1).unwrap().is_empty());
        assert_eq!(db.get_tasks_by_room(2).unwrap()[0].status, TaskStatus::Done);
    }

    #[test]
    fn test_delete_task_removes_photos() {
        let (db, _temp) = setup_db();
        db.put_task(&make_task(10, Some(1), "Cracked tile")).unwrap();
        db.put_photo(&make_photo(100, 10)).unwrap();
        db.put_photo(&make_photo(101, 10)).unwrap();
        assert_eq!(db.get_photos_by_task(10).unwrap().len(), 2);

        assert!(db.delete_task(10).unwrap());
        assert!(db.get_task(10).unwrap().is_none());
        assert!(db.get_photo(100).unwrap().is_none());
        assert!(db.get_photos_by_task(10).unwrap().is_empty());
        assert!(db.get_tasks_by_room(1).unwrap().is_empty());
    }
}
