use redb::TableDefinition;

/// Capability tokens: token_id -> CapabilityToken (msgpack)
pub const CAPABILITY_TOKENS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("capability_tokens");

/// Unique index: secret -> token_id
pub const TOKEN_SECRETS: TableDefinition<&str, u64> = TableDefinition::new("token_secrets");

/// Secondary index: subject key ("task:42") -> Vec<token_id> (msgpack)
pub const SUBJECT_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("subject_tokens");

/// Expiration index: "{expires_ms:020}:{token_id:020}" -> token_id
pub const TOKEN_EXPIRY: TableDefinition<&str, u64> = TableDefinition::new("token_expiry");

/// Access events: event_id -> AccessEvent (msgpack)
pub const ACCESS_EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("access_events");

/// Event index by token: "{token_id:020}:{event_id:020}" -> event_id
pub const TOKEN_EVENTS: TableDefinition<&str, u64> = TableDefinition::new("token_events");

/// Event index by subject: "{subject}:{created_ms:020}:{event_id:020}" -> event_id
pub const SUBJECT_EVENTS: TableDefinition<&str, u64> = TableDefinition::new("subject_events");

/// Surrogate id counters: name -> last assigned id
pub const LINK_META: TableDefinition<&str, u64> = TableDefinition::new("link_meta");

/// Rooms: room_id -> Room (msgpack)
pub const ROOMS: TableDefinition<u64, &[u8]> = TableDefinition::new("rooms");

/// Tasks: task_id -> Task (msgpack)
pub const TASKS: TableDefinition<u64, &[u8]> = TableDefinition::new("tasks");

/// Photos: photo_id -> Photo (msgpack)
pub const PHOTOS: TableDefinition<u64, &[u8]> = TableDefinition::new("photos");

/// Secondary index: room_id -> Vec<task_id> (msgpack)
pub const ROOM_TASKS: TableDefinition<u64, &[u8]> = TableDefinition::new("room_tasks");

/// Secondary index: task_id -> Vec<photo_id> (msgpack)
pub const TASK_PHOTOS: TableDefinition<u64, &[u8]> = TableDefinition::new("task_photos");

/// Shape shared by every id-keyed msgpack table
pub type RecordTable = TableDefinition<'static, u64, &'static [u8]>;
