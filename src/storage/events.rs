use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{
    decode, encode, next_id, subject_event_key, token_event_key, Database, DatabaseError,
};
use super::models::{subject_key, AccessDraft, AccessEvent, CapabilityToken, SubjectType};
use super::tables::*;
use super::tokens::{read_token, write_token};

const EVENT_COUNTER: &str = "access_events";

impl Database {
    // ========================================================================
    // Access event operations
    // ========================================================================

    /// Record one access event and bump the token's usage counters in a single
    /// write transaction.
    ///
    /// Returns `None` if the token no longer exists.
    pub fn record_access(
        &self,
        token_id: u64,
        draft: AccessDraft,
        now: DateTime<Utc>,
    ) -> Result<Option<(CapabilityToken, AccessEvent)>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let mut token = match read_token(&write_txn, token_id)? {
            Some(t) => t,
            None => {
                write_txn.abort()?;
                return Ok(None);
            }
        };

        token.use_count += 1;
        token.last_used_at = Some(now);
        write_token(&write_txn, &token)?;

        let event = AccessEvent {
            created_at: now,
            device_kind: draft.device_kind,
            id: next_id(&write_txn, EVENT_COUNTER)?,
            ip: draft.ip,
            subject_id: token.subject_id,
            subject_type: token.subject_type,
            token_id,
            user_agent: draft.user_agent,
        };

        {
            let mut table = write_txn.open_table(ACCESS_EVENTS)?;
            let data = encode(&event)?;
            table.insert(event.id, data.as_slice())?;
        }
        {
            let mut index_table = write_txn.open_table(TOKEN_EVENTS)?;
            let key = token_event_key(token_id, event.id);
            index_table.insert(key.as_str(), event.id)?;
        }
        {
            let mut index_table = write_txn.open_table(SUBJECT_EVENTS)?;
            let subject = subject_key(event.subject_type, event.subject_id);
            let key = subject_event_key(&subject, &event.created_at, event.id);
            index_table.insert(key.as_str(), event.id)?;
        }

        write_txn.commit()?;
        Ok(Some((token, event)))
    }

    /// Access events for one token, oldest first
    pub fn events_for_token(&self, token_id: u64) -> Result<Vec<AccessEvent>, DatabaseError> {
        let start = format!("{token_id:020}:");
        let end = format!("{token_id:020};");
        self.events_in_range(TokenOrSubject::Token, &start, &end)
    }

    /// Access events for one subject across all of its tokens, oldest first
    pub fn events_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: u64,
    ) -> Result<Vec<AccessEvent>, DatabaseError> {
        let subject = subject_key(subject_type, subject_id);
        let start = format!("{subject}:");
        let end = format!("{subject};");
        self.events_in_range(TokenOrSubject::Subject, &start, &end)
    }

    fn events_in_range(
        &self,
        index: TokenOrSubject,
        start: &str,
        end: &str,
    ) -> Result<Vec<AccessEvent>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = match index {
            TokenOrSubject::Token => read_txn.open_table(TOKEN_EVENTS)?,
            TokenOrSubject::Subject => read_txn.open_table(SUBJECT_EVENTS)?,
        };
        let events_table = read_txn.open_table(ACCESS_EVENTS)?;

        let mut events = Vec::new();
        for entry in index_table.range(start..end)? {
            let (_, event_id) = entry?;
            if let Some(data) = events_table.get(event_id.value())? {
                events.push(decode(data.value())?);
            }
        }
        Ok(events)
    }
}

enum TokenOrSubject {
    Token,
    Subject,
}

/// Cascade: remove every event owned by `token` along with both index entries.
pub(super) fn delete_events_for_token(
    txn: &WriteTransaction,
    token: &CapabilityToken,
) -> Result<usize, DatabaseError> {
    let start = format!("{:020}:", token.id);
    let end = format!("{:020};", token.id);

    let entries: Vec<(String, u64)> = {
        let index_table = txn.open_table(TOKEN_EVENTS)?;
        let mut result = Vec::new();
        for entry in index_table.range(start.as_str()..end.as_str())? {
            let (key, event_id) = entry?;
            result.push((key.value().to_string(), event_id.value()));
        }
        result
    };

    let subject = subject_key(token.subject_type, token.subject_id);
    for (index_key, event_id) in &entries {
        let event: Option<AccessEvent> = {
            let table = txn.open_table(ACCESS_EVENTS)?;
            let result = match table.get(*event_id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            result
        };

        if let Some(event) = event {
            let mut subject_index = txn.open_table(SUBJECT_EVENTS)?;
            let key = subject_event_key(&subject, &event.created_at, event.id);
            subject_index.remove(key.as_str())?;
        }
        {
            let mut table = txn.open_table(ACCESS_EVENTS)?;
            table.remove(*event_id)?;
        }
        {
            let mut index_table = txn.open_table(TOKEN_EVENTS)?;
            index_table.remove(index_key.as_str())?;
        }
    }

    Ok(entries.len())
}
