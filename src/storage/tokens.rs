use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use subtle::ConstantTimeEq;

use super::db::{
    decode, decode_ids, encode, expiry_key, expiry_key_ms, next_id, Database, DatabaseError,
};
use super::events::delete_events_for_token;
use super::models::{subject_key, CapabilityToken, SubjectType};
use super::tables::*;

const TOKEN_COUNTER: &str = "capability_tokens";

impl Database {
    // ========================================================================
    // Capability token operations
    // ========================================================================

    /// Insert a new token. Fails with `SecretConflict` if the secret is taken.
    pub fn insert_token(
        &self,
        subject_type: SubjectType,
        subject_id: u64,
        secret: &str,
        expires_at: DateTime<Utc>,
        created_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CapabilityToken, DatabaseError> {
        debug_assert!(!secret.is_empty(), "token secret must not be empty");

        let write_txn = self.begin_write()?;

        let taken = {
            let secrets = write_txn.open_table(TOKEN_SECRETS)?;
            let exists = secrets.get(secret)?.is_some();
            exists
        };
        if taken {
            write_txn.abort()?;
            return Err(DatabaseError::SecretConflict);
        }

        let token = CapabilityToken {
            created_at: now,
            created_by: created_by.map(str::to_string),
            expires_at,
            id: next_id(&write_txn, TOKEN_COUNTER)?,
            last_used_at: None,
            revoked: false,
            secret: secret.to_string(),
            subject_id,
            subject_type,
            use_count: 0,
        };

        write_token(&write_txn, &token)?;
        {
            let mut secrets = write_txn.open_table(TOKEN_SECRETS)?;
            secrets.insert(token.secret.as_str(), token.id)?;
        }
        {
            let key = subject_key(subject_type, subject_id);
            let mut index_table = write_txn.open_table(SUBJECT_TOKENS)?;
            let mut ids = decode_ids(index_table.get(key.as_str())?.as_ref().map(|v| v.value()))?;
            if !ids.contains(&token.id) {
                ids.push(token.id);
                let data = encode(&ids)?;
                index_table.insert(key.as_str(), data.as_slice())?;
            }
        }
        {
            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            let ek = expiry_key(&token.expires_at, token.id);
            expiry_table.insert(ek.as_str(), token.id)?;
        }

        write_txn.commit()?;
        Ok(token)
    }

    /// Get a token by its surrogate id
    pub fn get_token(&self, token_id: u64) -> Result<Option<CapabilityToken>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CAPABILITY_TOKENS)?;

        match table.get(token_id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Exact-match lookup by secret.
    ///
    /// The stored secret is compared against the presented one in constant
    /// time after the index lookup.
    pub fn find_by_secret(&self, secret: &str) -> Result<Option<CapabilityToken>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let secrets = read_txn.open_table(TOKEN_SECRETS)?;
        let token_id = match secrets.get(secret)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(CAPABILITY_TOKENS)?;
        let token: CapabilityToken = match table.get(token_id)? {
            Some(data) => decode(data.value())?,
            None => return Ok(None),
        };

        if bool::from(token.secret.as_bytes().ct_eq(secret.as_bytes())) {
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// All token rows ever issued for a subject (including revoked/expired)
    pub fn tokens_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: u64,
    ) -> Result<Vec<CapabilityToken>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(SUBJECT_TOKENS)?;
        let tokens_table = read_txn.open_table(CAPABILITY_TOKENS)?;

        let key = subject_key(subject_type, subject_id);
        let ids = decode_ids(index_table.get(key.as_str())?.as_ref().map(|v| v.value()))?;

        let mut tokens = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = tokens_table.get(id)? {
                tokens.push(decode(data.value())?);
            }
        }
        Ok(tokens)
    }

    /// The latest-expiring token for the subject that is neither revoked nor expired
    pub fn find_active_token(
        &self,
        subject_type: SubjectType,
        subject_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<CapabilityToken>, DatabaseError> {
        let tokens = self.tokens_for_subject(subject_type, subject_id)?;
        Ok(tokens
            .into_iter()
            .filter(|t| t.is_active_at(now))
            .max_by_key(|t| t.expires_at))
    }

    /// Move a live token's expiry forward. Never shortens.
    ///
    /// Returns the token as stored after the call, or `None` if it does not
    /// exist or is no longer active at `now`. Revoked and expired rows stay dead.
    pub fn extend_expiry(
        &self,
        token_id: u64,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<CapabilityToken>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let mut token = match read_token(&write_txn, token_id)? {
            Some(t) if t.is_active_at(now) => t,
            _ => {
                write_txn.abort()?;
                return Ok(None);
            }
        };

        if new_expires_at <= token.expires_at {
            write_txn.abort()?;
            return Ok(Some(token));
        }

        let old_key = expiry_key(&token.expires_at, token.id);
        token.expires_at = new_expires_at;
        write_token(&write_txn, &token)?;
        {
            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            expiry_table.remove(old_key.as_str())?;
            let ek = expiry_key(&token.expires_at, token.id);
            expiry_table.insert(ek.as_str(), token.id)?;
        }

        write_txn.commit()?;
        Ok(Some(token))
    }

    /// Mark a token revoked. Idempotent; returns false if the token does not exist.
    pub fn revoke_token(&self, token_id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let found = match read_token(&write_txn, token_id)? {
            Some(mut token) => {
                if !token.revoked {
                    token.revoked = true;
                    write_token(&write_txn, &token)?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(found)
    }

    /// Delete a token, its index entries, and (by cascade) its access events
    pub fn delete_token(&self, token_id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = remove_token(&write_txn, token_id)?;
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Delete every token whose expiry is before `cutoff`, using the expiration
    /// index (no full table scan).
    pub fn delete_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let cutoff_ms = cutoff.timestamp_millis();

        // Phase 1: read the expiration index to collect expired entries
        let expired: Vec<u64> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(TOKEN_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match expiry_key_ms(key.value()) {
                    Some(ms) if ms < cutoff_ms => result.push(value.value()),
                    _ => break,
                }
            }
            result
        };

        if expired.is_empty() {
            return Ok(0);
        }

        // Phase 2: delete tokens with cascade
        let write_txn = self.begin_write()?;
        let mut deleted = 0;
        for token_id in expired {
            // Skip tokens extended since phase 1
            let still_expired = read_token(&write_txn, token_id)?
                .is_some_and(|t| t.expires_at < cutoff);
            if still_expired && remove_token(&write_txn, token_id)? {
                deleted += 1;
            }
        }
        write_txn.commit()?;
        Ok(deleted)
    }
}

pub(super) fn read_token(
    txn: &WriteTransaction,
    token_id: u64,
) -> Result<Option<CapabilityToken>, DatabaseError> {
    let table = txn.open_table(CAPABILITY_TOKENS)?;
    let result = match table.get(token_id)? {
        Some(data) => Some(decode(data.value())?),
        None => None,
    };
    Ok(result)
}

pub(super) fn write_token(
    txn: &WriteTransaction,
    token: &CapabilityToken,
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(CAPABILITY_TOKENS)?;
    let data = encode(token)?;
    table.insert(token.id, data.as_slice())?;
    Ok(())
}

fn remove_token(txn: &WriteTransaction, token_id: u64) -> Result<bool, DatabaseError> {
    let token = match read_token(txn, token_id)? {
        Some(t) => t,
        None => return Ok(false),
    };

    {
        let mut table = txn.open_table(CAPABILITY_TOKENS)?;
        table.remove(token_id)?;
    }
    {
        let mut secrets = txn.open_table(TOKEN_SECRETS)?;
        secrets.remove(token.secret.as_str())?;
    }
    {
        let key = subject_key(token.subject_type, token.subject_id);
        let mut index_table = txn.open_table(SUBJECT_TOKENS)?;
        let mut ids = decode_ids(index_table.get(key.as_str())?.as_ref().map(|v| v.value()))?;
        ids.retain(|id| *id != token_id);
        if ids.is_empty() {
            index_table.remove(key.as_str())?;
        } else {
            let data = encode(&ids)?;
            index_table.insert(key.as_str(), data.as_slice())?;
        }
    }
    {
        let mut expiry_table = txn.open_table(TOKEN_EXPIRY)?;
        let ek = expiry_key(&token.expires_at, token_id);
        expiry_table.remove(ek.as_str())?;
    }

    delete_events_for_token(txn, &token)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;
    use chrono::Duration;

    #[test]
    fn test_insert_and_find_by_secret() {
        let (db, _temp) = setup_db();
        let now = Utc::now();

        let token = db
            .insert_token(SubjectType::Task, 7, "secret-a", now + Duration::days(3), Some("alice"), now)
            .unwrap();
        assert_eq!(token.use_count, 0);
        assert!(token.last_used_at.is_none());

        let found = db.find_by_secret("secret-a").unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert_eq!(found.created_by.as_deref(), Some("alice"));
        assert!(db.find_by_secret("secret-b").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_secret_conflicts() {
        let (db, _temp) = setup_db();
        let now = Utc::now();

        db.insert_token(SubjectType::Room, 1, "dup", now + Duration::days(1), None, now)
            .unwrap();
        let err = db
            .insert_token(SubjectType::Task, 2, "dup", now + Duration::days(1), None, now)
            .unwrap_err();
        assert!(matches!(err, DatabaseError::SecretConflict));
        assert!(db.tokens_for_subject(SubjectType::Task, 2).unwrap().is_empty());
    }

    #[test]
    fn test_find_active_prefers_latest_expiry() {
        let (db, _temp) = setup_db();
        let now = Utc::now();

        db.insert_token(SubjectType::Room, 3, "short", now + Duration::days(2), None, now)
            .unwrap();
        let long = db
            .insert_token(SubjectType::Room, 3, "long", now + Duration::days(9), None, now)
            .unwrap();
        let revoked = db
            .insert_token(SubjectType::Room, 3, "revoked", now + Duration::days(30), None, now)
            .unwrap();
        db.revoke_token(revoked.id).unwrap();

        let active = db.find_active_token(SubjectType::Room, 3, now).unwrap().unwrap();
        assert_eq!(active.id, long.id);

        assert!(db
            .find_active_token(SubjectType::Room, 3, now + Duration::days(10))
            .unwrap()
            .is_none());
        assert!(db.find_active_token(SubjectType::Task, 3, now).unwrap().is_none());
    }

    #[test]
    fn test_extend_expiry_never_shortens() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Task, 1, "s", now + Duration::days(10), None, now)
            .unwrap();

        let shorter = db
            .extend_expiry(token.id, now + Duration::days(5), now)
            .unwrap()
            .unwrap();
        assert_eq!(shorter.expires_at, token.expires_at);

        let longer = db
            .extend_expiry(token.id, now + Duration::days(20), now)
            .unwrap()
            .unwrap();
        assert_eq!(longer.expires_at, now + Duration::days(20));
        assert_eq!(db.get_token(token.id).unwrap().unwrap().expires_at, longer.expires_at);

        assert!(db.extend_expiry(999, now + Duration::days(1), now).unwrap().is_none());
    }

    #[test]
    fn test_extend_expiry_leaves_expired_token_dead() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Task, 1, "lapsed", now - Duration::days(1), None, now)
            .unwrap();

        assert!(db
            .extend_expiry(token.id, now + Duration::days(10), now)
            .unwrap()
            .is_none());
        let stored = db.get_token(token.id).unwrap().unwrap();
        assert_eq!(stored.expires_at, token.expires_at);
        assert!(stored.is_expired_at(now));
    }

    #[test]
    fn test_extend_expiry_leaves_revoked_token_dead() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Room, 2, "pulled", now + Duration::days(3), None, now)
            .unwrap();
        db.revoke_token(token.id).unwrap();

        assert!(db
            .extend_expiry(token.id, now + Duration::days(30), now)
            .unwrap()
            .is_none());
        let stored = db.get_token(token.id).unwrap().unwrap();
        assert!(stored.revoked);
        assert_eq!(stored.expires_at, token.expires_at);
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Room, 1, "s", now + Duration::days(1), None, now)
            .unwrap();

        assert!(db.revoke_token(token.id).unwrap());
        assert!(db.revoke_token(token.id).unwrap());
        assert!(db.get_token(token.id).unwrap().unwrap().revoked);
        assert!(!db.revoke_token(token.id + 1).unwrap());
    }

    #[test]
    fn test_delete_expired_uses_cutoff() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let old = db
            .insert_token(SubjectType::Task, 1, "old", now - Duration::days(40), None, now)
            .unwrap();
        let fresh = db
            .insert_token(SubjectType::Task, 1, "fresh", now + Duration::days(1), None, now)
            .unwrap();

        let deleted = db.delete_tokens_expired_before(now - Duration::days(30)).unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_token(old.id).unwrap().is_none());
        assert!(db.find_by_secret("old").unwrap().is_none());
        assert!(db.get_token(fresh.id).unwrap().is_some());
        assert_eq!(db.tokens_for_subject(SubjectType::Task, 1).unwrap().len(), 1);
    }
}
