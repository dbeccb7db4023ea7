//! Mints capability tokens, or reuses and extends the live one for a subject.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::storage::models::{CapabilityToken, SubjectType};
use crate::storage::{Database, DatabaseError};

use super::generator::generate_secret;

/// Inserts attempted before a secret collision is reported
const MAX_INSERT_ATTEMPTS: usize = 2;

/// Hard ceiling on any link's validity, whatever the configured bounds say
pub const MAX_TTL_DAYS: u32 = 36_500;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Secret collided on every insert attempt")]
    Conflict,
}

/// Allowed validity window, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlBounds {
    pub default_days: u32,
    pub max_days: u32,
    pub min_days: u32,
}

impl Default for TtlBounds {
    fn default() -> Self {
        Self {
            default_days: 30,
            max_days: 365,
            min_days: 1,
        }
    }
}

impl TtlBounds {
    /// Clamp a requested TTL into bounds. Absent or non-positive requests get the default.
    ///
    /// The result never exceeds [`MAX_TTL_DAYS`].
    pub fn clamp_days(&self, requested: Option<i64>) -> u32 {
        let days = match requested {
            Some(d) if d > 0 => d,
            _ => i64::from(self.default_days),
        };
        days.max(i64::from(self.min_days))
            .min(i64::from(self.max_days))
            .min(i64::from(MAX_TTL_DAYS)) as u32
    }
}

/// What a caller asks the issuer for
#[derive(Debug, Clone)]
pub struct LinkRequest<'a> {
    pub issued_by: Option<&'a str>,
    pub subject_id: u64,
    pub subject_type: SubjectType,
    /// Requested validity in days; clamped with [`TtlBounds::clamp_days`]
    pub ttl_days: Option<i64>,
}

/// Get the live token for a subject or mint a new one
pub fn get_or_create_link(
    db: &Database,
    req: &LinkRequest<'_>,
    bounds: &TtlBounds,
) -> Result<CapabilityToken, IssueError> {
    get_or_create_link_at(db, req, bounds, Utc::now())
}

/// [`get_or_create_link`] against an explicit clock
pub fn get_or_create_link_at(
    db: &Database,
    req: &LinkRequest<'_>,
    bounds: &TtlBounds,
    now: DateTime<Utc>,
) -> Result<CapabilityToken, IssueError> {
    get_or_create_link_with(db, req, bounds, now, generate_secret)
}

pub(crate) fn get_or_create_link_with(
    db: &Database,
    req: &LinkRequest<'_>,
    bounds: &TtlBounds,
    now: DateTime<Utc>,
    mut next_secret: impl FnMut() -> String,
) -> Result<CapabilityToken, IssueError> {
    let ttl_days = bounds.clamp_days(req.ttl_days);
    let desired_expiry = now + Duration::days(i64::from(ttl_days));

    if let Some(token) = db.find_active_token(req.subject_type, req.subject_id, now)? {
        if token.expires_at >= desired_expiry {
            return Ok(token);
        }
        // A concurrent revoke, expiry, or delete makes extend return None; mint instead
        if let Some(extended) = db.extend_expiry(token.id, desired_expiry, now)? {
            tracing::debug!(
                token_id = extended.id,
                subject = %req.subject_type,
                subject_id = req.subject_id,
                expires_at = %extended.expires_at,
                "Extended capability token"
            );
            return Ok(extended);
        }
    }

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        let secret = next_secret();
        match db.insert_token(
            req.subject_type,
            req.subject_id,
            &secret,
            desired_expiry,
            req.issued_by,
            now,
        ) {
            Ok(token) => {
                tracing::info!(
                    token_id = token.id,
                    subject = %req.subject_type,
                    subject_id = req.subject_id,
                    ttl_days,
                    "Issued capability token"
                );
                return Ok(token);
            }
            Err(DatabaseError::SecretConflict) => {
                tracing::warn!(attempt, subject = %req.subject_type, "Capability secret collided");
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::error!(
        subject = %req.subject_type,
        subject_id = req.subject_id,
        "Capability secret collided on every attempt"
    );
    Err(IssueError::Conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;

    fn task_request(ttl_days: Option<i64>) -> LinkRequest<'static> {
        LinkRequest {
            issued_by: Some("alice"),
            subject_id: 12,
            subject_type: SubjectType::Task,
            ttl_days,
        }
    }

    #[test]
    fn test_clamp_days() {
        let bounds = TtlBounds::default();
        assert_eq!(bounds.clamp_days(None), 30);
        assert_eq!(bounds.clamp_days(Some(0)), 30);
        assert_eq!(bounds.clamp_days(Some(-4)), 30);
        assert_eq!(bounds.clamp_days(Some(1)), 1);
        assert_eq!(bounds.clamp_days(Some(90)), 90);
        assert_eq!(bounds.clamp_days(Some(10_000)), 365);
    }

    #[test]
    fn test_clamp_days_respects_hard_ceiling() {
        let bounds = TtlBounds {
            default_days: 30,
            max_days: 100_000_000,
            min_days: 1,
        };
        assert_eq!(bounds.clamp_days(Some(i64::MAX)), MAX_TTL_DAYS);

        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = get_or_create_link_at(&db, &task_request(Some(i64::MAX)), &bounds, now).unwrap();
        assert_eq!(token.expires_at, now + Duration::days(i64::from(MAX_TTL_DAYS)));
    }

    #[test]
    fn test_reuse_with_same_or_smaller_ttl() {
        let (db, _temp) = setup_db();
        let bounds = TtlBounds::default();
        let now = Utc::now();

        let first = get_or_create_link_at(&db, &task_request(Some(30)), &bounds, now).unwrap();
        let second = get_or_create_link_at(&db, &task_request(Some(30)), &bounds, now).unwrap();
        let third = get_or_create_link_at(&db, &task_request(Some(5)), &bounds, now).unwrap();

        assert_eq!(first.secret, second.secret);
        assert_eq!(first.secret, third.secret);
        assert_eq!(third.expires_at, first.expires_at);
        assert_eq!(db.tokens_for_subject(SubjectType::Task, 12).unwrap().len(), 1);
    }

    #[test]
    fn test_longer_ttl_extends() {
        let (db, _temp) = setup_db();
        let bounds = TtlBounds::default();
        let now = Utc::now();

        let first = get_or_create_link_at(&db, &task_request(Some(10)), &bounds, now).unwrap();
        let second = get_or_create_link_at(&db, &task_request(Some(30)), &bounds, now).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.expires_at - first.expires_at, Duration::days(20));
    }

    #[test]
    fn test_revoked_token_is_not_reused() {
        let (db, _temp) = setup_db();
        let bounds = TtlBounds::default();
        let now = Utc::now();

        let first = get_or_create_link_at(&db, &task_request(None), &bounds, now).unwrap();
        db.revoke_token(first.id).unwrap();
        let second = get_or_create_link_at(&db, &task_request(None), &bounds, now).unwrap();

        assert_ne!(first.secret, second.secret);
        assert!(!second.revoked);
    }

    #[test]
    fn test_collision_retries_once() {
        let (db, _temp) = setup_db();
        let bounds = TtlBounds::default();
        let now = Utc::now();
        let taken = generate_secret();
        db.insert_token(SubjectType::Room, 1, &taken, now + Duration::days(1), None, now)
            .unwrap();

        let mut secrets = vec![generate_secret(), taken.clone()];
        let token = get_or_create_link_with(&db, &task_request(None), &bounds, now, || {
            secrets.pop().unwrap()
        })
        .unwrap();
        assert_ne!(token.secret, taken);
        assert_eq!(token.subject_type, SubjectType::Task);
    }

    #[test]
    fn test_repeated_collision_is_conflict() {
        let (db, _temp) = setup_db();
        let bounds = TtlBounds::default();
        let now = Utc::now();
        let taken = generate_secret();
        db.insert_token(SubjectType::Room, 1, &taken, now + Duration::days(1), None, now)
            .unwrap();

        let err = get_or_create_link_with(&db, &task_request(None), &bounds, now, || taken.clone())
            .unwrap_err();
        assert!(matches!(err, IssueError::Conflict));
    }
}
