use chrono::{DateTime, Utc};
use std::net::IpAddr;
use thiserror::Error;

use crate::device::{classify_user_agent, truncate_user_agent};
use crate::storage::models::{AccessDraft, AccessEvent, CapabilityToken};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Token {0} disappeared before its access could be recorded")]
    TokenGone(u64),
    #[error("Failed to write access event: {0}")]
    WriteFailed(#[from] DatabaseError),
}

/// Request facts captured for the audit trail
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    /// Raw client address as seen by the HTTP layer
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessContext {
    fn into_draft(self) -> AccessDraft {
        let ip = self
            .ip
            .as_deref()
            .and_then(|raw| raw.trim().parse::<IpAddr>().ok());
        let device_kind = self
            .user_agent
            .as_deref()
            .map(classify_user_agent)
            .unwrap_or_default();
        let user_agent = self
            .user_agent
            .as_deref()
            .filter(|ua| !ua.is_empty())
            .map(truncate_user_agent);

        AccessDraft {
            device_kind,
            ip,
            user_agent,
        }
    }
}

/// Record a granted access: one event plus the usage bump, in one transaction
pub fn record_access(
    db: &Database,
    token: &CapabilityToken,
    ctx: AccessContext,
) -> Result<AccessEvent, AuditError> {
    record_access_at(db, token, ctx, Utc::now())
}

/// [`record_access`] against an explicit clock
pub fn record_access_at(
    db: &Database,
    token: &CapabilityToken,
    ctx: AccessContext,
    now: DateTime<Utc>,
) -> Result<AccessEvent, AuditError> {
    match db.record_access(token.id, ctx.into_draft(), now)? {
        Some((updated, event)) => {
            tracing::debug!(
                token_id = updated.id,
                use_count = updated.use_count,
                event_id = event.id,
                "Recorded link access"
            );
            Ok(event)
        }
        None => Err(AuditError::TokenGone(token.id)),
    }
}

/// Record a granted access, logging instead of failing. The grant stands either way.
pub fn record_access_or_warn(
    db: &Database,
    token: &CapabilityToken,
    ctx: AccessContext,
) -> Option<AccessEvent> {
    match record_access(db, token, ctx) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, token_id = token.id, "Audit gap: link access not recorded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{DeviceKind, SubjectType};
    use crate::testutil::setup_db;
    use chrono::Duration;

    fn ctx(ip: &str, ua: &str) -> AccessContext {
        AccessContext {
            ip: Some(ip.to_string()),
            user_agent: Some(ua.to_string()),
        }
    }

    #[test]
    fn test_event_captures_request_facts() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Room, 3, "s", now + Duration::days(1), None, now)
            .unwrap();

        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
        let event = record_access_at(&db, &token, ctx(" 2001:db8::1 ", ua), now).unwrap();

        assert_eq!(event.ip, "2001:db8::1".parse().ok());
        assert_eq!(event.device_kind, DeviceKind::Mobile);
        assert_eq!(event.subject_type, SubjectType::Room);
        assert_eq!(event.subject_id, 3);
        assert_eq!(db.get_token(token.id).unwrap().unwrap().last_used_at, Some(now));
    }

    #[test]
    fn test_unparseable_ip_and_long_agent() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Task, 3, "s", now + Duration::days(1), None, now)
            .unwrap();

        let event = record_access_at(&db, &token, ctx("not-an-ip", &"x".repeat(1000)), now).unwrap();
        assert!(event.ip.is_none());
        assert_eq!(event.user_agent.unwrap().len(), 255);
    }

    #[test]
    fn test_missing_token_is_audit_gap() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let token = db
            .insert_token(SubjectType::Task, 3, "s", now + Duration::days(1), None, now)
            .unwrap();
        db.delete_token(token.id).unwrap();

        let err = record_access_at(&db, &token, AccessContext::default(), now).unwrap_err();
        assert!(matches!(err, AuditError::TokenGone(id) if id == token.id));
        assert!(record_access_or_warn(&db, &token, AccessContext::default()).is_none());
    }
}
