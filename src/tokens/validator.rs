use chrono::{DateTime, Utc};

use crate::storage::models::CapabilityToken;
use crate::storage::{Database, DatabaseError};

use super::generator::is_well_formed;

/// Why a token was refused. Only ever logged; callers see one generic denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Expired,
    NotFound,
    Revoked,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Expired => "expired",
            DenyReason::NotFound => "not_found",
            DenyReason::Revoked => "revoked",
        }
    }
}

/// Outcome of validating a presented secret at one instant
#[derive(Debug, Clone)]
pub enum Validation {
    Denied(DenyReason),
    Granted(CapabilityToken),
}

impl Validation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Validation::Granted(_))
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Validation::Denied(reason) => Some(*reason),
            Validation::Granted(_) => None,
        }
    }
}

/// Resolve a presented secret to a live token
pub fn validate(db: &Database, secret: &str) -> Result<Validation, DatabaseError> {
    validate_at(db, secret, Utc::now())
}

/// [`validate`] against an explicit clock
pub fn validate_at(
    db: &Database,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<Validation, DatabaseError> {
    if !is_well_formed(secret) {
        tracing::debug!(reason = DenyReason::NotFound.as_str(), "Rejected malformed link secret");
        return Ok(Validation::Denied(DenyReason::NotFound));
    }

    let outcome = match db.find_by_secret(secret)? {
        None => Validation::Denied(DenyReason::NotFound),
        // Revocation wins over expiry
        Some(token) if token.revoked => Validation::Denied(DenyReason::Revoked),
        Some(token) if token.is_expired_at(now) => Validation::Denied(DenyReason::Expired),
        Some(token) => Validation::Granted(token),
    };

    match &outcome {
        Validation::Granted(token) => {
            tracing::debug!(token_id = token.id, subject = %token.subject_type, "Link granted")
        }
        Validation::Denied(reason) => tracing::debug!(reason = reason.as_str(), "Link denied"),
    }

    Ok(outcome)
}
