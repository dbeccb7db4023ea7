//! punchlist-links - public capability links for punch-list photo galleries
//!
//! This crate provides the anonymous, read-only sharing path of the punch list:
//! - Unguessable, time-boxed, revocable tokens per task or room
//! - Validation with one generic denial for unknown, expired, and revoked links
//! - An access audit trail written atomically with usage counters
//! - Read-only gallery projection and HTML viewers
//! - Shareable URLs and memoized QR images for exported documents
//! - redb embedded database (ACID, MVCC, crash-safe)

pub mod api;
pub mod config;
pub mod device;
pub mod expiration;
pub mod gallery;
pub mod share;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use config::Config;
use share::LinkEncoder;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub encoder: LinkEncoder,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let encoder = LinkEncoder::new(config.links.public_base_url.clone());
        Self {
            config,
            db,
            encoder,
        }
    }
}
