use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::storage::{Database, DatabaseError};
use crate::AppState;

/// Start the background retention pruner, if a retention window is configured
pub fn start_retention_pruner(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let retention_days = state.config.retention.retention_days?;
    let interval = Duration::from_secs(state.config.retention.prune_interval_seconds);
    info!(retention_days, "Retention pruning enabled for expired links");

    Some(tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_prune(&state, retention_days).await;
        }
    }))
}

/// Delete tokens (and, by cascade, their access events) that expired more than
/// `retention_days` before `now`
pub fn prune_expired(
    db: &Database,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let cutoff = now - ChronoDuration::days(i64::from(retention_days));
    db.delete_tokens_expired_before(cutoff)
}

async fn run_prune(state: &AppState, retention_days: u32) {
    debug!("Running link retention pruning");

    let db = state.db.clone();
    let result =
        tokio::task::spawn_blocking(move || prune_expired(&db, retention_days, Utc::now())).await;

    match result {
        Ok(Ok(count)) if count > 0 => info!(tokens_pruned = count, "Pruned expired links"),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "Failed to prune expired links"),
        Err(e) => error!(error = %e, "Retention pruning task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::SubjectType;
    use crate::testutil::setup_db;

    #[test]
    fn test_prune_respects_retention_window() {
        let (db, _temp) = setup_db();
        let now = Utc::now();
        let long_gone = db
            .insert_token(SubjectType::Task, 1, "a", now - ChronoDuration::days(100), None, now)
            .unwrap();
        let recently_expired = db
            .insert_token(SubjectType::Task, 1, "b", now - ChronoDuration::days(2), None, now)
            .unwrap();

        assert_eq!(prune_expired(&db, 30, now).unwrap(), 1);
        assert!(db.get_token(long_gone.id).unwrap().is_none());
        assert!(db.get_token(recently_expired.id).unwrap().is_some());
        assert_eq!(prune_expired(&db, 30, now).unwrap(), 0);
    }
}
