//! Expiry Cleanup Task
//!
//! Background task that periodically shreds expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{run_blocking, CacheStore};

/// Spawns a background task that periodically removes expired entries.
///
/// Each pass runs on the blocking pool since it scans and overwrites files.
/// The returned handle is aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::open(settings)?);
/// let cleanup_handle = spawn_cleanup_task(Arc::clone(&store), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(store: Arc<CacheStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match run_blocking(&store, |store| store.clean_expired()).await {
                Ok(report) if report.removed > 0 => {
                    info!(
                        "Expiry cleanup: removed {} entries ({} bytes)",
                        report.removed, report.bytes
                    );
                }
                Ok(_) => debug!("Expiry cleanup: no expired entries found"),
                Err(e) => warn!(error = %e, "Expiry cleanup pass failed"),
            }
        }
    })
}
