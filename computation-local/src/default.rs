//! Process-wide default manager
//!
//! The default manager is built lazily from the environment
//! (`COMPUTATION_LOCAL_DIR`, `COMPUTATION_AVAILABLE_CORE`). Entry points that
//! use it hold a [`DefaultManagerGuard`] so it is shut down on exit.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::manager::{config_error, LocalComputationManager};
use computation_config::ConfigLoader;
use computation_core::ComputationResult;

static DEFAULT_MANAGER: Mutex<Option<Arc<LocalComputationManager>>> = parking_lot::const_mutex(None);

/// The default manager, created on first use.
///
/// Construction errors are returned to the caller and not remembered; the
/// next call tries again.
pub fn default_manager() -> ComputationResult<Arc<LocalComputationManager>> {
    let mut slot = DEFAULT_MANAGER.lock();
    if let Some(manager) = slot.as_ref() {
        return Ok(Arc::clone(manager));
    }

    let config = ConfigLoader::new().from_env().map_err(config_error)?;
    let manager = Arc::new(LocalComputationManager::new(config.local)?);
    info!("Created default local computation manager");
    *slot = Some(Arc::clone(&manager));
    Ok(manager)
}

/// Close and forget the default manager, if one exists
pub fn shutdown_default() {
    let manager = DEFAULT_MANAGER.lock().take();
    if let Some(manager) = manager {
        info!("Shutting down default local computation manager");
        if let Err(e) = manager.close() {
            warn!("Failed to close default manager: {}", e);
        }
    }
}

/// Shuts the default manager down when dropped
#[derive(Debug)]
#[must_use = "the default manager is shut down when the guard is dropped"]
pub struct DefaultManagerGuard {
    manager: Arc<LocalComputationManager>,
}

impl DefaultManagerGuard {
    pub fn manager(&self) -> &Arc<LocalComputationManager> {
        &self.manager
    }
}

impl Drop for DefaultManagerGuard {
    fn drop(&mut self) {
        shutdown_default();
    }
}

/// Create the default manager now and tie its shutdown to the returned guard
pub fn init_default() -> ComputationResult<DefaultManagerGuard> {
    Ok(DefaultManagerGuard {
        manager: default_manager()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use computation_core::ComputationError;

    // one test: the default manager is global state
    #[test]
    fn test_default_manager_lifecycle() {
        let base = tempfile::tempdir().unwrap();
        let local_dir = base.path().to_string_lossy().to_string();

        temp_env::with_vars(
            [
                ("COMPUTATION_LOCAL_DIR", Some(local_dir.as_str())),
                ("COMPUTATION_AVAILABLE_CORE", Some("0")),
            ],
            || {
                let err = default_manager().unwrap_err();
                assert!(matches!(err, ComputationError::Config(_)));
            },
        );

        temp_env::with_vars(
            [
                ("COMPUTATION_LOCAL_DIR", Some(local_dir.as_str())),
                ("COMPUTATION_AVAILABLE_CORE", Some("2")),
            ],
            || {
                let guard = init_default().unwrap();
                let again = default_manager().unwrap();
                assert!(Arc::ptr_eq(guard.manager(), &again));
                assert_eq!(again.resources_status().available_cores, 2);

                let common = again.common_dir().to_path_buf();
                assert!(common.is_dir());
                drop(guard);

                assert!(again.is_closed());
                assert!(!common.exists());
                assert!(DEFAULT_MANAGER.lock().is_none());
            },
        );
    }
}
