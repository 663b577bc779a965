//! [`ServiceRegistry`] – lifecycle of running mock services.
//!
//! The registry owns the [`ServiceCatalog`] and the list of running entries.
//! Every mutation holds the registry mutex across the service's own
//! `start()`/`disconnect()`, so two concurrent starts of the same name can
//! never both succeed.
//!
//! | Operation | Absent name | Present name |
//! |---|---|---|
//! | `start` | construct, start, register | [`BridgeError::AlreadyRunning`] |
//! | `stop` | [`BridgeError::NotRunning`] | disconnect, remove |

use tokio::sync::Mutex;
use tracing::{info, warn};
use vsim_types::BridgeError;

use crate::catalog::ServiceCatalog;
use crate::service::ServiceHandle;

struct ServiceEntry {
    name: String,
    handle: ServiceHandle,
}

/// Registry of running mock services.
pub struct ServiceRegistry {
    catalog: ServiceCatalog,
    entries: Mutex<Vec<ServiceEntry>>,
}

impl ServiceRegistry {
    /// Create an empty registry that builds services from `catalog`.
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Construct, start and register the service for `name`.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::AlreadyRunning`] – a service with that name is
    ///   registered; no new instance is constructed.
    /// * [`BridgeError::UnknownEntity`] – the catalog has no factory for it.
    /// * Any error from the service's own `start()`; nothing is registered.
    pub async fn start(&self, name: &str) -> Result<ServiceHandle, BridgeError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.name == name) {
            warn!(entity = name, "service already running");
            return Err(BridgeError::AlreadyRunning(name.to_string()));
        }

        let handle = self.catalog.construct(name)?;
        handle.start().await?;
        entries.push(ServiceEntry {
            name: name.to_string(),
            handle: handle.clone(),
        });
        info!(entity = name, running = entries.len(), "service registered");
        Ok(handle)
    }

    /// Disconnect and remove the service registered as `name`.
    ///
    /// A failed `disconnect()` leaves the entry in place so the stop can be
    /// retried.
    pub async fn stop(&self, name: &str) -> Result<(), BridgeError> {
        let mut entries = self.entries.lock().await;
        let index = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| BridgeError::NotRunning(name.to_string()))?;

        entries[index].handle.disconnect().await?;
        entries.remove(index);
        info!(entity = name, running = entries.len(), "service removed");
        Ok(())
    }

    /// Handle of the running service registered as `name`.
    pub async fn get(&self, name: &str) -> Option<ServiceHandle> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.handle.clone())
    }

    /// Names of every running service, in start order.
    pub async fn get_all_running(&self) -> Vec<String> {
        self.entries.lock().await.iter().map(|e| e.name.clone()).collect()
    }

    /// Entities this registry can start, running or not.
    pub fn available(&self) -> Vec<&'static str> {
        self.catalog.entities()
    }
}
