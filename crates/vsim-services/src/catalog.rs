//! [`ServiceCatalog`] – the closed table of services the bridge can start.
//!
//! The set of entity names is fixed at compile time ([`KNOWN_ENTITIES`]);
//! only the factory behind each name varies.  A catalog is assembled once at
//! startup and never changes afterwards.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vsim_middleware::LoopbackTransport;
//! use vsim_services::ServiceCatalog;
//!
//! let catalog = ServiceCatalog::simulated(Arc::new(LoopbackTransport::default()));
//! assert!(catalog.construct("body.horn").is_ok());
//! assert!(catalog.construct("body.spoiler").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use vsim_middleware::TransportGateway;
use vsim_types::BridgeError;

use crate::service::ServiceHandle;
use crate::sim::SimService;

/// Every entity name a service can be started for.
pub const KNOWN_ENTITIES: [&str; 11] = [
    "chassis.braking",
    "body.cabin_climate",
    "chassis",
    "propulsion.engine",
    "vehicle.exterior",
    "example.hello_world",
    "body.horn",
    "body.mirrors",
    "chassis.suspension",
    "propulsion.transmission",
    "vehicle",
];

/// Builds a fresh service instance.
pub type ServiceFactory = Arc<dyn Fn() -> ServiceHandle + Send + Sync>;

/// Closed mapping from entity name to service factory.
#[derive(Default, Clone)]
pub struct ServiceCatalog {
    factories: HashMap<String, ServiceFactory>,
}

impl ServiceCatalog {
    /// Create a catalog with no factories.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Bind `entity` to `factory`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownEntity`] when `entity` is not one of
    /// [`KNOWN_ENTITIES`].
    pub fn with_factory<F>(mut self, entity: &str, factory: F) -> Result<Self, BridgeError>
    where
        F: Fn() -> ServiceHandle + Send + Sync + 'static,
    {
        if !Self::is_known(entity) {
            return Err(BridgeError::UnknownEntity(entity.to_string()));
        }
        self.factories.insert(entity.to_string(), Arc::new(factory));
        Ok(self)
    }

    /// Catalog binding every known entity to a [`SimService`] on `transport`.
    pub fn simulated(transport: Arc<dyn TransportGateway>) -> Self {
        let factories = KNOWN_ENTITIES
            .iter()
            .map(|entity| {
                let transport = Arc::clone(&transport);
                let name = entity.to_string();
                let factory: ServiceFactory = Arc::new(move || -> ServiceHandle {
                    Arc::new(SimService::new(name.clone(), Arc::clone(&transport)))
                });
                (entity.to_string(), factory)
            })
            .collect();
        Self { factories }
    }

    /// Build a new instance of the service bound to `entity`.
    pub fn construct(&self, entity: &str) -> Result<ServiceHandle, BridgeError> {
        self.factories
            .get(entity)
            .map(|factory| factory())
            .ok_or_else(|| BridgeError::UnknownEntity(entity.to_string()))
    }

    /// Entities that have a factory, in [`KNOWN_ENTITIES`] order.
    pub fn entities(&self) -> Vec<&'static str> {
        KNOWN_ENTITIES
            .iter()
            .copied()
            .filter(|e| self.factories.contains_key(*e))
            .collect()
    }

    /// `true` when `entity` is one of [`KNOWN_ENTITIES`].
    pub fn is_known(entity: &str) -> bool {
        KNOWN_ENTITIES.contains(&entity)
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("entities", &self.entities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockService;
    use async_trait::async_trait;
    use serde_json::Value;
    use vsim_middleware::LoopbackTransport;
    use vsim_types::TransportStatus;

    struct Inert(&'static str);

    #[async_trait]
    impl MockService for Inert {
        fn entity(&self) -> &str {
            self.0
        }
        async fn start(&self) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn publish(&self, _topic: &str, payload: Value) -> Result<(Value, TransportStatus), BridgeError> {
            Ok((payload, TransportStatus::ok()))
        }
    }

    #[test]
    fn factory_for_unknown_entity_is_rejected() {
        let result = ServiceCatalog::builder()
            .with_factory("body.spoiler", || -> ServiceHandle { Arc::new(Inert("body.spoiler")) });
        assert!(matches!(result, Err(BridgeError::UnknownEntity(name)) if name == "body.spoiler"));
    }

    #[test]
    fn construct_uses_bound_factory() {
        let catalog = ServiceCatalog::builder()
            .with_factory("body.horn", || -> ServiceHandle { Arc::new(Inert("body.horn")) })
            .unwrap();
        assert_eq!(catalog.construct("body.horn").unwrap().entity(), "body.horn");
        assert!(matches!(
            catalog.construct("vehicle"),
            Err(BridgeError::UnknownEntity(_))
        ));
        assert_eq!(catalog.entities(), vec!["body.horn"]);
    }

    #[test]
    fn simulated_catalog_covers_every_known_entity() {
        let catalog = ServiceCatalog::simulated(Arc::new(LoopbackTransport::default()));
        assert_eq!(catalog.entities(), KNOWN_ENTITIES.to_vec());
        for entity in KNOWN_ENTITIES {
            assert_eq!(catalog.construct(entity).unwrap().entity(), entity);
        }
    }

    #[test]
    fn construct_builds_fresh_instances() {
        let catalog = ServiceCatalog::simulated(Arc::new(LoopbackTransport::default()));
        let a = catalog.construct("chassis").unwrap();
        let b = catalog.construct("chassis").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
