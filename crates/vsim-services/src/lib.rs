//! `vsim-services` – mock vehicle subsystem services and their lifecycle.
//!
//! # Modules
//!
//! - [`service`] – [`MockService`], the contract every simulated subsystem
//!   implements.
//! - [`catalog`] – [`ServiceCatalog`], the closed table of known entities and
//!   the factories that build them.
//! - [`registry`] – [`ServiceRegistry`], start/stop/lookup of running
//!   services.
//! - [`sim`] – [`SimService`], a generic stateful service that answers every
//!   method of its entity over a [`TransportGateway`][vsim_middleware::TransportGateway].

pub mod catalog;
pub mod registry;
pub mod service;
pub mod sim;

pub use catalog::{KNOWN_ENTITIES, ServiceCatalog, ServiceFactory};
pub use registry::ServiceRegistry;
pub use service::{MockService, ServiceHandle};
pub use sim::SimService;
