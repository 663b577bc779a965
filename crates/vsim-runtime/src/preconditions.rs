//! [`PreconditionGate`] – environment checks run before any dispatch.
//!
//! Every [`Check`] is evaluated in registration order; the first failure
//! message is returned and the operation is **not** dispatched.
//!
//! Two built-in checks are provided:
//! - [`SupportedTransportCheck`] – the configured transport must be one of a
//!   known set.
//! - [`FnCheck`] – wraps a closure for ad-hoc conditions.
//!
//! # Example
//!
//! ```
//! use vsim_runtime::preconditions::{FnCheck, PreconditionGate, SupportedTransportCheck};
//!
//! let mut gate = PreconditionGate::new();
//! gate.add_check(Box::new(SupportedTransportCheck::new("ZENOH", ["ZENOH", "SOMEIP"])));
//! assert!(gate.verify_preconditions().is_ok());
//!
//! gate.add_check(Box::new(FnCheck::new("always_fails", || Err("broker offline".to_string()))));
//! assert_eq!(gate.verify_preconditions(), Err("broker offline".to_string()));
//! ```

use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Check trait
// ────────────────────────────────────────────────────────────────────────────

/// A single condition the environment must satisfy before dispatching.
pub trait Check: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// `Ok(())` when satisfied, otherwise the message shown to the user.
    fn verify(&self) -> Result<(), String>;
}

// ────────────────────────────────────────────────────────────────────────────
// PreconditionGate
// ────────────────────────────────────────────────────────────────────────────

/// Ordered set of [`Check`]s.
#[derive(Default)]
pub struct PreconditionGate {
    checks: Vec<Box<dyn Check>>,
}

impl PreconditionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new [`Check`].  Checks are evaluated in insertion order.
    pub fn add_check(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    /// Run every check; the first failure message is returned.
    pub fn verify_preconditions(&self) -> Result<(), String> {
        for check in &self.checks {
            if let Err(message) = check.verify() {
                warn!(check = check.name(), %message, "precondition failed");
                return Err(message);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in checks
// ────────────────────────────────────────────────────────────────────────────

/// Rejects dispatch when the transport name is not in the supported set.
/// Names compare case-insensitively.
pub struct SupportedTransportCheck {
    transport_name: String,
    supported: Vec<String>,
}

impl SupportedTransportCheck {
    pub fn new<I, S>(transport_name: impl Into<String>, supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transport_name: transport_name.into(),
            supported: supported.into_iter().map(Into::into).collect(),
        }
    }
}

impl Check for SupportedTransportCheck {
    fn name(&self) -> &str {
        "supported_transport"
    }

    fn verify(&self) -> Result<(), String> {
        if self
            .supported
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.transport_name))
        {
            Ok(())
        } else {
            Err(format!(
                "Transport {} is not supported. Supported transports: {}",
                self.transport_name,
                self.supported.join(", ")
            ))
        }
    }
}

/// A [`Check`] backed by a closure.
pub struct FnCheck {
    name: String,
    check: Box<dyn Fn() -> Result<(), String> + Send + Sync>,
}

impl FnCheck {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl Check for FnCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn verify(&self) -> Result<(), String> {
        (self.check)()
    }
}
