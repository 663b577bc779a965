//! [`UUri`] – long-form addresses of methods and topics.
//!
//! The long form is `//authority/entity/version/resource`, with the
//! authority part optional (`/entity/version/resource`).  A leading `up:`
//! scheme is accepted and dropped.  Method resources are spelled
//! `rpc.<Method>`; topic resources are `<name>#<Message>`.
//!
//! ```
//! use vsim_types::UUri;
//!
//! let uri: UUri = "/body.cabin_climate/1/rpc.UpdateCabinClimate".parse().unwrap();
//! assert_eq!(uri.entity, "body.cabin_climate");
//! assert!(uri.is_method());
//! assert_eq!(uri.to_string(), "/body.cabin_climate/1/rpc.UpdateCabinClimate");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Scheme prefix that may precede a long-form URI.
pub const SCHEME_PREFIX: &str = "up:";

const METHOD_PREFIX: &str = "rpc.";

/// A parsed long-form resource address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UUri {
    /// Remote authority, `None` for local addresses.
    pub authority: Option<String>,
    pub entity: String,
    pub version: u32,
    pub resource: String,
}

impl UUri {
    /// Address of `method` on `entity`.
    pub fn method(entity: impl Into<String>, version: u32, method: &str) -> Self {
        Self {
            authority: None,
            entity: entity.into(),
            version,
            resource: format!("{METHOD_PREFIX}{method}"),
        }
    }

    /// `true` when the resource names an RPC method.
    pub fn is_method(&self) -> bool {
        self.resource.starts_with(METHOD_PREFIX)
    }

    /// Method name without the `rpc.` prefix, for method addresses.
    pub fn method_name(&self) -> Option<&str> {
        self.resource.strip_prefix(METHOD_PREFIX)
    }
}

impl FromStr for UUri {
    type Err = BridgeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidUri(raw.to_string());

        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(SCHEME_PREFIX).unwrap_or(trimmed);

        let (authority, path) = if let Some(rest) = body.strip_prefix("//") {
            let (authority, path) = rest.split_once('/').ok_or_else(invalid)?;
            if authority.is_empty() {
                return Err(invalid());
            }
            (Some(authority.to_string()), path)
        } else {
            (None, body.strip_prefix('/').ok_or_else(invalid)?)
        };

        let mut parts = path.splitn(3, '/');
        let entity = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let version = parts
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let resource = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            authority,
            entity: entity.to_string(),
            version,
            resource: resource.to_string(),
        })
    }
}

impl fmt::Display for UUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(authority) = &self.authority {
            write!(f, "//{authority}")?;
        }
        write!(f, "/{}/{}/{}", self.entity, self.version, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_topic() {
        let uri: UUri = "/body.cabin_climate/1/climate#Zone".parse().unwrap();
        assert_eq!(uri.authority, None);
        assert_eq!(uri.entity, "body.cabin_climate");
        assert_eq!(uri.version, 1);
        assert_eq!(uri.resource, "climate#Zone");
        assert!(!uri.is_method());
    }

    #[test]
    fn parses_remote_method_with_scheme() {
        let uri: UUri = "up://vcu.vin/chassis.braking/1/rpc.ManageHealthMonitoring"
            .parse()
            .unwrap();
        assert_eq!(uri.authority.as_deref(), Some("vcu.vin"));
        assert_eq!(uri.method_name(), Some("ManageHealthMonitoring"));
        assert_eq!(
            uri.to_string(),
            "//vcu.vin/chassis.braking/1/rpc.ManageHealthMonitoring"
        );
    }

    #[test]
    fn method_constructor_round_trips_through_display() {
        let uri = UUri::method("example.hello_world", 1, "SayHello");
        let parsed: UUri = uri.to_string().parse().unwrap();
        assert_eq!(parsed, uri);
    }

    #[test]
    fn rejects_malformed_uris() {
        for raw in [
            "",
            "body.horn/1/rpc.Honk",
            "/body.horn",
            "/body.horn/one/rpc.Honk",
            "/body.horn/1/",
            "///body.horn/1/rpc.Honk",
        ] {
            assert!(
                matches!(raw.parse::<UUri>(), Err(BridgeError::InvalidUri(_))),
                "expected '{raw}' to be rejected"
            );
        }
    }
}
