//! Schema/type resolution.
//!
//! The dispatch core never knows message layouts.  It asks a
//! [`SchemaResolver`] which type a method takes and returns, where a method
//! lives, which type a topic carries, and how to move between value trees and
//! [`Envelope`]s.
//!
//! Two resolvers ship with the crate:
//!
//! | Resolver | Source of truth |
//! |---|---|
//! | [`SchemaCatalog`] | A TOML document listing services, methods, types and topics. |
//! | [`OpenSchema`] | Nothing; type names are derived from service, method and topic names. |
//!
//! # Catalog format
//!
//! ```toml
//! [services."body.cabin_climate"]
//! version = 1
//! [services."body.cabin_climate".methods.UpdateCabinClimate]
//! request = "example.v1.UpdateRequest"
//! response = "example.v1.UpdateResponse"
//!
//! [types."example.v1.UpdateRequest"]
//! fields = ["zone", "temperature", "update_mask"]
//!
//! [topics."up:/body.cabin_climate/1/climate#Zone"]
//! type = "example.v1.Zone"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use vsim_types::{BridgeError, Envelope, UUri, uri::SCHEME_PREFIX};

/// Resolves message types and addresses for the dispatchers.
pub trait SchemaResolver: Send + Sync {
    /// Request type of `method` on `service`, `None` when unknown.
    fn request_type(&self, service: &str, method: &str) -> Option<String>;

    /// Response type of `method` on `service`, `None` when unknown.
    fn response_type(&self, service: &str, method: &str) -> Option<String>;

    /// Long-form address of `method` on `service` at `version`.
    fn method_address(&self, service: &str, method: &str, version: u32) -> Result<String, BridgeError>;

    /// Message type carried by `topic`, `None` when unknown.
    fn topic_type(&self, topic: &str) -> Option<String>;

    /// Build a typed message of `type_name` from a JSON tree.
    fn populate(&self, type_name: &str, json: &Value) -> Result<Value, BridgeError>;

    /// Encode a typed message.
    fn encode(&self, type_name: &str, value: &Value) -> Result<Envelope, BridgeError> {
        Envelope::pack(type_name, value)
    }

    /// Decode `envelope` as `type_name` into a normalized value tree.
    fn decode(&self, type_name: &str, envelope: &Envelope) -> Result<Value, BridgeError>;
}

/// Decode `envelope`, accepting untyped payloads and payloads tagged with
/// `type_name`.
fn decode_checked(type_name: &str, envelope: &Envelope) -> Result<Value, BridgeError> {
    match envelope.type_name() {
        Some(actual) if actual != type_name => Err(BridgeError::Mapping(format!(
            "expected a {type_name} payload, got {actual}"
        ))),
        _ => envelope.to_json(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SchemaCatalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ServiceSchema {
    /// Entity name in method addresses; defaults to the service key.
    entity: Option<String>,
    #[serde(default)]
    methods: HashMap<String, MethodSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct MethodSchema {
    request: String,
    response: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TypeSchema {
    /// Allowed top-level fields; any field is accepted when absent.
    fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopicSchema {
    #[serde(rename = "type")]
    type_name: String,
}

/// A [`SchemaResolver`] loaded from a TOML document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    services: HashMap<String, ServiceSchema>,
    #[serde(default)]
    types: HashMap<String, TypeSchema>,
    #[serde(default)]
    topics: HashMap<String, TopicSchema>,
}

impl SchemaCatalog {
    /// Parse a catalog from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, BridgeError> {
        toml::from_str(text).map_err(|e| BridgeError::Serialization(format!("schema catalog: {e}")))
    }

    /// Read and parse the catalog at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Serialization(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn method(&self, service: &str, method: &str) -> Option<&MethodSchema> {
        self.services.get(service)?.methods.get(method)
    }

    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaResolver for SchemaCatalog {
    fn request_type(&self, service: &str, method: &str) -> Option<String> {
        self.method(service, method).map(|m| m.request.clone())
    }

    fn response_type(&self, service: &str, method: &str) -> Option<String> {
        self.method(service, method).map(|m| m.response.clone())
    }

    fn method_address(&self, service: &str, method: &str, version: u32) -> Result<String, BridgeError> {
        let schema = self
            .services
            .get(service)
            .filter(|s| s.methods.contains_key(method))
            .ok_or_else(|| BridgeError::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            })?;
        let entity = schema.entity.as_deref().unwrap_or(service);
        Ok(UUri::method(entity, version, method).to_string())
    }

    fn topic_type(&self, topic: &str) -> Option<String> {
        let bare = topic.strip_prefix(SCHEME_PREFIX).unwrap_or(topic);
        self.topics
            .get(topic)
            .or_else(|| self.topics.get(bare))
            .or_else(|| self.topics.get(&format!("{SCHEME_PREFIX}{bare}")))
            .map(|t| t.type_name.clone())
    }

    fn populate(&self, type_name: &str, json: &Value) -> Result<Value, BridgeError> {
        let Some(allowed) = self.types.get(type_name).and_then(|t| t.fields.as_ref()) else {
            return Ok(json.clone());
        };
        let Value::Object(fields) = json else {
            return Err(BridgeError::Mapping(format!(
                "{type_name} expects an object, got {json}"
            )));
        };
        if let Some(unknown) = fields.keys().find(|k| !allowed.contains(k)) {
            return Err(BridgeError::Mapping(format!(
                "{type_name} has no field named {unknown}"
            )));
        }
        Ok(json.clone())
    }

    fn decode(&self, type_name: &str, envelope: &Envelope) -> Result<Value, BridgeError> {
        decode_checked(type_name, envelope)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenSchema
// ─────────────────────────────────────────────────────────────────────────────

/// A [`SchemaResolver`] that resolves every method and topic by naming
/// convention.
///
/// | Query | Answer |
/// |---|---|
/// | request type | `<service>.<Method>Request` |
/// | response type | `<service>.<Method>Response` |
/// | method address | `/<service>/<version>/rpc.<Method>` |
/// | topic type | the part of the resource after `#` |
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSchema;

impl SchemaResolver for OpenSchema {
    fn request_type(&self, service: &str, method: &str) -> Option<String> {
        Some(format!("{service}.{method}Request"))
    }

    fn response_type(&self, service: &str, method: &str) -> Option<String> {
        Some(format!("{service}.{method}Response"))
    }

    fn method_address(&self, service: &str, method: &str, version: u32) -> Result<String, BridgeError> {
        Ok(UUri::method(service, version, method).to_string())
    }

    fn topic_type(&self, topic: &str) -> Option<String> {
        let uri: UUri = topic.parse().ok()?;
        uri.resource
            .split_once('#')
            .map(|(_, message)| message.to_string())
            .filter(|m| !m.is_empty())
    }

    fn populate(&self, _type_name: &str, json: &Value) -> Result<Value, BridgeError> {
        Ok(json.clone())
    }

    fn decode(&self, type_name: &str, envelope: &Envelope) -> Result<Value, BridgeError> {
        decode_checked(type_name, envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG: &str = r#"
        [services."body.cabin_climate"]
        [services."body.cabin_climate".methods.UpdateCabinClimate]
        request = "example.v1.UpdateRequest"
        response = "example.v1.UpdateResponse"

        [services.hello]
        entity = "example.hello_world"
        [services.hello.methods.SayHello]
        request = "example.v1.HelloRequest"
        response = "example.v1.HelloResponse"

        [types."example.v1.UpdateRequest"]
        fields = ["zone", "temperature", "update_mask"]

        [topics."up:/body.cabin_climate/1/climate#Zone"]
        type = "example.v1.Zone"
    "#;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_toml_str(CATALOG).unwrap()
    }

    #[test]
    fn resolves_method_types_and_address() {
        let catalog = catalog();
        assert_eq!(
            catalog.request_type("body.cabin_climate", "UpdateCabinClimate").as_deref(),
            Some("example.v1.UpdateRequest")
        );
        assert_eq!(
            catalog.response_type("body.cabin_climate", "UpdateCabinClimate").as_deref(),
            Some("example.v1.UpdateResponse")
        );
        assert_eq!(
            catalog.method_address("body.cabin_climate", "UpdateCabinClimate", 1).unwrap(),
            "/body.cabin_climate/1/rpc.UpdateCabinClimate"
        );
        assert_eq!(catalog.service_names(), vec!["body.cabin_climate", "hello"]);
    }

    #[test]
    fn entity_override_is_used_in_address() {
        assert_eq!(
            catalog().method_address("hello", "SayHello", 1).unwrap(),
            "/example.hello_world/1/rpc.SayHello"
        );
    }

    #[test]
    fn unknown_method_is_unresolved() {
        let catalog = catalog();
        assert_eq!(catalog.request_type("body.cabin_climate", "Teleport"), None);
        assert!(matches!(
            catalog.method_address("body.cabin_climate", "Teleport", 1),
            Err(BridgeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn topic_lookup_ignores_scheme_prefix() {
        let catalog = catalog();
        assert_eq!(
            catalog.topic_type("/body.cabin_climate/1/climate#Zone").as_deref(),
            Some("example.v1.Zone")
        );
        assert_eq!(
            catalog.topic_type("up:/body.cabin_climate/1/climate#Zone").as_deref(),
            Some("example.v1.Zone")
        );
        assert_eq!(catalog.topic_type("up:/body.horn/1/horn#Status"), None);
    }

    #[test]
    fn populate_rejects_unknown_fields() {
        let catalog = catalog();
        assert!(catalog
            .populate("example.v1.UpdateRequest", &json!({"zone": "driver", "temperature": 21}))
            .is_ok());
        let err = catalog
            .populate("example.v1.UpdateRequest", &json!({"humidity": 40}))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Mapping(ref m) if m.contains("humidity")));
        // Types without a field list accept anything.
        assert!(catalog.populate("example.v1.Zone", &json!({"x": 1})).is_ok());
    }

    #[test]
    fn decode_accepts_untyped_and_matching_payloads() {
        let catalog = catalog();
        let value = json!({"status": {"code": 0}});
        let untyped = Envelope::untyped(&value).unwrap();
        let typed = Envelope::pack("example.v1.UpdateResponse", &value).unwrap();
        let other = Envelope::pack("example.v1.Zone", &value).unwrap();

        assert_eq!(catalog.decode("example.v1.UpdateResponse", &untyped).unwrap(), value);
        assert_eq!(catalog.decode("example.v1.UpdateResponse", &typed).unwrap(), value);
        assert!(matches!(
            catalog.decode("example.v1.UpdateResponse", &other),
            Err(BridgeError::Mapping(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.toml");
        std::fs::write(&path, CATALOG).unwrap();
        assert!(SchemaCatalog::load(&path).is_ok());
        assert!(SchemaCatalog::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn malformed_catalog_is_rejected() {
        assert!(matches!(
            SchemaCatalog::from_toml_str("[services.x.methods.Y]\nrequest = 1"),
            Err(BridgeError::Serialization(_))
        ));
    }

    #[test]
    fn open_schema_derives_names() {
        let schema = OpenSchema;
        assert_eq!(
            schema.request_type("body.horn", "ActivateHorn").as_deref(),
            Some("body.horn.ActivateHornRequest")
        );
        assert_eq!(
            schema.method_address("body.horn", "ActivateHorn", 1).unwrap(),
            "/body.horn/1/rpc.ActivateHorn"
        );
        assert_eq!(
            schema.topic_type("up:/body.horn/1/horn#Status").as_deref(),
            Some("Status")
        );
        assert_eq!(schema.topic_type("up:/body.horn/1/horn"), None);
    }
}
