//! Raw definition types: model descriptions and resource registration options.
//! Deserializable from JSON (`resources.json`) and constructible in code.

use serde::{Deserialize, Serialize};

/// Declared type of a model field as written in a definition.
///
/// Scalars are bare strings (`"int32"`, `"string"`, `"object_id"`, ...);
/// nested records are `{"object": <model>}` or `{"array": <model>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTypeConfig {
    Int8,
    Int16,
    Int32,
    #[serde(alias = "int")]
    Int64,
    Uint8,
    Uint16,
    Uint32,
    #[serde(alias = "uint")]
    Uint64,
    Float32,
    #[serde(alias = "float")]
    Float64,
    #[serde(alias = "boolean")]
    Bool,
    String,
    #[serde(alias = "objectid")]
    ObjectId,
    Decimal,
    #[serde(alias = "datetime")]
    Timestamp,
    Object(ModelDef),
    Array(ModelDef),
    /// Free-form JSON; stored and returned as-is, never filterable.
    Any,
}

/// One declared field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Logical name, e.g. `CompanyId`.
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldTypeConfig,
    /// Serialization key; defaults to snake_case(name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_key: Option<String>,
    /// Persistence key; defaults to snake_case(name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// `primary`, `filter` or `filter=<key>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Documentation only: marks the field required in request shapes.
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, type_: FieldTypeConfig) -> Self {
        FieldDef {
            name: name.into(),
            type_,
            wire_key: None,
            storage_key: None,
            capability: None,
            required: false,
        }
    }

    pub fn wire_key(mut self, key: impl Into<String>) -> Self {
        self.wire_key = Some(key.into());
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.capability = Some("primary".into());
        self
    }

    /// Filterable under its storage key.
    pub fn filter(mut self) -> Self {
        self.capability = Some("filter".into());
        self
    }

    /// Filterable, applied to the store under `key`.
    pub fn filter_as(mut self, key: impl Into<String>) -> Self {
        self.capability = Some(format!("filter={}", key.into()));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Record,
    Scalar,
    List,
}

/// A plain data-model description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn record(name: impl Into<String>) -> Self {
        ModelDef {
            name: name.into(),
            kind: ModelKind::Record,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

/// Implemented by host types that describe themselves as a model.
pub trait Model {
    fn definition() -> ModelDef;
}

fn default_true() -> bool {
    true
}

/// Feature flags of a registered resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceFlags {
    #[serde(default = "default_true")]
    pub allow_insert: bool,
    #[serde(default = "default_true")]
    pub allow_delete: bool,
    #[serde(default = "default_true")]
    pub allow_update: bool,
    #[serde(default = "default_true")]
    pub allow_get: bool,
    #[serde(default = "default_true")]
    pub allow_list: bool,
    #[serde(default)]
    pub soft_delete: bool,
    /// Default page size for list; service default when absent.
    #[serde(default)]
    pub response_limit: Option<u32>,
    /// Ignore the request `limit` parameter.
    #[serde(default)]
    pub limit_locked: bool,
    /// Synthesized endpoints skip the authorization callback.
    #[serde(default)]
    pub public: bool,
}

impl Default for ResourceFlags {
    fn default() -> Self {
        ResourceFlags {
            allow_insert: true,
            allow_delete: true,
            allow_update: true,
            allow_get: true,
            allow_list: true,
            soft_delete: false,
            response_limit: None,
            limit_locked: false,
            public: false,
        }
    }
}

/// `GET` aggregation reads its request shape from the query string, `POST` from the body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Path under the API root, e.g. `widget/avg`.
    pub path: String,
    #[serde(default)]
    pub method: AggregationMethod,
    pub response: ModelDef,
    #[serde(default)]
    pub request: Option<ModelDef>,
    /// Stages; `{"$param": "<field>"}` nodes are substituted per request.
    pub pipeline: Vec<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Everything needed to register one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub model: ModelDef,
    /// Storage collection; defaults to snake_case(model name).
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default, flatten)]
    pub flags: ResourceFlags,
    /// Extra filterable parameters for list.
    #[serde(default)]
    pub query_params: Option<ModelDef>,
    #[serde(default)]
    pub aggregations: Vec<AggregationConfig>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ResourceConfig {
    pub fn new(model: ModelDef) -> Self {
        ResourceConfig {
            model,
            collection: None,
            flags: ResourceFlags::default(),
            query_params: None,
            aggregations: Vec::new(),
            title: None,
            description: None,
        }
    }

    pub fn for_model<M: Model>() -> Self {
        Self::new(M::definition())
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn soft_delete(mut self, on: bool) -> Self {
        self.flags.soft_delete = on;
        self
    }

    pub fn response_limit(mut self, limit: u32) -> Self {
        self.flags.response_limit = Some(limit);
        self
    }

    pub fn limit_locked(mut self, locked: bool) -> Self {
        self.flags.limit_locked = locked;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.flags.public = public;
        self
    }

    pub fn query_params(mut self, model: ModelDef) -> Self {
        self.query_params = Some(model);
        self
    }

    pub fn aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregations.push(aggregation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_config_from_json_uses_defaults() {
        let raw = json!({
            "model": {
                "name": "PriceTimes",
                "fields": [
                    {"name": "Ticker", "type": "string", "capability": "filter"},
                    {"name": "Price", "type": "float"},
                    {"name": "Company", "type": {"object": {"name": "Company", "fields": [{"name": "Name", "type": "string"}]}}}
                ]
            },
            "soft_delete": true,
            "allow_delete": false
        });
        let cfg: ResourceConfig = serde_json::from_value(raw).unwrap();
        assert!(cfg.flags.soft_delete);
        assert!(!cfg.flags.allow_delete);
        assert!(cfg.flags.allow_list);
        assert_eq!(cfg.model.kind, ModelKind::Record);
        assert_eq!(cfg.model.fields[1].type_, FieldTypeConfig::Float64);
        assert!(matches!(cfg.model.fields[2].type_, FieldTypeConfig::Object(ref m) if m.name == "Company"));
    }
}
