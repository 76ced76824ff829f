//! Field descriptors: the normalized per-field metadata every other component reads.

use std::collections::HashSet;
use std::sync::Arc;

use crate::case::to_snake_case;
use crate::config::{FieldDef, FieldTypeConfig, ModelDef, ModelKind};
use crate::error::ConfigError;

/// Storage key of the identity field.
pub const ID_KEY: &str = "_id";
/// Wire key of the identity field.
pub const ID_WIRE_KEY: &str = "id";
/// Storage key of the synthesized soft-delete flag.
pub const DELETED_KEY: &str = "is_deleted";

/// Resolved semantic type of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    ObjectId,
    Decimal,
    Timestamp,
    Any,
    Object(Arc<ModelShape>),
    Array(Arc<ModelShape>),
}

impl FieldType {
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    pub fn nested_shape(&self) -> Option<&Arc<ModelShape>> {
        match self {
            FieldType::Object(shape) | FieldType::Array(shape) => Some(shape),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    None,
    Primary,
    /// Filterable; request parameters under the wire key constrain `filter_key` in the store.
    Filterable { filter_key: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// `None` when the field never appears on the wire.
    pub wire_key: Option<String>,
    pub storage_key: String,
    pub field_type: FieldType,
    pub capability: Capability,
    pub required: bool,
    /// Added by the builder rather than declared by the model.
    pub synthesized: bool,
}

impl FieldDescriptor {
    pub fn is_primary(&self) -> bool {
        self.capability == Capability::Primary
    }

    pub fn filter_key(&self) -> Option<&str> {
        match &self.capability {
            Capability::Filterable { filter_key } => Some(filter_key),
            _ => None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.storage_key == ID_KEY
    }
}

/// A named, ordered field set. Top-level resources and nested records share this shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelShape {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelShape {
    pub fn field_by_wire_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.wire_key.as_deref() == Some(key))
    }

    pub fn field_by_storage_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_key == key)
    }

    pub fn primary(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_primary())
    }

    pub fn identity(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_identity())
    }

    /// Fields visible on the wire, in declaration order.
    pub fn wire_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.wire_key.is_some())
    }
}

fn parse_capability(field: &FieldDef, storage_key: &str) -> Result<Capability, ConfigError> {
    let tag = match field.capability.as_deref().map(str::trim) {
        None | Some("") => return Ok(Capability::None),
        Some(tag) => tag,
    };
    if tag == "primary" {
        return Ok(Capability::Primary);
    }
    if tag == "filter" {
        return Ok(Capability::Filterable {
            filter_key: storage_key.to_string(),
        });
    }
    if let Some(key) = tag.strip_prefix("filter=") {
        let key = key.trim();
        if !key.is_empty() {
            return Ok(Capability::Filterable {
                filter_key: key.to_string(),
            });
        }
    }
    Err(ConfigError::InvalidCapability {
        field: field.name.clone(),
        tag: tag.to_string(),
    })
}

fn resolve_type(ty: &FieldTypeConfig) -> Result<FieldType, ConfigError> {
    Ok(match ty {
        FieldTypeConfig::Int8 => FieldType::Int8,
        FieldTypeConfig::Int16 => FieldType::Int16,
        FieldTypeConfig::Int32 => FieldType::Int32,
        FieldTypeConfig::Int64 => FieldType::Int64,
        FieldTypeConfig::Uint8 => FieldType::UInt8,
        FieldTypeConfig::Uint16 => FieldType::UInt16,
        FieldTypeConfig::Uint32 => FieldType::UInt32,
        FieldTypeConfig::Uint64 => FieldType::UInt64,
        FieldTypeConfig::Float32 => FieldType::Float32,
        FieldTypeConfig::Float64 => FieldType::Float64,
        FieldTypeConfig::Bool => FieldType::Bool,
        FieldTypeConfig::String => FieldType::String,
        FieldTypeConfig::ObjectId => FieldType::ObjectId,
        FieldTypeConfig::Decimal => FieldType::Decimal,
        FieldTypeConfig::Timestamp => FieldType::Timestamp,
        FieldTypeConfig::Any => FieldType::Any,
        FieldTypeConfig::Object(def) => FieldType::Object(Arc::new(build_shape(def)?)),
        FieldTypeConfig::Array(def) => FieldType::Array(Arc::new(build_shape(def)?)),
    })
}

fn describe(field: &FieldDef) -> Result<FieldDescriptor, ConfigError> {
    let snake = to_snake_case(&field.name);
    let is_id = snake == ID_WIRE_KEY;
    let wire_key = match field.wire_key.as_deref() {
        Some("-") => None,
        Some(key) => Some(key.to_string()),
        None => Some(snake.clone()),
    };
    let storage_key = match field.storage_key.as_deref() {
        Some(key) => key.to_string(),
        None if is_id => ID_KEY.to_string(),
        None => snake,
    };
    let capability = parse_capability(field, &storage_key)?;
    Ok(FieldDescriptor {
        name: field.name.clone(),
        wire_key,
        storage_key,
        field_type: resolve_type(&field.type_)?,
        capability,
        required: field.required,
        synthesized: false,
    })
}

fn check_unique(model: &str, fields: &[FieldDescriptor]) -> Result<(), ConfigError> {
    let mut wire = HashSet::new();
    let mut storage = HashSet::new();
    let mut primary: Option<&str> = None;
    for f in fields {
        if let Some(key) = &f.wire_key {
            if !wire.insert(key.as_str()) {
                return Err(ConfigError::DuplicateKey {
                    model: model.to_string(),
                    kind: "wire",
                    key: key.clone(),
                });
            }
        }
        if !storage.insert(f.storage_key.as_str()) {
            return Err(ConfigError::DuplicateKey {
                model: model.to_string(),
                kind: "storage",
                key: f.storage_key.clone(),
            });
        }
        if f.is_primary() {
            if let Some(first) = primary {
                return Err(ConfigError::MultiplePrimary {
                    model: model.to_string(),
                    first: first.to_string(),
                    second: f.name.clone(),
                });
            }
            primary = Some(&f.name);
        }
    }
    Ok(())
}

/// Normalize a model definition into a shape without synthesized fields.
/// Used for nested records, query-parameter models and custom endpoint shapes.
pub fn build_shape(def: &ModelDef) -> Result<ModelShape, ConfigError> {
    if def.kind != ModelKind::Record {
        return Err(ConfigError::NotARecord {
            model: def.name.clone(),
        });
    }
    let fields = def
        .fields
        .iter()
        .map(describe)
        .collect::<Result<Vec<_>, _>>()?;
    check_unique(&def.name, &fields)?;
    Ok(ModelShape {
        name: def.name.clone(),
        fields,
    })
}

/// Build the full field set of a resource model: declared fields in declaration order,
/// then a synthesized identity (when none is declared) and soft-delete flag (when enabled
/// and not declared).
pub fn build_resource_shape(def: &ModelDef, soft_delete: bool) -> Result<ModelShape, ConfigError> {
    let mut shape = build_shape(def)?;
    let has_primary = shape.fields.iter().any(|f| f.is_primary());

    match shape.fields.iter_mut().find(|f| f.is_identity()) {
        Some(id) => {
            if !has_primary {
                id.capability = Capability::Primary;
            }
        }
        None => shape.fields.push(FieldDescriptor {
            name: "Id".into(),
            wire_key: Some(ID_WIRE_KEY.into()),
            storage_key: ID_KEY.into(),
            field_type: FieldType::ObjectId,
            capability: if has_primary {
                Capability::None
            } else {
                Capability::Primary
            },
            required: false,
            synthesized: true,
        }),
    }

    if soft_delete && shape.field_by_storage_key(DELETED_KEY).is_none() {
        shape.fields.push(FieldDescriptor {
            name: "IsDeleted".into(),
            wire_key: None,
            storage_key: DELETED_KEY.into(),
            field_type: FieldType::Bool,
            capability: Capability::None,
            required: false,
            synthesized: true,
        });
    }

    check_unique(&def.name, &shape.fields)?;
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDef, FieldTypeConfig as T, ModelDef};

    fn price_times() -> ModelDef {
        ModelDef::record("PriceTimes")
            .field(FieldDef::new("Ticker", T::String).filter())
            .field(FieldDef::new("CompanyID", T::ObjectId).filter_as("company"))
            .field(FieldDef::new("Price", T::Decimal))
    }

    #[test]
    fn declared_fields_keep_order_and_identity_is_appended() {
        let shape = build_resource_shape(&price_times(), false).unwrap();
        let keys: Vec<_> = shape.fields.iter().map(|f| f.storage_key.as_str()).collect();
        assert_eq!(keys, vec!["ticker", "company_id", "price", "_id"]);
        let id = shape.identity().unwrap();
        assert!(id.synthesized);
        assert!(id.is_primary());
        assert_eq!(id.wire_key.as_deref(), Some("id"));
        assert_eq!(shape.fields[1].filter_key(), Some("company"));
        assert_eq!(shape.fields[0].filter_key(), Some("ticker"));
    }

    #[test]
    fn soft_delete_flag_is_hidden_and_appended_last() {
        let shape = build_resource_shape(&price_times(), true).unwrap();
        let last = shape.fields.last().unwrap();
        assert_eq!(last.storage_key, DELETED_KEY);
        assert_eq!(last.wire_key, None);
        assert_eq!(shape.wire_fields().count(), 4);
    }

    #[test]
    fn declared_deletion_flag_is_not_duplicated() {
        let def = price_times().field(FieldDef::new("IsDeleted", T::Bool));
        let shape = build_resource_shape(&def, true).unwrap();
        assert_eq!(
            shape.fields.iter().filter(|f| f.storage_key == DELETED_KEY).count(),
            1
        );
        assert!(!shape.field_by_storage_key(DELETED_KEY).unwrap().synthesized);
    }

    #[test]
    fn declared_id_becomes_identity() {
        let def = ModelDef::record("Widget")
            .field(FieldDef::new("Id", T::ObjectId))
            .field(FieldDef::new("Name", T::String));
        let shape = build_resource_shape(&def, false).unwrap();
        assert_eq!(shape.fields.len(), 2);
        assert_eq!(shape.fields[0].storage_key, ID_KEY);
        assert!(shape.fields[0].is_primary());
    }

    #[test]
    fn explicit_primary_wins_over_identity() {
        let def = ModelDef::record("Ticker")
            .field(FieldDef::new("Symbol", T::String).primary());
        let shape = build_resource_shape(&def, false).unwrap();
        assert_eq!(shape.primary().unwrap().name, "Symbol");
        assert_eq!(shape.fields.iter().filter(|f| f.is_primary()).count(), 1);
        assert!(!shape.identity().unwrap().is_primary());
    }

    #[test]
    fn building_twice_is_identical() {
        let a = build_resource_shape(&price_times(), true).unwrap();
        let b = build_resource_shape(&price_times(), true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_record_and_bad_definitions() {
        let mut scalar = ModelDef::record("Count");
        scalar.kind = ModelKind::Scalar;
        assert!(matches!(
            build_resource_shape(&scalar, false),
            Err(ConfigError::NotARecord { .. })
        ));

        let dup = ModelDef::record("Dup")
            .field(FieldDef::new("Name", T::String))
            .field(FieldDef::new("Label", T::String).wire_key("name"));
        assert!(matches!(
            build_resource_shape(&dup, false),
            Err(ConfigError::DuplicateKey { kind: "wire", .. })
        ));

        let two = ModelDef::record("Two")
            .field(FieldDef::new("A", T::String).primary())
            .field(FieldDef::new("B", T::String).primary());
        assert!(matches!(
            build_resource_shape(&two, false),
            Err(ConfigError::MultiplePrimary { .. })
        ));

        let mut bad = FieldDef::new("C", T::String);
        bad.capability = Some("index".into());
        assert!(matches!(
            build_shape(&ModelDef::record("Bad").field(bad)),
            Err(ConfigError::InvalidCapability { .. })
        ));
    }

    #[test]
    fn nested_records_resolve_recursively() {
        let company = ModelDef::record("Company").field(FieldDef::new("Name", T::String));
        let def = ModelDef::record("Stock")
            .field(FieldDef::new("Company", T::Object(company.clone())))
            .field(FieldDef::new("History", T::Array(company)));
        let shape = build_resource_shape(&def, false).unwrap();
        let nested = shape.fields[0].field_type.nested_shape().unwrap();
        assert_eq!(nested.name, "Company");
        assert_eq!(nested.fields[0].wire_key.as_deref(), Some("name"));
        assert!(nested.identity().is_none());
    }
}
