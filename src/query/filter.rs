//! Query filters built per request from typed constraints.

use std::collections::HashMap;

use serde_json::Value;

use super::coerce::coerce;
use super::value::TypedValue;
use crate::descriptor::{ResourceDescriptor, DELETED_KEY};
use crate::store::Document;

/// Ordered key -> typed value constraints, plus additional constraints ANDed at the top level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryFilter {
    entries: Vec<(String, TypedValue)>,
    and: Vec<QueryFilter>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality on one key; `with("owner", "u1")`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.set(key, value.into());
        self
    }

    /// Set `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: TypedValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.and.is_empty()
    }

    /// Add `other` as an additional constraint. Keys already set here are untouched.
    pub fn merge_supplemental(&mut self, other: QueryFilter) {
        if !other.is_empty() {
            self.and.push(other);
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc: Document = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        if !self.and.is_empty() {
            doc.insert(
                "$and".into(),
                Value::Array(
                    self.and
                        .iter()
                        .map(|f| Value::Object(f.to_document()))
                        .collect(),
                ),
            );
        }
        doc
    }
}

/// Build the filter for a list or single-item read.
///
/// Soft-delete exclusion goes first, then `base`, then every filterable field whose wire key
/// appears in `params` and coerces to a value. Undeclared or malformed parameters are skipped.
pub fn build_filter(
    params: &HashMap<String, String>,
    resource: &ResourceDescriptor,
    base: QueryFilter,
) -> QueryFilter {
    let mut filter = QueryFilter::new();
    if resource.flags.soft_delete {
        filter.set(DELETED_KEY, TypedValue::Bool(false));
    }
    let QueryFilter { entries, and } = base;
    for (k, v) in entries {
        filter.set(k, v);
    }
    filter.and.extend(and);

    for field in resource.filterable_fields() {
        let (Some(wire), Some(filter_key)) = (field.wire_key.as_deref(), field.filter_key()) else {
            continue;
        };
        let Some(raw) = params.get(wire) else {
            continue;
        };
        match coerce(raw, &field.field_type) {
            Some(value) => filter.set(filter_key, value),
            None => tracing::debug!(param = wire, "filter parameter did not coerce; skipped"),
        }
    }
    filter
}
