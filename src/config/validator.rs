//! Registration-time validation across a set of resource definitions.

use std::collections::HashSet;

use crate::case::to_snake_case;
use crate::config::{AggregationMethod, ResourceConfig};
use crate::descriptor::normalize_route_path;
use crate::error::ConfigError;

pub fn validate(resources: &[ResourceConfig]) -> Result<(), ConfigError> {
    let mut paths = HashSet::new();
    let mut collections = HashSet::new();
    let mut aggregations = HashSet::new();

    for r in resources {
        let path = to_snake_case(&r.model.name);
        if path.is_empty() {
            return Err(ConfigError::Validation("model name must not be empty".into()));
        }
        if !paths.insert(path.clone()) {
            return Err(ConfigError::DuplicatePath(path));
        }
        let collection = r.collection.clone().unwrap_or(path);
        if !collections.insert(collection.clone()) {
            return Err(ConfigError::Validation(format!(
                "collection '{}' used by more than one resource",
                collection
            )));
        }
        if r.flags.response_limit == Some(0) {
            return Err(ConfigError::Validation(format!(
                "resource '{}': response_limit must be positive",
                r.model.name
            )));
        }
        for a in &r.aggregations {
            let method = match a.method {
                AggregationMethod::Get => "GET",
                AggregationMethod::Post => "POST",
            };
            let key = format!("{} {}", method, normalize_route_path(&a.path));
            if !aggregations.insert(key.clone()) {
                return Err(ConfigError::DuplicatePath(key));
            }
        }
    }
    Ok(())
}
