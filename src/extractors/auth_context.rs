//! Per-request authorization context left by the gate for downstream handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::descriptor::EndpointDescriptor;
use crate::query::QueryFilter;

/// Resolved endpoint, supplemental filter and public verdict for one request.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationContext {
    pub endpoint: Option<Arc<EndpointDescriptor>>,
    /// Constraint returned by the authorizer, ANDed into every filtered store call.
    pub filter: Option<QueryFilter>,
    pub public: bool,
}

impl AuthorizationContext {
    pub fn supplemental_filter(&self) -> QueryFilter {
        self.filter.clone().unwrap_or_default()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthorizationContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthorizationContext>()
            .cloned()
            .unwrap_or_default())
    }
}
