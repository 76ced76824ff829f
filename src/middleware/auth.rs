//! Authorization gate.
//!
//! For every request under the API root the gate resolves the serving endpoint, lets public
//! endpoints through, and otherwise asks the installed [`Authorizer`] for a supplemental
//! filter. The outcome is left in the request extensions as an [`AuthorizationContext`].

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::UnresolvedRoutes;
use crate::descriptor::{EndpointDescriptor, API_ROOT};
use crate::error::AppError;
use crate::extractors::AuthorizationContext;
use crate::query::QueryFilter;
use crate::state::AppState;

pub const ENDPOINT_NAME_HEADER: &str = "x-endpoint-name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// Rendered as 401.
    Unauthenticated(String),
    /// Rendered as 403.
    Forbidden(String),
}

impl From<AuthRejection> for AppError {
    fn from(rejection: AuthRejection) -> Self {
        let (status, message, detail) = match rejection {
            AuthRejection::Unauthenticated(detail) => (StatusCode::UNAUTHORIZED, "Unauthorized", detail),
            AuthRejection::Forbidden(detail) => (StatusCode::FORBIDDEN, "Forbidden", detail),
        };
        AppError::Unauthorized {
            status,
            message: message.into(),
            detail,
        }
    }
}

/// Host-supplied authorization callback. Called once per request to a non-public endpoint;
/// the returned filter is ANDed into every store query the handler issues.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        parts: &Parts,
        endpoint: &EndpointDescriptor,
    ) -> Result<QueryFilter, AuthRejection>;
}

#[async_trait]
impl<F> Authorizer for F
where
    F: Fn(&Parts, &EndpointDescriptor) -> Result<QueryFilter, AuthRejection> + Send + Sync,
{
    async fn authorize(
        &self,
        parts: &Parts,
        endpoint: &EndpointDescriptor,
    ) -> Result<QueryFilter, AuthRejection> {
        self(parts, endpoint)
    }
}

fn is_api_path(path: &str) -> bool {
    path == API_ROOT
        || path
            .strip_prefix(API_ROOT)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub async fn authorization_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !is_api_path(&path) {
        return next.run(req).await;
    }

    let Some(endpoint) = state.registry.resolve_by_route(req.method(), &path) else {
        if state.authorizer.is_some() && state.config.unresolved_routes == UnresolvedRoutes::Deny {
            tracing::warn!(method = %req.method(), path = %path, "no endpoint matches route, denied");
            return AppError::Unauthorized {
                status: StatusCode::FORBIDDEN,
                message: "no endpoint matches this route".into(),
                detail: path,
            }
            .into_response();
        }
        tracing::debug!(method = %req.method(), path = %path, "unresolved route passed through");
        return next.run(req).await;
    };

    let mut context = AuthorizationContext {
        endpoint: Some(endpoint.clone()),
        filter: None,
        public: endpoint.public,
    };

    if let (false, Some(authorizer)) = (endpoint.public, state.authorizer.as_ref()) {
        let (parts, body) = req.into_parts();
        match authorizer.authorize(&parts, &endpoint).await {
            Ok(filter) => {
                context.filter = Some(filter);
                req = Request::from_parts(parts, body);
            }
            Err(rejection) => {
                tracing::debug!(endpoint = %endpoint.name, ?rejection, "authorization rejected");
                return AppError::from(rejection).into_response();
            }
        }
    }

    req.extensions_mut().insert(context);
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&endpoint.name) {
        response.headers_mut().insert(ENDPOINT_NAME_HEADER, value);
    }
    response
}
