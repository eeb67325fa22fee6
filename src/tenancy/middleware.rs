//! Request middleware that attaches the resolved [`TenantContext`].
//!
//! The context lives in the request's extensions only, so it is dropped
//! together with the request whatever the handler does.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use tracing::Instrument;

use super::resolver::{RequestFacts, Resolution, TenantContext};
use crate::server::AppState;

/// Resolves the tenant before the handler runs and decorates tenant
/// responses with credentialed CORS headers for the frontend origin.
pub async fn tenant_resolution_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let facts = RequestFacts::from_request_parts(request.uri(), request.headers());

    match state.resolver.resolve(&facts).await {
        Ok(Resolution::Bypassed) => next.run(request).await,
        Ok(Resolution::Resolved(context)) => {
            let span = tracing::info_span!(
                "tenant",
                schema = %context.partition.key(),
                strategy = context.strategy.as_str()
            );
            request.extensions_mut().insert::<TenantContext>(context);

            let mut response = next.run(request).instrument(span).await;
            apply_cors_headers(&mut response, &state.frontend_origin);
            response
        }
        Err(err) => err.into_response(),
    }
}

fn apply_cors_headers(response: &mut Response, frontend_origin: &str) {
    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(frontend_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Set-Cookie"),
    );
}
