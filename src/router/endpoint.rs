use axum::body::Body;
use axum::extract::{ConnectInfo, RawPathParams, RawQuery, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::error::PortaError;
use crate::proxy::http::USER_AGENT as GATEWAY_USER_AGENT;
use crate::proxy::{Context, Proxy, Request};

pub const VERSION_HEADER: &str = "x-porta-version";

/// Everything one registered endpoint needs to serve a request.
#[derive(Clone)]
pub struct EndpointState {
    pub config: Arc<EndpointConfig>,
    pub proxy: Proxy,
    pub debug: bool,
}

/// Front door of a compiled endpoint: derives the timeout context, builds
/// the edge request, runs the proxy graph and encodes the outcome.
pub async fn endpoint_handler(
    State(state): State<EndpointState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    path_params: RawPathParams,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    method: Method,
    body: Bytes,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let ctx = if state.config.timeout > Duration::ZERO {
        Context::background().with_timeout(state.config.timeout)
    } else {
        Context::background().with_cancel()
    };

    let request = new_request(
        &state.config,
        &method,
        client.ip(),
        &path_params,
        raw_query.as_deref(),
        &headers,
        body,
    );

    let result = (state.proxy)(ctx.clone(), request).await;

    let response = match result {
        Err(error) => {
            warn!(%request_id, endpoint = %state.config.endpoint, %error, "proxy failed");
            error_response(&error, state.debug)
        }
        Ok(_) if ctx.is_cancelled() => {
            warn!(%request_id, endpoint = %state.config.endpoint, "request deadline exceeded");
            error_response(&PortaError::Internal, false)
        }
        Ok(proxy_response) => success_response(&state.config, proxy_response),
    };

    // every exit path tears the derived context down
    ctx.cancel();
    response
}

/// Build the pipeline request from the HTTP request at the edge: gateway
/// identity headers, client address, the configured query params (first
/// value only) and the title-cased path params.
fn new_request(
    config: &EndpointConfig,
    method: &Method,
    client_ip: std::net::IpAddr,
    path_params: &RawPathParams,
    raw_query: Option<&str>,
    inbound_headers: &HeaderMap,
    body: Bytes,
) -> Request {
    let mut params = HashMap::new();
    for (key, value) in path_params.iter() {
        params.insert(title_case(key), value.to_string());
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = client_ip.to_string().parse() {
        headers.insert("x-forwarded-for", value);
    }
    headers.insert(USER_AGENT, HeaderValue::from_static(GATEWAY_USER_AGENT));
    if let Some(content_type) = inbound_headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }

    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(raw) = raw_query {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        for name in &config.query_string {
            if let Some((_, value)) = pairs.iter().find(|(key, _)| key == name) {
                if !value.is_empty() {
                    query.insert(name.clone(), vec![value.clone()]);
                }
            }
        }
    }

    Request {
        method: method.as_str().to_string(),
        headers,
        query,
        body,
        params,
        ..Request::default()
    }
}

fn success_response(config: &EndpointConfig, response: crate::proxy::Response) -> HttpResponse {
    let mut builder = HttpResponse::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(VERSION_HEADER, env!("CARGO_PKG_VERSION"));

    if config.cache_ttl > Duration::ZERO && response.is_complete {
        builder = builder.header(
            CACHE_CONTROL,
            format!("public, max-age={}", config.cache_ttl.as_secs()),
        );
    }

    let body = serde_json::to_vec(&response.data).unwrap_or_default();
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(error: &PortaError, debug: bool) -> HttpResponse {
    let message = if debug {
        error.to_string()
    } else {
        "internal server error".to_string()
    };
    (error.status_code(), message).into_response()
}

/// Path params are stored with the first letter upper-cased so they line up
/// with the `{Key}` placeholders of backend URL patterns.
fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
