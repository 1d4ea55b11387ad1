use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use super::formatter::EntityFormatter;
use super::{single_next, Middleware, Proxy, Response};
use crate::config::Backend;
use crate::encoding::Decoder;
use crate::error::PortaError;

/// Builds the HTTP client a backend stack will use for every call. Injected
/// so tests and integrations can swap transport policy.
pub type HttpClientFactory = Arc<dyn Fn() -> reqwest::Client + Send + Sync>;

pub const USER_AGENT: &str = concat!("porta/", env!("CARGO_PKG_VERSION"));

/// Default client: no proxy, bounded connection pool, shared by every call
/// of the stack it was built for.
pub fn default_http_client_factory() -> HttpClientFactory {
    Arc::new(|| {
        reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default()
    })
}

/// The default backend factory: one plain HTTP caller per backend config.
pub fn http_proxy(backend: &Backend) -> Proxy {
    new_http_proxy(
        backend,
        default_http_client_factory(),
        backend.encoding.decoder(),
    )
}

/// Issues one HTTP request against the absolute URL a previous layer
/// resolved, decodes the body and applies the backend's entity formatter.
pub fn new_http_proxy(
    backend: &Backend,
    client_factory: HttpClientFactory,
    decoder: Decoder,
) -> Proxy {
    let formatter = EntityFormatter::new(backend);
    let client = client_factory();

    Arc::new(move |ctx, request| {
        let client = client.clone();
        let formatter = formatter.clone();
        Box::pin(async move {
            let url = match request.url {
                Some(url) => url,
                None => return Err(PortaError::Internal),
            };
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|_| PortaError::Internal)?;

            let mut backend_request = client
                .request(method, url.as_str())
                .headers(request.headers.clone());
            if !request.body.is_empty() {
                backend_request = backend_request.body(request.body.clone());
            }

            let response = tokio::select! {
                result = backend_request.send() => result?,
                _ = ctx.done() => return Err(ctx.error()),
            };
            if ctx.is_cancelled() {
                return Err(ctx.error());
            }

            let status = response.status();
            if status != StatusCode::OK && status != StatusCode::CREATED {
                // drain so the connection can go back to the pool
                let _ = response.bytes().await;
                return Err(PortaError::InvalidStatusCode(status.as_u16()));
            }

            let body = response.bytes().await?;
            let data = decoder(&body)?;
            Ok(formatter.format(Response {
                data,
                is_complete: true,
            }))
        })
    })
}

/// First layer of every backend stack: stamps the backend's URL pattern and
/// method onto its copy of the request before handing it on.
pub fn new_request_builder_middleware(backend: Arc<Backend>) -> Middleware {
    Box::new(move |next| {
        let next = single_next(next);
        let backend = backend.clone();
        Arc::new(move |ctx, request| {
            let next = next.clone();
            let backend = backend.clone();
            Box::pin(async move {
                let mut request = request.clone();
                request.generate_path(&backend.url_pattern);
                request.method = backend.method.clone();
                next(ctx, request).await
            })
        })
    })
}
