pub mod debug;
pub mod endpoint;

use axum::routing::{get, on, MethodFilter};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::proxy::ProxyFactory;
use endpoint::{endpoint_handler, EndpointState};

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

/// Compile every endpoint and serve the gateway until the process stops.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    Lazy::force(&STARTED_AT);
    let factory = ProxyFactory::default();
    let app = new_router(&config, &factory);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "porta listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Register each configured endpoint at its path and method. Endpoints the
/// factory rejects, endpoints with unsupported methods and non-GET
/// endpoints with several backends are dropped with an error log instead of
/// aborting the whole service.
pub fn new_router(config: &ServiceConfig, factory: &ProxyFactory) -> Router {
    let mut app = Router::new();

    for endpoint_config in &config.endpoints {
        let filter = match method_filter(&endpoint_config.method) {
            Some(filter) => filter,
            None => {
                error!(
                    endpoint = %endpoint_config.endpoint,
                    method = %endpoint_config.method,
                    "unsupported method, ignoring endpoint"
                );
                continue;
            }
        };
        if endpoint_config.method != "GET" && endpoint_config.backend.len() > 1 {
            error!(
                endpoint = %endpoint_config.endpoint,
                method = %endpoint_config.method,
                "endpoints with several backends must use GET, ignoring"
            );
            continue;
        }

        let proxy = match factory.build(endpoint_config) {
            Ok(proxy) => proxy,
            Err(error) => {
                error!(
                    endpoint = %endpoint_config.endpoint,
                    %error,
                    "calling the proxy factory, ignoring endpoint"
                );
                continue;
            }
        };

        let state = EndpointState {
            config: Arc::new(endpoint_config.clone()),
            proxy,
            debug: config.debug,
        };
        let path = axum_path(&endpoint_config.endpoint);
        app = app.route(&path, on(filter, endpoint_handler).with_state(state));
        info!(
            endpoint = %endpoint_config.endpoint,
            method = %endpoint_config.method,
            backends = endpoint_config.backend.len(),
            "endpoint registered"
        );
    }

    app = app.route("/__health", get(health_handler));
    if config.debug {
        let filter = MethodFilter::GET.or(MethodFilter::POST).or(MethodFilter::PUT);
        app = app.route("/__debug/*path", on(filter, debug::debug_handler));
    }

    app.layer(
        tower::ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .into_inner(),
    )
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "PATCH" => Some(MethodFilter::PATCH),
        "DELETE" => Some(MethodFilter::DELETE),
        _ => None,
    }
}

/// Translate `{param}` segments of a configured endpoint path into the
/// `:param` captures the front-end router understands.
fn axum_path(endpoint: &str) -> String {
    static PARAM: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"\{([a-zA-Z0-9_\-]+)\}").unwrap());
    PARAM.replace_all(endpoint, ":$1").into_owned()
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": STARTED_AT.elapsed().as_secs(),
    }))
}
