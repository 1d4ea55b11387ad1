use std::sync::Arc;

use super::balancing::new_round_robin_load_balanced_middleware;
use super::concurrent::new_concurrent_middleware;
use super::http::{http_proxy, new_request_builder_middleware};
use super::logging::new_logging_middleware;
use super::merge::new_merge_data_middleware;
use super::Proxy;
use crate::config::{Backend, EndpointConfig};
use crate::error::{PortaError, Result};

/// Builds the proxy for a single backend; the seam where alternative
/// transports (or test assertions) replace the HTTP caller.
pub type BackendFactory = Arc<dyn Fn(&Backend) -> Proxy + Send + Sync>;

/// Compiles an endpoint configuration into its executable proxy graph.
/// Pure: the same configuration always yields an equivalent graph, and the
/// factory holds no per-request state.
pub struct ProxyFactory {
    backend_factory: BackendFactory,
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new(Arc::new(http_proxy))
    }
}

impl ProxyFactory {
    pub fn new(backend_factory: BackendFactory) -> Self {
        Self { backend_factory }
    }

    pub fn build(&self, endpoint: &EndpointConfig) -> Result<Proxy> {
        match endpoint.backend.len() {
            0 => Err(PortaError::NoBackends),
            1 => Ok(self.new_stack(&endpoint.backend[0])),
            _ => Ok(self.new_multi(endpoint)),
        }
    }

    fn new_multi(&self, endpoint: &EndpointConfig) -> Proxy {
        let stacks: Vec<Proxy> = endpoint
            .backend
            .iter()
            .map(|backend| self.new_stack(backend))
            .collect();
        new_merge_data_middleware()(stacks)
    }

    /// Single-backend stack, innermost last:
    /// logging(request-builder(concurrent?(load-balance(http caller)))).
    /// The concurrent layer only exists when the backend asks for more than
    /// one call.
    fn new_stack(&self, backend: &Backend) -> Proxy {
        let shared = Arc::new(backend.clone());

        let mut proxy = (self.backend_factory)(backend);
        proxy = new_round_robin_load_balanced_middleware(backend)(vec![proxy]);
        if backend.concurrent_calls > 1 {
            proxy = new_concurrent_middleware(shared.clone())(vec![proxy]);
        }
        proxy = new_request_builder_middleware(shared)(vec![proxy]);
        new_logging_middleware(&backend.url_pattern)(vec![proxy])
    }
}
