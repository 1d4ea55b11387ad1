pub mod balancing;
pub mod concurrent;
pub mod factory;
pub mod formatter;
pub mod http;
pub mod logging;
pub mod merge;
pub mod request;

pub use factory::ProxyFactory;
pub use request::Request;

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{PortaError, Result};

/// The entity returned by a proxy: a shape-less JSON object plus a flag
/// that is true only when every contributing backend succeeded.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub data: Map<String, Value>,
    pub is_complete: bool,
}

/// A proxy maps a request plus its call context to a response or an error.
/// It is the unit of middleware composition: every layer of a pipeline is
/// itself a proxy wrapping the next one.
pub type Proxy = Arc<dyn Fn(Context, Request) -> ProxyFuture + Send + Sync>;

pub type ProxyFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

/// A middleware decorates one or more proxies into a new one. Handing it the
/// wrong number of downstreams is a pipeline composition mistake, punished
/// with a panic at wire time.
pub type Middleware = Box<dyn Fn(Vec<Proxy>) -> Proxy + Send + Sync>;

/// Unwraps the single downstream a middleware is allowed to decorate.
pub(crate) fn single_next(mut next: Vec<Proxy>) -> Proxy {
    if next.len() > 1 {
        panic!("{}", PortaError::TooManyProxies);
    }
    match next.pop() {
        Some(proxy) => proxy,
        None => panic!("{}", PortaError::NotEnoughProxies),
    }
}

/// Cancellation and deadline carrier handed down the proxy pipeline.
/// Children observe their parent's cancellation; cancelling a child never
/// affects the parent.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child context that can be cancelled on its own.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context that is cancelled automatically once the
    /// timeout elapses.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let token = self.token.child_token();
        let deadline = Instant::now() + timeout;
        let watcher = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => watcher.cancel(),
                _ = watcher.cancelled() => {}
            }
        });
        Self {
            token,
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once this context or any of its ancestors is cancelled.
    pub async fn done(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The error explaining why this context is no longer usable.
    pub fn error(&self) -> PortaError {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => PortaError::DeadlineExceeded,
            _ => PortaError::Canceled,
        }
    }
}
