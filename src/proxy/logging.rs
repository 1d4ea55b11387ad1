use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{single_next, Middleware};

/// Wraps a proxy with call logging: one line going in, one line with the
/// elapsed time coming out, and a warning when the call failed.
pub fn new_logging_middleware(name: &str) -> Middleware {
    let name: Arc<str> = Arc::from(name);
    Box::new(move |next| {
        let next = single_next(next);
        let name = name.clone();
        Arc::new(move |ctx, request| {
            let next = next.clone();
            let name = name.clone();
            Box::pin(async move {
                let begin = Instant::now();
                debug!(backend = %name, method = %request.method, "calling backend");

                let result = next(ctx, request).await;

                let elapsed_ms = begin.elapsed().as_millis();
                info!(backend = %name, elapsed_ms, "call to backend finished");
                if let Err(error) = &result {
                    warn!(backend = %name, error = %error, "call to backend failed");
                }
                result
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortaError;
    use crate::proxy::test_support::{dummy_proxy, failing_proxy, object};
    use crate::proxy::{Context, Request};

    #[tokio::test]
    async fn test_passes_result_through() {
        let proxy = new_logging_middleware("/x")(vec![dummy_proxy(object(&[("a", 1)]))]);
        let response = proxy(Context::background(), Request::default())
            .await
            .unwrap();
        assert_eq!(response.data["a"], 1);
        assert!(response.is_complete);
    }

    #[tokio::test]
    async fn test_passes_error_through() {
        let proxy = new_logging_middleware("/x")(vec![failing_proxy("boom")]);
        let err = proxy(Context::background(), Request::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortaError::Decode(_)));
    }
}
