use serde_json::Map;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Middleware, Proxy, Response};
use crate::error::PortaError;

/// Fans a request out to every backend of a multi-backend endpoint and
/// unions the response objects.
///
/// Individual failures degrade the result to `is_complete = false` instead
/// of erroring; only when every backend fails does the last failure surface.
/// Key collisions resolve by completion order (later arrivals overwrite), so
/// endpoints should use disjoint key sets when determinism matters.
pub fn new_merge_data_middleware() -> Middleware {
    Box::new(move |next: Vec<Proxy>| {
        if next.len() < 2 {
            panic!("{}", PortaError::NotEnoughProxies);
        }
        let parts = next;
        Arc::new(move |ctx, request| {
            let parts = parts.clone();
            Box::pin(async move {
                let total = parts.len();
                let (tx, mut rx) = mpsc::channel(total);
                for part in parts {
                    let tx = tx.clone();
                    let ctx = ctx.clone();
                    let request = request.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(part(ctx, request).await).await;
                    });
                }
                drop(tx);

                let mut accumulator = Map::new();
                let mut is_complete = true;
                let mut failures = 0;
                let mut last_error = None;

                for _ in 0..total {
                    tokio::select! {
                        // caller gave up: answer with whatever has been merged
                        _ = ctx.done() => {
                            return Ok(Response {
                                data: accumulator,
                                is_complete: false,
                            });
                        }
                        received = rx.recv() => match received {
                            Some(Ok(response)) => {
                                for (key, value) in response.data {
                                    accumulator.insert(key, value);
                                }
                                is_complete = is_complete && response.is_complete;
                            }
                            Some(Err(error)) => {
                                failures += 1;
                                is_complete = false;
                                last_error = Some(error);
                            }
                            None => break,
                        },
                    }
                }

                if failures == total {
                    return Err(last_error.unwrap_or(PortaError::Internal));
                }
                Ok(Response {
                    data: accumulator,
                    is_complete,
                })
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::test_support::{delayed_proxy, dummy_proxy, failing_proxy, object};
    use crate::proxy::{Context, Request};
    use std::time::Duration;

    #[tokio::test]
    async fn test_merges_disjoint_backends() {
        let proxy = new_merge_data_middleware()(vec![
            dummy_proxy(object(&[("a", 1)])),
            dummy_proxy(object(&[("b", 2)])),
        ]);
        let response = proxy(Context::background(), Request::default())
            .await
            .unwrap();

        assert!(response.is_complete);
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data["a"], 1);
        assert_eq!(response.data["b"], 2);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_data() {
        let proxy = new_merge_data_middleware()(vec![
            dummy_proxy(object(&[("a", 1)])),
            failing_proxy("boom"),
        ]);
        let response = proxy(Context::background(), Request::default())
            .await
            .unwrap();

        assert!(!response.is_complete);
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data["a"], 1);
    }

    #[tokio::test]
    async fn test_all_failures_surface_an_error() {
        let proxy = new_merge_data_middleware()(vec![
            failing_proxy("first"),
            failing_proxy("second"),
        ]);
        let err = proxy(Context::background(), Request::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortaError::Decode(_)));
    }

    #[tokio::test]
    async fn test_caller_deadline_returns_partial_merge() {
        let proxy = new_merge_data_middleware()(vec![
            dummy_proxy(object(&[("fast", 1)])),
            delayed_proxy(Duration::from_millis(500), object(&[("slow", 2)])),
        ]);

        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let response = proxy(ctx, Request::default()).await.unwrap();

        assert!(!response.is_complete);
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data["fast"], 1);
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_incomplete_child_degrades_merge() {
        let incomplete: Proxy = Arc::new(|_ctx, _request| {
            Box::pin(async {
                Ok(Response {
                    data: object(&[("a", 1)]),
                    is_complete: false,
                })
            })
        });
        let proxy = new_merge_data_middleware()(vec![
            incomplete,
            dummy_proxy(object(&[("b", 2)])),
        ]);
        let response = proxy(Context::background(), Request::default())
            .await
            .unwrap();

        assert!(!response.is_complete);
        assert_eq!(response.data.len(), 2);
    }

    #[test]
    #[should_panic(expected = "not enough proxies")]
    fn test_rejects_single_downstream() {
        new_merge_data_middleware()(vec![dummy_proxy(Map::new())]);
    }
}
