use std::sync::Arc;
use tokio::sync::mpsc;

use super::{single_next, Middleware};
use crate::config::Backend;
use crate::error::PortaError;

/// Races `concurrent_calls` duplicated calls against a single backend and
/// settles for whichever succeeds first. The remaining workers are cancelled
/// through a child context the winner tears down.
pub fn new_concurrent_middleware(backend: Arc<Backend>) -> Middleware {
    let calls = backend.concurrent_calls as usize;
    Box::new(move |next| {
        let next = single_next(next);
        Arc::new(move |ctx, request| {
            let next = next.clone();
            Box::pin(async move {
                let local = ctx.with_cancel();
                let (tx, mut rx) = mpsc::channel(calls);

                for _ in 0..calls {
                    let next = next.clone();
                    let tx = tx.clone();
                    let worker_ctx = local.clone();
                    let request = request.clone();
                    tokio::spawn(async move {
                        // capacity matches the worker count, the send never blocks
                        let _ = tx.send(next(worker_ctx, request).await).await;
                    });
                }
                drop(tx);

                let mut last_error = None;
                for _ in 0..calls {
                    tokio::select! {
                        _ = ctx.done() => return Err(ctx.error()),
                        received = rx.recv() => match received {
                            Some(Ok(response)) => {
                                local.cancel();
                                return Ok(response);
                            }
                            Some(Err(error)) => last_error = Some(error),
                            None => break,
                        },
                    }
                }
                Err(last_error.unwrap_or(PortaError::Internal))
            })
        })
    })
}
