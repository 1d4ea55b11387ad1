use rand::RngCore;
use std::sync::Arc;
use url::Url;

use super::{single_next, Middleware};
use crate::config::Backend;
use crate::sd::{Balancer, FixedSubscriber, RandomLB, RoundRobinLB};

pub fn new_round_robin_load_balanced_middleware(backend: &Backend) -> Middleware {
    new_load_balanced_middleware(RoundRobinLB::new(FixedSubscriber::from(backend.host.clone())))
}

pub fn new_random_load_balanced_middleware(backend: &Backend) -> Middleware {
    new_load_balanced_middleware(RandomLB::new(
        FixedSubscriber::from(backend.host.clone()),
        rand::thread_rng().next_u64(),
    ))
}

/// Resolves a host through the balancer and rewrites its copy of the request
/// with the absolute URL, folding the query map into the raw query string.
fn new_load_balanced_middleware<B>(balancer: B) -> Middleware
where
    B: Balancer + 'static,
{
    let balancer = Arc::new(balancer);
    Box::new(move |next| {
        let next = single_next(next);
        let balancer = balancer.clone();
        Arc::new(move |ctx, request| {
            let next = next.clone();
            let balancer = balancer.clone();
            Box::pin(async move {
                let host = balancer.host()?;
                let mut request = request.clone();

                let mut url = Url::parse(&format!("{}{}", host, request.path))?;
                if !request.query.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    let mut keys: Vec<&String> = request.query.keys().collect();
                    keys.sort();
                    for key in keys {
                        for value in &request.query[key] {
                            pairs.append_pair(key, value);
                        }
                    }
                }
                request.url = Some(url);

                next(ctx, request).await
            })
        })
    })
}
