use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::Subscriber;
use crate::error::{PortaError, Result};

/// Picks one backend host per call from a subscriber's host set.
pub trait Balancer: Send + Sync {
    fn host(&self) -> Result<String>;
}

/// Round-robin balancer backed by an atomic counter. The counter may be
/// shared across tasks; wrap-around is harmless.
pub struct RoundRobinLB<S> {
    subscriber: S,
    counter: AtomicU64,
}

impl<S: Subscriber> RoundRobinLB<S> {
    pub fn new(subscriber: S) -> Self {
        Self {
            subscriber,
            counter: AtomicU64::new(0),
        }
    }
}

impl<S: Subscriber> Balancer for RoundRobinLB<S> {
    fn host(&self) -> Result<String> {
        let hosts = self.subscriber.hosts()?;
        if hosts.is_empty() {
            return Err(PortaError::NoHosts);
        }
        let offset = self.counter.fetch_add(1, Ordering::Relaxed) % hosts.len() as u64;
        Ok(hosts[offset as usize].clone())
    }
}

/// Uniform random balancer, seeded at construction. The generator is not
/// concurrency-safe on its own, so it sits behind a mutex.
pub struct RandomLB<S> {
    subscriber: S,
    rng: Mutex<StdRng>,
}

impl<S: Subscriber> RandomLB<S> {
    pub fn new(subscriber: S, seed: u64) -> Self {
        Self {
            subscriber,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl<S: Subscriber> Balancer for RandomLB<S> {
    fn host(&self) -> Result<String> {
        let hosts = self.subscriber.hosts()?;
        if hosts.is_empty() {
            return Err(PortaError::NoHosts);
        }
        let index = self.rng.lock().unwrap().gen_range(0..hosts.len());
        Ok(hosts[index].clone())
    }
}
