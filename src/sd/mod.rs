pub mod load_balancer;

pub use load_balancer::{Balancer, RandomLB, RoundRobinLB};

use crate::error::Result;

/// Source of the host list for a balancer. The default is a fixed list
/// captured at pipeline compilation; service-discovery integrations plug in
/// here.
pub trait Subscriber: Send + Sync {
    fn hosts(&self) -> Result<Vec<String>>;
}

/// A static host set.
#[derive(Debug, Clone)]
pub struct FixedSubscriber(pub Vec<String>);

impl Subscriber for FixedSubscriber {
    fn hosts(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

impl From<Vec<String>> for FixedSubscriber {
    fn from(hosts: Vec<String>) -> Self {
        FixedSubscriber(hosts)
    }
}
