//! Proxy authorization adapters.
//!
//! Three dissimilar protocols answer the same question. Each adapter
//! consumes the [`BanDecision`] capability; the concrete implementation is
//! the ban engine, so decisions for the same address at the same instant
//! are identical across protocols.

pub mod envoy;
pub mod nginx;
pub mod spoa;

use crate::engine::BanEngine;
use async_trait::async_trait;
use std::sync::Arc;

/// The single capability shared by every adapter.
#[async_trait]
pub trait BanDecision: Send + Sync {
    /// Whether the address is banned right now. Malformed addresses are
    /// never banned.
    async fn is_banned(&self, addr: &str) -> bool;
}

#[async_trait]
impl BanDecision for BanEngine {
    async fn is_banned(&self, addr: &str) -> bool {
        BanEngine::is_banned(self, addr).await
    }
}

/// Shared handle passed to adapter constructors.
pub type Decider = Arc<dyn BanDecision>;
