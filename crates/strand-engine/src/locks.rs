//! Per-channel exclusive locks.
//!
//! All update processing for one channel (outbound, inbound, sync) runs
//! under its lock; unrelated channels proceed in parallel. Acquisition is
//! bounded by the channel's protocol message timeout so a peer that stops
//! mid-handshake cannot wedge the channel forever.

use alloy_primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of per-channel mutexes. Entries are created on first use and kept
/// for the lifetime of the engine (a few dozen bytes per channel).
#[derive(Default)]
pub(crate) struct ChannelLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl ChannelLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquires the channel's exclusive lock, waiting at most `ttl`.
    pub(crate) async fn acquire(
        &self,
        channel: Address,
        ttl: Duration,
    ) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(channel)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        tokio::time::timeout(ttl, lock.lock_owned()).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_when_held() {
        let locks = ChannelLocks::new();
        let channel = Address::repeat_byte(1);
        let guard = locks.acquire(channel, Duration::from_secs(1)).await;
        assert!(guard.is_some());
        let second = locks.acquire(channel, Duration::from_secs(1)).await;
        assert!(second.is_none());
        drop(guard);
        assert!(locks.acquire(channel, Duration::from_secs(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_unrelated_channels_do_not_contend() {
        let locks = ChannelLocks::new();
        let _a = locks
            .acquire(Address::repeat_byte(1), Duration::from_secs(1))
            .await
            .unwrap();
        let b = locks
            .acquire(Address::repeat_byte(2), Duration::from_secs(1))
            .await;
        assert!(b.is_some());
    }
}
