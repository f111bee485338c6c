//! Per-signer transaction queue.
//!
//! On-chain submissions (deploy, deposit, withdraw, dispute, approve) run
//! through a single-concurrency FIFO per signer so one wallet never races
//! itself into nonce collisions. Lifecycle events are published on the
//! engine bus and persisted through the store; a failed transaction never
//! rolls back channel state, which was never updated on-chain to begin with.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use strand_chain::{ChainError, ChainSender, ChainTransaction};
use strand_store::EngineStore;
use strand_types::transactions::TransactionReceiptRecord;

use crate::events::{EngineEvent, EventBus};

struct QueuedTransaction {
    chain_id: u64,
    tx: ChainTransaction,
    done: oneshot::Sender<Result<TransactionReceiptRecord, ChainError>>,
}

/// Handle to a spawned per-signer submission worker.
pub struct TransactionQueue {
    queue: mpsc::Sender<QueuedTransaction>,
}

impl TransactionQueue {
    /// Spawns the worker. One queue per signer; the [`ChainSender`] embodies
    /// the signing wallet.
    pub fn spawn<S>(
        sender: Arc<dyn ChainSender>,
        store: Arc<S>,
        events: EventBus,
        max_retries: u32,
    ) -> Self
    where
        S: EngineStore + 'static,
    {
        let (queue, mut rx) = mpsc::channel::<QueuedTransaction>(64);
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let result =
                    process(&*sender, &*store, &events, max_retries, item.chain_id, &item.tx)
                        .await;
                let _ = item.done.send(result);
            }
        });
        TransactionQueue { queue }
    }

    /// Enqueues a transaction and waits for it to be mined (or fail).
    pub async fn submit(
        &self,
        chain_id: u64,
        tx: ChainTransaction,
    ) -> Result<TransactionReceiptRecord, ChainError> {
        let (done, receipt) = oneshot::channel();
        self.queue
            .send(QueuedTransaction { chain_id, tx, done })
            .await
            .map_err(|_| ChainError::Rpc("transaction queue is shut down".to_string()))?;
        receipt
            .await
            .map_err(|_| ChainError::Rpc("transaction worker dropped the request".to_string()))?
    }
}

async fn process<S: EngineStore>(
    sender: &dyn ChainSender,
    store: &S,
    events: &EventBus,
    max_retries: u32,
    chain_id: u64,
    tx: &ChainTransaction,
) -> Result<TransactionReceiptRecord, ChainError> {
    let channel = tx.channel_address();
    let purpose = tx.purpose();
    let attempts = max_retries.max(1);

    let mut attempt = 0;
    let response = loop {
        attempt += 1;
        match sender.submit(chain_id, tx).await {
            Ok(response) => break response,
            Err(error) if error.is_retryable() && attempt < attempts => {
                tracing::debug!(%channel, ?purpose, attempt, %error, "retrying submission");
            }
            Err(error) => {
                record_failure(store, events, channel, None, &error.to_string()).await;
                return Err(error);
            }
        }
    };

    if let Err(error) = store
        .save_transaction_response(channel, purpose, &response)
        .await
    {
        tracing::warn!(%channel, %error, "failed to persist transaction response");
    }
    events.publish(EngineEvent::TransactionSubmitted {
        channel,
        purpose,
        transaction_hash: response.transaction_hash,
    });

    match sender.wait_mined(chain_id, response.transaction_hash).await {
        Ok(receipt) if receipt.status => {
            if let Err(error) = store.save_transaction_receipt(channel, &receipt).await {
                tracing::warn!(%channel, %error, "failed to persist transaction receipt");
            }
            events.publish(EngineEvent::TransactionMined {
                channel,
                transaction_hash: receipt.transaction_hash,
            });
            Ok(receipt)
        }
        Ok(receipt) => {
            let reason = "transaction reverted".to_string();
            record_failure(
                store,
                events,
                channel,
                Some(receipt.transaction_hash),
                &reason,
            )
            .await;
            Err(ChainError::ContractCall(reason))
        }
        Err(error) => {
            record_failure(
                store,
                events,
                channel,
                Some(response.transaction_hash),
                &error.to_string(),
            )
            .await;
            Err(error)
        }
    }
}

async fn record_failure<S: EngineStore>(
    store: &S,
    events: &EventBus,
    channel: alloy_primitives::Address,
    transaction_hash: Option<alloy_primitives::B256>,
    reason: &str,
) {
    if let Err(error) = store
        .save_transaction_failure(channel, transaction_hash, reason)
        .await
    {
        tracing::warn!(%channel, %error, "failed to persist transaction failure");
    }
    events.publish(EngineEvent::TransactionFailed {
        channel,
        transaction_hash,
        reason: reason.to_string(),
    });
}
