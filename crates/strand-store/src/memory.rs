//! In-memory reference store.
//!
//! A single `RwLock` over the whole map set keeps every save channel-scope
//! atomic by construction. Nothing here awaits while holding the lock.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use strand_types::commitment::WithdrawCommitment;
use strand_types::identifiers::PublicIdentifier;
use strand_types::transactions::{
    TransactionPurpose, TransactionReceiptRecord, TransactionResponse,
};
use strand_types::{ChannelState, Transfer, TransferFilter};

use crate::{EngineStore, StoreError};

#[derive(Debug, Clone)]
enum TransactionLogEntry {
    Submitted {
        channel: Address,
        purpose: TransactionPurpose,
        response: TransactionResponse,
    },
    Mined {
        channel: Address,
        receipt: TransactionReceiptRecord,
    },
    Failed {
        channel: Address,
        transaction_hash: Option<B256>,
        reason: String,
    },
}

#[derive(Default)]
struct Inner {
    channels: HashMap<Address, ChannelState>,
    transfers: HashMap<B256, Transfer>,
    /// Active transfer ids per channel, in creation order.
    active: HashMap<Address, Vec<B256>>,
    withdrawals: HashMap<B256, WithdrawCommitment>,
    transaction_log: Vec<TransactionLogEntry>,
}

/// Reference [`EngineStore`] backed by process memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, method: &'static str) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::new(method, "store lock poisoned"))
    }

    fn write(
        &self,
        method: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::new(method, "store lock poisoned"))
    }

    /// Number of lifecycle entries recorded for a channel. Test hook.
    pub fn transaction_log_len(&self, channel: Address) -> usize {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .transaction_log
                    .iter()
                    .filter(|entry| match entry {
                        TransactionLogEntry::Submitted { channel: c, .. }
                        | TransactionLogEntry::Mined { channel: c, .. }
                        | TransactionLogEntry::Failed { channel: c, .. } => *c == channel,
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl EngineStore for InMemoryStore {
    async fn get_channel_state(
        &self,
        channel: Address,
    ) -> Result<Option<ChannelState>, StoreError> {
        Ok(self.read("get_channel_state")?.channels.get(&channel).cloned())
    }

    async fn get_channel_state_by_participants(
        &self,
        alice: &PublicIdentifier,
        bob: &PublicIdentifier,
        chain_id: u64,
    ) -> Result<Option<ChannelState>, StoreError> {
        let inner = self.read("get_channel_state_by_participants")?;
        Ok(inner
            .channels
            .values()
            .find(|c| {
                c.network_context.chain_id == chain_id
                    && ((&c.alice_identifier == alice && &c.bob_identifier == bob)
                        || (&c.alice_identifier == bob && &c.bob_identifier == alice))
            })
            .cloned())
    }

    async fn get_channel_states(&self) -> Result<Vec<ChannelState>, StoreError> {
        Ok(self
            .read("get_channel_states")?
            .channels
            .values()
            .cloned()
            .collect())
    }

    async fn get_active_transfers(&self, channel: Address) -> Result<Vec<Transfer>, StoreError> {
        let inner = self.read("get_active_transfers")?;
        let ids = inner.active.get(&channel).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.transfers.get(id).cloned())
            .collect())
    }

    async fn get_transfer_state(
        &self,
        transfer_id: B256,
    ) -> Result<Option<Transfer>, StoreError> {
        Ok(self
            .read("get_transfer_state")?
            .transfers
            .get(&transfer_id)
            .cloned())
    }

    async fn get_transfers(&self, filter: &TransferFilter) -> Result<Vec<Transfer>, StoreError> {
        Ok(self
            .read("get_transfers")?
            .transfers
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn save_channel_state(
        &self,
        channel: &ChannelState,
        transfer: Option<&Transfer>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write("save_channel_state")?;
        inner
            .channels
            .insert(channel.channel_address, channel.clone());
        if let Some(transfer) = transfer {
            let active = inner
                .active
                .entry(channel.channel_address)
                .or_default();
            if transfer.is_resolved() {
                active.retain(|id| *id != transfer.transfer_id);
            } else if !active.contains(&transfer.transfer_id) {
                active.push(transfer.transfer_id);
            }
            inner
                .transfers
                .insert(transfer.transfer_id, transfer.clone());
        }
        Ok(())
    }

    async fn save_channel_state_and_transfers(
        &self,
        channel: &ChannelState,
        active: &[Transfer],
    ) -> Result<(), StoreError> {
        let mut inner = self.write("save_channel_state_and_transfers")?;
        inner
            .channels
            .insert(channel.channel_address, channel.clone());
        let ids = active.iter().map(|t| t.transfer_id).collect();
        for transfer in active {
            inner
                .transfers
                .insert(transfer.transfer_id, transfer.clone());
        }
        inner.active.insert(channel.channel_address, ids);
        Ok(())
    }

    async fn save_withdrawal_commitment(
        &self,
        transfer_id: B256,
        commitment: &WithdrawCommitment,
    ) -> Result<(), StoreError> {
        self.write("save_withdrawal_commitment")?
            .withdrawals
            .insert(transfer_id, commitment.clone());
        Ok(())
    }

    async fn get_withdrawal_commitment(
        &self,
        transfer_id: B256,
    ) -> Result<Option<WithdrawCommitment>, StoreError> {
        Ok(self
            .read("get_withdrawal_commitment")?
            .withdrawals
            .get(&transfer_id)
            .cloned())
    }

    async fn get_withdrawal_commitment_by_transaction_hash(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<WithdrawCommitment>, StoreError> {
        Ok(self
            .read("get_withdrawal_commitment_by_transaction_hash")?
            .withdrawals
            .values()
            .find(|c| c.transaction_hash == Some(transaction_hash))
            .cloned())
    }

    async fn save_transaction_response(
        &self,
        channel: Address,
        purpose: TransactionPurpose,
        response: &TransactionResponse,
    ) -> Result<(), StoreError> {
        self.write("save_transaction_response")?
            .transaction_log
            .push(TransactionLogEntry::Submitted {
                channel,
                purpose,
                response: response.clone(),
            });
        Ok(())
    }

    async fn save_transaction_receipt(
        &self,
        channel: Address,
        receipt: &TransactionReceiptRecord,
    ) -> Result<(), StoreError> {
        self.write("save_transaction_receipt")?
            .transaction_log
            .push(TransactionLogEntry::Mined {
                channel,
                receipt: receipt.clone(),
            });
        Ok(())
    }

    async fn save_transaction_failure(
        &self,
        channel: Address,
        transaction_hash: Option<B256>,
        reason: &str,
    ) -> Result<(), StoreError> {
        self.write("save_transaction_failure")?
            .transaction_log
            .push(TransactionLogEntry::Failed {
                channel,
                transaction_hash,
                reason: reason.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};
    use strand_types::balance::Balance;
    use strand_types::channel::NetworkContext;
    use strand_types::signing::ChannelSigner;
    use strand_types::transfer::TransferEncodings;

    fn signer(byte: u8) -> ChannelSigner {
        let mut key = [0u8; 32];
        key[31] = byte;
        ChannelSigner::from_bytes(&key.into()).unwrap()
    }

    fn channel() -> ChannelState {
        let alice = signer(1);
        let bob = signer(2);
        ChannelState {
            channel_address: Address::repeat_byte(0xcc),
            alice: alice.address(),
            bob: bob.address(),
            alice_identifier: alice.public_identifier().clone(),
            bob_identifier: bob.public_identifier().clone(),
            network_context: NetworkContext {
                chain_id: 1337,
                channel_factory_address: Address::repeat_byte(0xfa),
                transfer_registry_address: Address::repeat_byte(0xe9),
            },
            nonce: 1,
            asset_ids: vec![],
            balances: vec![],
            processed_deposits_a: vec![],
            processed_deposits_b: vec![],
            defund_nonces: vec![],
            timeout: 600,
            merkle_root: B256::ZERO,
            latest_update: None,
            in_dispute: false,
        }
    }

    fn transfer(channel: &ChannelState, id: u8) -> Transfer {
        Transfer {
            transfer_id: B256::repeat_byte(id),
            channel_address: channel.channel_address,
            chain_id: channel.network_context.chain_id,
            channel_factory_address: channel.network_context.channel_factory_address,
            initiator: channel.alice,
            responder: channel.bob,
            channel_nonce: channel.nonce,
            transfer_definition: Address::repeat_byte(0xde),
            transfer_encodings: TransferEncodings {
                state: "tuple(bytes32 lockHash, uint256 expiry)".into(),
                resolver: "tuple(bytes32 preImage)".into(),
            },
            balance: Balance {
                to: channel.participants(),
                amount: [U256::from(3u64), U256::ZERO],
            },
            asset_id: Address::ZERO,
            transfer_timeout: 60,
            initial_state_hash: B256::repeat_byte(id.wrapping_add(1)),
            transfer_state: serde_json::Value::Null,
            transfer_resolver: None,
            meta: serde_json::Value::Null,
            in_dispute: false,
        }
    }

    #[tokio::test]
    async fn test_channel_roundtrip() {
        let store = InMemoryStore::new();
        let channel = channel();
        store.save_channel_state(&channel, None).await.unwrap();
        let loaded = store
            .get_channel_state(channel.channel_address)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, channel);
        assert!(
            store
                .get_channel_state(Address::repeat_byte(0x01))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_participant_lookup_both_orientations() {
        let store = InMemoryStore::new();
        let channel = channel();
        store.save_channel_state(&channel, None).await.unwrap();

        for (a, b) in [
            (&channel.alice_identifier, &channel.bob_identifier),
            (&channel.bob_identifier, &channel.alice_identifier),
        ] {
            let found = store
                .get_channel_state_by_participants(a, b, 1337)
                .await
                .unwrap();
            assert_eq!(found.as_ref(), Some(&channel));
        }
        assert!(
            store
                .get_channel_state_by_participants(
                    &channel.alice_identifier,
                    &channel.bob_identifier,
                    1,
                )
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_then_resolve_transitions_active_set() {
        let store = InMemoryStore::new();
        let channel = channel();
        let created = transfer(&channel, 0x11);
        store
            .save_channel_state(&channel, Some(&created))
            .await
            .unwrap();
        let active = store
            .get_active_transfers(channel.channel_address)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let mut resolved = created.clone();
        resolved.transfer_resolver = Some(serde_json::Value::Null);
        store
            .save_channel_state(&channel, Some(&resolved))
            .await
            .unwrap();
        assert!(
            store
                .get_active_transfers(channel.channel_address)
                .await
                .unwrap()
                .is_empty()
        );
        // History retains the resolved transfer.
        let history = store
            .get_transfers(&TransferFilter {
                transfer_id: Some(created.transfer_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved());
    }

    #[tokio::test]
    async fn test_active_transfers_preserve_creation_order() {
        let store = InMemoryStore::new();
        let channel = channel();
        for id in [0x21, 0x22, 0x23] {
            store
                .save_channel_state(&channel, Some(&transfer(&channel, id)))
                .await
                .unwrap();
        }
        let active = store
            .get_active_transfers(channel.channel_address)
            .await
            .unwrap();
        let ids: Vec<B256> = active.iter().map(|t| t.transfer_id).collect();
        assert_eq!(
            ids,
            vec![
                B256::repeat_byte(0x21),
                B256::repeat_byte(0x22),
                B256::repeat_byte(0x23),
            ]
        );
    }

    #[tokio::test]
    async fn test_withdrawal_commitment_by_transaction_hash() {
        let store = InMemoryStore::new();
        let channel = channel();
        let commitment = WithdrawCommitment {
            channel_address: channel.channel_address,
            alice: channel.alice,
            bob: channel.bob,
            recipient: channel.alice,
            asset_id: Address::ZERO,
            amount: U256::from(4u64),
            nonce: 9,
            call_to: Address::ZERO,
            call_data: Bytes::new(),
            alice_signature: None,
            bob_signature: None,
            transaction_hash: Some(B256::repeat_byte(0x66)),
        };
        store
            .save_withdrawal_commitment(B256::repeat_byte(0x11), &commitment)
            .await
            .unwrap();
        let by_id = store
            .get_withdrawal_commitment(B256::repeat_byte(0x11))
            .await
            .unwrap();
        assert_eq!(by_id.as_ref(), Some(&commitment));
        let by_hash = store
            .get_withdrawal_commitment_by_transaction_hash(B256::repeat_byte(0x66))
            .await
            .unwrap();
        assert_eq!(by_hash.as_ref(), Some(&commitment));
    }
}
