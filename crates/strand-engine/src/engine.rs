//! The protocol engine.
//!
//! [`ProtocolEngine`] ties the validator to its collaborators: the store,
//! the chain reader, the messenger, and the external validator. It exposes
//! the four update operations, the inbound handler, an event subscription,
//! and the withdrawal-commitment helpers.

use alloy_primitives::{Address, B256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use strand_chain::{ChainReader, ChainSender};
use strand_store::EngineStore;
use strand_types::channel::{ChannelRole, ChannelState};
use strand_types::commitment::WithdrawCommitment;
use strand_types::config::EngineConfig;
use strand_types::signing::ChannelSigner;
use strand_types::transfer::Transfer;
use strand_types::update::{
    CreateParams, DepositParams, ResolveParams, SetupParams, UpdateParams, UpdateType,
};

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::external::{AcceptAll, ExternalValidation};
use crate::locks::ChannelLocks;
use crate::messaging::ProtocolMessenger;
use crate::queue::TransactionQueue;

/// The two-party update protocol engine.
///
/// One instance per participant. All update processing for a channel runs
/// under that channel's exclusive lock; unrelated channels proceed in
/// parallel. Persistence is always the final step of a flow, so failures
/// leave channels unchanged.
pub struct ProtocolEngine<S, C, M, V = AcceptAll> {
    signer: Arc<ChannelSigner>,
    store: Arc<S>,
    reader: Arc<C>,
    messenger: Arc<M>,
    external: Arc<V>,
    locks: ChannelLocks,
    events: EventBus,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl<S, C, M> ProtocolEngine<S, C, M, AcceptAll>
where
    S: EngineStore,
    C: ChainReader,
    M: ProtocolMessenger,
{
    /// Builds an engine with the default accept-all external validator.
    pub fn new(
        signer: ChannelSigner,
        store: Arc<S>,
        reader: Arc<C>,
        messenger: Arc<M>,
        config: EngineConfig,
    ) -> Self {
        Self::with_external_validation(signer, store, reader, messenger, Arc::new(AcceptAll), config)
    }
}

impl<S, C, M, V> ProtocolEngine<S, C, M, V>
where
    S: EngineStore,
    C: ChainReader,
    M: ProtocolMessenger,
    V: ExternalValidation,
{
    pub fn with_external_validation(
        signer: ChannelSigner,
        store: Arc<S>,
        reader: Arc<C>,
        messenger: Arc<M>,
        external: Arc<V>,
        config: EngineConfig,
    ) -> Self {
        let events = EventBus::new(config.event_buffer);
        ProtocolEngine {
            signer: Arc::new(signer),
            store,
            reader,
            messenger,
            external,
            locks: ChannelLocks::new(),
            events,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets up a new channel with the counterparty.
    pub async fn setup(&self, params: SetupParams) -> Result<ChannelState, EngineError> {
        let (channel, _) = self.propose(UpdateParams::Setup(params)).await?;
        Ok(channel)
    }

    /// Reconciles pending on-chain deposits for one asset into the channel.
    pub async fn deposit(&self, params: DepositParams) -> Result<ChannelState, EngineError> {
        let (channel, _) = self.propose(UpdateParams::Deposit(params)).await?;
        Ok(channel)
    }

    /// Locks a new conditional transfer in the channel.
    pub async fn create_transfer(
        &self,
        params: CreateParams,
    ) -> Result<(ChannelState, Transfer), EngineError> {
        let (channel, transfer) = self.propose(UpdateParams::Create(params)).await?;
        let transfer = transfer.expect("create updates always carry their transfer");
        Ok((channel, transfer))
    }

    /// Resolves (or cooperatively cancels, with a `Null` resolver) an active
    /// transfer.
    pub async fn resolve_transfer(
        &self,
        params: ResolveParams,
    ) -> Result<(ChannelState, Transfer), EngineError> {
        let (channel, transfer) = self.propose(UpdateParams::Resolve(params)).await?;
        let transfer = transfer.expect("resolve updates always carry their transfer");
        Ok((channel, transfer))
    }

    /// Subscribes to engine lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Token cancelling every in-flight engine operation at its next
    /// suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The engine's public identifier.
    pub fn public_identifier(&self) -> &strand_types::PublicIdentifier {
        self.signer.public_identifier()
    }

    /// Spawns the per-signer FIFO submission queue over a chain sender,
    /// wired to this engine's store and event bus.
    pub fn spawn_transaction_queue(&self, sender: Arc<dyn ChainSender>) -> TransactionQueue
    where
        S: 'static,
    {
        TransactionQueue::spawn(
            sender,
            self.store.clone(),
            self.events.clone(),
            self.config.default_tx_retries,
        )
    }

    /// Runs the inbound message loop until cancellation or transport
    /// shutdown.
    pub fn serve(self: Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
        C: 'static,
        M: 'static,
        V: 'static,
    {
        let engine = self;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    inbound = engine.messenger.next_inbound() => {
                        let Some(inbound) = inbound else { break };
                        let from = inbound.from.clone();
                        let message = inbound.message.clone();
                        let reply = engine.handle_protocol_update(&from, message).await;
                        inbound.respond(reply);
                    }
                }
            }
            tracing::debug!("inbound message loop stopped");
        })
    }

    /// Signs a withdrawal commitment with this participant's key.
    pub async fn sign_withdrawal_commitment(
        &self,
        mut commitment: WithdrawCommitment,
    ) -> Result<WithdrawCommitment, EngineError> {
        let address = self.signer.address();
        let role = if address == commitment.alice {
            ChannelRole::Alice
        } else if address == commitment.bob {
            ChannelRole::Bob
        } else {
            return Err(EngineError::Withdrawal(format!(
                "{address} is not a party to this withdrawal"
            )));
        };
        let signature = self.signer.sign_commitment(commitment.hash_to_sign()).await?;
        match role {
            ChannelRole::Alice => commitment.alice_signature = Some(signature),
            ChannelRole::Bob => commitment.bob_signature = Some(signature),
        }
        Ok(commitment)
    }

    /// Persists a withdrawal commitment for later reconciliation.
    pub async fn save_withdrawal_commitment(
        &self,
        transfer_id: B256,
        commitment: &WithdrawCommitment,
    ) -> Result<(), EngineError> {
        Ok(self
            .store
            .save_withdrawal_commitment(transfer_id, commitment)
            .await?)
    }

    /// Whether the channel contract has already executed this withdrawal.
    pub async fn withdrawal_recorded(
        &self,
        commitment: &WithdrawCommitment,
        chain_id: u64,
    ) -> Result<bool, EngineError> {
        Ok(self
            .reader
            .get_withdrawal_transaction_record(commitment, commitment.channel_address, chain_id)
            .await?)
    }

    /// Re-reads the on-chain dispute record and mirrors it into the stored
    /// channel state.
    pub async fn refresh_dispute(&self, channel: Address) -> Result<ChannelState, EngineError> {
        let ttl = self.lock_ttl_for(channel).await;
        let _guard = self
            .locks
            .acquire(channel, ttl)
            .await
            .ok_or(EngineError::LockTimeout { channel, ttl })?;
        let (state, _) = self.load_channel(channel).await?;
        let mut state = state.ok_or_else(|| {
            EngineError::validation(
                UpdateType::Setup,
                channel,
                crate::error::ValidationError::ChannelNotFound(channel),
            )
        })?;
        let dispute = self
            .reader
            .get_channel_dispute(channel, state.network_context.chain_id)
            .await?;
        let in_dispute = dispute.is_some();
        if in_dispute != state.in_dispute {
            state.in_dispute = in_dispute;
            self.store
                .save_channel_state(&state, None)
                .await
                .map_err(|source| EngineError::SaveChannelFailed { channel, source })?;
            tracing::info!(channel = %channel, in_dispute, "updated dispute mirror");
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Internals shared by the outbound, inbound, and sync flows.
    // ------------------------------------------------------------------

    pub(crate) fn signer(&self) -> &ChannelSigner {
        &self.signer
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn reader(&self) -> &C {
        &self.reader
    }

    pub(crate) fn messenger(&self) -> &M {
        &self.messenger
    }

    pub(crate) fn external(&self) -> &V {
        &self.external
    }

    pub(crate) fn locks(&self) -> &ChannelLocks {
        &self.locks
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Loads a channel and its active transfers, applying the one-time
    /// asset-id merge migration if the stored record needs it.
    pub(crate) async fn load_channel(
        &self,
        channel: Address,
    ) -> Result<(Option<ChannelState>, Vec<Transfer>), EngineError> {
        let mut state = self.store.get_channel_state(channel).await?;
        if let Some(state) = &mut state
            && state.normalize_asset_ids()
        {
            tracing::info!(channel = %channel, "merged duplicate asset ids on load");
            self.store
                .save_channel_state(state, None)
                .await
                .map_err(|source| EngineError::SaveChannelFailed { channel, source })?;
        }
        let active = if state.is_some() {
            self.store.get_active_transfers(channel).await?
        } else {
            Vec::new()
        };
        Ok((state, active))
    }

    /// The protocol message timeout (and lock TTL) for a channel: a tenth of
    /// its dispute window, or the configured default before setup.
    pub(crate) async fn lock_ttl_for(&self, channel: Address) -> Duration {
        match self.store.get_channel_state(channel).await {
            Ok(Some(state)) => self.config.message_timeout_for(state.timeout),
            _ => self.config.default_message_timeout(),
        }
    }

    pub(crate) fn emit_update_event(
        &self,
        channel: &ChannelState,
        transfer: Option<&Transfer>,
        update_type: UpdateType,
    ) {
        let event = match (update_type, transfer) {
            (UpdateType::Setup, _) => EngineEvent::ChannelSetup {
                channel: channel.clone(),
            },
            (UpdateType::Deposit, _) => EngineEvent::ChannelDeposited {
                channel: channel.clone(),
                asset_id: channel
                    .latest_update
                    .as_ref()
                    .map(|u| u.asset_id)
                    .unwrap_or(Address::ZERO),
            },
            (UpdateType::Create, Some(transfer)) => EngineEvent::TransferCreated {
                channel: channel.clone(),
                transfer: transfer.clone(),
            },
            (UpdateType::Resolve, Some(transfer)) => EngineEvent::TransferResolved {
                channel: channel.clone(),
                transfer: transfer.clone(),
            },
            // Create/resolve always carry their transfer; nothing to emit
            // if an implementation slips.
            _ => return,
        };
        self.events.publish(event);
    }
}
