//! Read-only view of on-chain facts.
//!
//! [`ChainReader`] is the only window the protocol core has onto the chain.
//! Every operation may fail with a categorized [`ChainError`] and is wrapped
//! in a bounded retry (transient transport failures only; contract-level
//! rejections surface immediately).
//!
//! # Predicate evaluation
//!
//! `create` and `resolve` evaluate a transfer definition's pure view
//! functions. When a [`TransferEvaluator`] is installed and the definition's
//! bytecode is cached, the predicate runs locally without an RPC round-trip;
//! otherwise the reader falls back to a live `eth_call`.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use strand_types::codec;
use strand_types::commitment::WithdrawCommitment;
use strand_types::config::RpcConfig;
use strand_types::{Balance, RegisteredTransfer, Transfer};

use crate::contracts::{
    BalanceSol, IChannelFactory, IChannelMastercopy, IERC20, ITransferDefinition,
    ITransferRegistry, WithdrawDataSol,
};
use crate::error::ChainError;
use crate::rpc::rpc_client;

/// An on-chain dispute record for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDispute {
    pub channel_state_hash: B256,
    pub nonce: U256,
    pub merkle_root: B256,
    pub consensus_expiry: U256,
    pub defund_expiry: U256,
}

/// Read-only chain operations the protocol core consumes.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Deployed bytecode at `address`; empty when nothing is deployed.
    async fn get_code(&self, address: Address, chain_id: u64) -> Result<Bytes, ChainError>;

    /// Cumulative factory-routed deposits credited to Alice for `asset_id`.
    ///
    /// Zero when the channel contract is not deployed yet: before deployment
    /// Alice can only fund through `createChannelAndDepositAlice`.
    async fn get_total_deposits_alice(
        &self,
        channel: Address,
        chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError>;

    /// Cumulative deposits credited to Bob for `asset_id`.
    ///
    /// When the channel contract is not deployed, every plain send to the
    /// channel address counts toward Bob, so this returns the address's
    /// on-chain balance.
    async fn get_total_deposits_bob(
        &self,
        channel: Address,
        chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError>;

    /// Deterministic channel address derivation via the factory.
    async fn get_channel_address(
        &self,
        alice: Address,
        bob: Address,
        factory: Address,
        chain_id: u64,
    ) -> Result<Address, ChainError>;

    async fn get_registered_transfer_by_name(
        &self,
        name: &str,
        registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError>;

    async fn get_registered_transfer_by_definition(
        &self,
        definition: Address,
        registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError>;

    async fn get_registered_transfers(
        &self,
        registry: Address,
        chain_id: u64,
    ) -> Result<Vec<RegisteredTransfer>, ChainError>;

    /// Evaluates the definition's `create(encodedBalance, encodedState)`
    /// predicate against a proposed initial state and balance.
    async fn create(
        &self,
        initial_state: &Value,
        balance: &Balance,
        definition: Address,
        registry: Address,
        chain_id: u64,
    ) -> Result<bool, ChainError>;

    /// Evaluates the definition's `resolve` function for a transfer whose
    /// resolver is populated, returning the post-resolution balance.
    async fn resolve(&self, transfer: &Transfer, chain_id: u64) -> Result<Balance, ChainError>;

    async fn get_channel_dispute(
        &self,
        channel: Address,
        chain_id: u64,
    ) -> Result<Option<ChannelDispute>, ChainError>;

    /// Balance of `holder` in `asset_id` (the native asset when `asset_id`
    /// is zero).
    async fn get_onchain_balance(
        &self,
        asset_id: Address,
        holder: Address,
        chain_id: u64,
    ) -> Result<U256, ChainError>;

    /// Whether the channel contract has already executed this withdrawal.
    async fn get_withdrawal_transaction_record(
        &self,
        commitment: &WithdrawCommitment,
        channel: Address,
        chain_id: u64,
    ) -> Result<bool, ChainError>;
}

/// Local evaluation of transfer predicates against cached bytecode.
///
/// `None` means the evaluator cannot handle this definition (unknown
/// bytecode, unsupported opcode set) and the reader should fall back to
/// `eth_call`.
pub trait TransferEvaluator: Send + Sync {
    fn evaluate_create(
        &self,
        definition: Address,
        code: &Bytes,
        encoded_balance: &[u8],
        encoded_state: &[u8],
    ) -> Option<Result<bool, ChainError>>;

    fn evaluate_resolve(
        &self,
        definition: Address,
        code: &Bytes,
        encoded_balance: &[u8],
        encoded_state: &[u8],
        encoded_resolver: &[u8],
    ) -> Option<Result<Balance, ChainError>>;
}

/// Bounded retry around a chain read. Only retryable (transport) failures
/// are attempted again; the last error is wrapped in
/// [`ChainError::MaxRetries`] once the budget is exhausted.
pub(crate) async fn with_retries<T, F, Fut>(
    max_retries: u32,
    op: &'static str,
    f: F,
) -> Result<T, ChainError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let attempts = max_retries.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() => {
                tracing::debug!(op, attempt, %error, "retryable chain read failure");
                last = Some(error);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
    Err(ChainError::MaxRetries {
        op,
        attempts,
        last: Box::new(last.expect("at least one attempt ran")),
    })
}

/// Production [`ChainReader`] over alloy JSON-RPC providers.
///
/// The registered-transfer list is cached per `(chain, registry)` on first
/// use and invalidated only on restart. Transfer-definition bytecode is
/// cached for the local evaluator; channel bytecode is never cached because
/// deployment state changes.
pub struct Eip155ChainReader {
    providers: HashMap<u64, RootProvider>,
    registered: DashMap<(u64, Address), Arc<Vec<RegisteredTransfer>>>,
    definition_code: DashMap<(u64, Address), Bytes>,
    evaluator: Option<Arc<dyn TransferEvaluator>>,
    max_retries: u32,
}

impl Eip155ChainReader {
    /// Builds a reader from per-chain RPC configurations.
    pub fn new(
        chains: &HashMap<u64, Vec<RpcConfig>>,
        max_retries: u32,
    ) -> Result<Self, ChainError> {
        let mut providers = HashMap::with_capacity(chains.len());
        for (chain_id, rpc) in chains {
            let client = rpc_client(*chain_id, rpc)?;
            providers.insert(*chain_id, RootProvider::new(client));
        }
        Ok(Eip155ChainReader {
            providers,
            registered: DashMap::new(),
            definition_code: DashMap::new(),
            evaluator: None,
            max_retries,
        })
    }

    /// Installs a local predicate evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn TransferEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    fn provider(&self, chain_id: u64) -> Result<&RootProvider, ChainError> {
        self.providers
            .get(&chain_id)
            .ok_or(ChainError::UnsupportedChain(chain_id))
    }

    async fn registered_transfers(
        &self,
        registry: Address,
        chain_id: u64,
    ) -> Result<Arc<Vec<RegisteredTransfer>>, ChainError> {
        if let Some(cached) = self.registered.get(&(chain_id, registry)) {
            return Ok(cached.clone());
        }
        let provider = self.provider(chain_id)?.clone();
        let fetched = with_retries(self.max_retries, "get_registered_transfers", || {
            let provider = provider.clone();
            async move {
                let records = ITransferRegistry::new(registry, provider)
                    .getTransferDefinitions()
                    .call()
                    .await?;
                Ok(records
                    .into_iter()
                    .map(RegisteredTransfer::from)
                    .collect::<Vec<_>>())
            }
        })
        .await?;
        let fetched = Arc::new(fetched);
        self.registered.insert((chain_id, registry), fetched.clone());
        Ok(fetched)
    }

    /// Bytecode of a transfer definition, cached forever (definitions are
    /// immutable singletons).
    async fn cached_definition_code(
        &self,
        definition: Address,
        chain_id: u64,
    ) -> Result<Bytes, ChainError> {
        if let Some(code) = self.definition_code.get(&(chain_id, definition)) {
            return Ok(code.clone());
        }
        let code = self.get_code(definition, chain_id).await?;
        self.definition_code
            .insert((chain_id, definition), code.clone());
        Ok(code)
    }
}

#[async_trait]
impl ChainReader for Eip155ChainReader {
    async fn get_code(&self, address: Address, chain_id: u64) -> Result<Bytes, ChainError> {
        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "get_code", || {
            let provider = provider.clone();
            async move { provider.get_code_at(address).await.map_err(ChainError::from) }
        })
        .await
    }

    async fn get_total_deposits_alice(
        &self,
        channel: Address,
        chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError> {
        let code = self.get_code(channel, chain_id).await?;
        if code.is_empty() {
            return Ok(U256::ZERO);
        }
        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "get_total_deposits_alice", || {
            let provider = provider.clone();
            async move {
                IChannelMastercopy::new(channel, provider)
                    .getTotalDepositsAlice(asset_id)
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await
    }

    async fn get_total_deposits_bob(
        &self,
        channel: Address,
        chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError> {
        let code = self.get_code(channel, chain_id).await?;
        if code.is_empty() {
            return self.get_onchain_balance(asset_id, channel, chain_id).await;
        }
        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "get_total_deposits_bob", || {
            let provider = provider.clone();
            async move {
                IChannelMastercopy::new(channel, provider)
                    .getTotalDepositsBob(asset_id)
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await
    }

    async fn get_channel_address(
        &self,
        alice: Address,
        bob: Address,
        factory: Address,
        chain_id: u64,
    ) -> Result<Address, ChainError> {
        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "get_channel_address", || {
            let provider = provider.clone();
            async move {
                IChannelFactory::new(factory, provider)
                    .getChannelAddress(alice, bob)
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await
    }

    async fn get_registered_transfer_by_name(
        &self,
        name: &str,
        registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError> {
        let registered = self.registered_transfers(registry, chain_id).await?;
        registered
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| {
                ChainError::ContractCall(format!(
                    "no transfer named {name:?} registered on chain {chain_id}"
                ))
            })
    }

    async fn get_registered_transfer_by_definition(
        &self,
        definition: Address,
        registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError> {
        let registered = self.registered_transfers(registry, chain_id).await?;
        registered
            .iter()
            .find(|t| t.definition == definition)
            .cloned()
            .ok_or(ChainError::TransferNotRegistered {
                definition,
                chain_id,
            })
    }

    async fn get_registered_transfers(
        &self,
        registry: Address,
        chain_id: u64,
    ) -> Result<Vec<RegisteredTransfer>, ChainError> {
        Ok(self.registered_transfers(registry, chain_id).await?.to_vec())
    }

    async fn create(
        &self,
        initial_state: &Value,
        balance: &Balance,
        definition: Address,
        registry: Address,
        chain_id: u64,
    ) -> Result<bool, ChainError> {
        let registered = self
            .get_registered_transfer_by_definition(definition, registry, chain_id)
            .await?;
        let encoded_state = codec::encode_payload(&registered.state_encoding, initial_state)?;
        let encoded_balance = BalanceSol::from(balance).abi_encode();

        if let Some(evaluator) = &self.evaluator {
            let code = self.cached_definition_code(definition, chain_id).await?;
            if !code.is_empty()
                && let Some(result) =
                    evaluator.evaluate_create(definition, &code, &encoded_balance, &encoded_state)
            {
                return result;
            }
        }

        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "create", || {
            let provider = provider.clone();
            let encoded_balance = encoded_balance.clone();
            let encoded_state = encoded_state.clone();
            async move {
                ITransferDefinition::new(definition, provider)
                    .create(encoded_balance.into(), encoded_state)
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await
    }

    async fn resolve(&self, transfer: &Transfer, chain_id: u64) -> Result<Balance, ChainError> {
        let resolver = transfer.transfer_resolver.as_ref().ok_or_else(|| {
            ChainError::ContractCall("transfer has no resolver to evaluate".to_string())
        })?;
        let encoded_state =
            codec::encode_payload(&transfer.transfer_encodings.state, &transfer.transfer_state)?;
        let encoded_resolver =
            codec::encode_payload(&transfer.transfer_encodings.resolver, resolver)?;
        let encoded_balance = BalanceSol::from(&transfer.balance).abi_encode();
        let definition = transfer.transfer_definition;

        if let Some(evaluator) = &self.evaluator {
            let code = self.cached_definition_code(definition, chain_id).await?;
            if !code.is_empty()
                && let Some(result) = evaluator.evaluate_resolve(
                    definition,
                    &code,
                    &encoded_balance,
                    &encoded_state,
                    &encoded_resolver,
                )
            {
                return result;
            }
        }

        let provider = self.provider(chain_id)?.clone();
        with_retries(self.max_retries, "resolve", || {
            let provider = provider.clone();
            let encoded_balance = encoded_balance.clone();
            let encoded_state = encoded_state.clone();
            let encoded_resolver = encoded_resolver.clone();
            async move {
                let resolved = ITransferDefinition::new(definition, provider)
                    .resolve(encoded_balance.into(), encoded_state, encoded_resolver)
                    .call()
                    .await?;
                Ok(Balance::from(resolved))
            }
        })
        .await
    }

    async fn get_channel_dispute(
        &self,
        channel: Address,
        chain_id: u64,
    ) -> Result<Option<ChannelDispute>, ChainError> {
        let code = self.get_code(channel, chain_id).await?;
        if code.is_empty() {
            return Ok(None);
        }
        let provider = self.provider(chain_id)?.clone();
        let record = with_retries(self.max_retries, "get_channel_dispute", || {
            let provider = provider.clone();
            async move {
                IChannelMastercopy::new(channel, provider)
                    .getChannelDispute()
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await?;
        if record.consensusExpiry.is_zero() {
            return Ok(None);
        }
        Ok(Some(ChannelDispute {
            channel_state_hash: record.channelStateHash,
            nonce: record.nonce,
            merkle_root: record.merkleRoot,
            consensus_expiry: record.consensusExpiry,
            defund_expiry: record.defundExpiry,
        }))
    }

    async fn get_onchain_balance(
        &self,
        asset_id: Address,
        holder: Address,
        chain_id: u64,
    ) -> Result<U256, ChainError> {
        let provider = self.provider(chain_id)?.clone();
        if asset_id == Address::ZERO {
            with_retries(self.max_retries, "get_onchain_balance", || {
                let provider = provider.clone();
                async move { provider.get_balance(holder).await.map_err(ChainError::from) }
            })
            .await
        } else {
            with_retries(self.max_retries, "get_onchain_balance", || {
                let provider = provider.clone();
                async move {
                    IERC20::new(asset_id, provider)
                        .balanceOf(holder)
                        .call()
                        .await
                        .map_err(ChainError::from)
                }
            })
            .await
        }
    }

    async fn get_withdrawal_transaction_record(
        &self,
        commitment: &WithdrawCommitment,
        channel: Address,
        chain_id: u64,
    ) -> Result<bool, ChainError> {
        let provider = self.provider(chain_id)?.clone();
        let data = WithdrawDataSol::from(commitment);
        with_retries(self.max_retries, "get_withdrawal_transaction_record", || {
            let provider = provider.clone();
            let data = data.clone();
            async move {
                IChannelMastercopy::new(channel, provider)
                    .getWithdrawalTransactionRecord(data)
                    .call()
                    .await
                    .map_err(ChainError::from)
            }
        })
        .await
    }
}
