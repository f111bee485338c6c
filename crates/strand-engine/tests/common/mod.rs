//! Two-engine test harness: in-memory stores, an in-process messenger pair,
//! and a scripted chain reader with hashlock-transfer semantics.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use strand_chain::{ChainError, ChainReader, ChannelDispute};
use strand_engine::{
    InboundProtocolUpdate, MessagingError, ProtocolEngine, ProtocolMessenger, memory,
};
use strand_store::InMemoryStore;
use strand_types::channel::NetworkContext;
use strand_types::codec;
use strand_types::commitment::WithdrawCommitment;
use strand_types::config::EngineConfig;
use strand_types::identifiers::PublicIdentifier;
use strand_types::protocol::{ProtocolReply, ProtocolUpdate};
use strand_types::signing::ChannelSigner;
use strand_types::{Balance, RegisteredTransfer, Transfer};

pub const CHAIN_ID: u64 = 1337;
pub const HASHLOCK_DEFINITION: Address = Address::repeat_byte(0xde);
pub const HASHLOCK_STATE_ENCODING: &str = "tuple(bytes32 lockHash, uint256 expiry)";
pub const HASHLOCK_RESOLVER_ENCODING: &str = "tuple(bytes32 preImage)";

pub fn network_context() -> NetworkContext {
    NetworkContext {
        chain_id: CHAIN_ID,
        channel_factory_address: Address::repeat_byte(0xfa),
        transfer_registry_address: Address::repeat_byte(0xe9),
    }
}

pub fn hashlock_registered() -> RegisteredTransfer {
    RegisteredTransfer {
        name: "Hashlock".to_string(),
        definition: HASHLOCK_DEFINITION,
        state_encoding: HASHLOCK_STATE_ENCODING.to_string(),
        resolver_encoding: HASHLOCK_RESOLVER_ENCODING.to_string(),
        encoded_cancel: Bytes::from(vec![0u8; 32]),
    }
}

pub fn preimage() -> B256 {
    B256::repeat_byte(0x50)
}

pub fn lock_hash() -> B256 {
    keccak256(preimage())
}

pub fn hashlock_state() -> Value {
    serde_json::json!({ "lockHash": format!("{}", lock_hash()), "expiry": "0" })
}

pub fn hashlock_resolver(preimage: B256) -> Value {
    serde_json::json!({ "preImage": format!("{preimage}") })
}

/// Scripted chain reader. Deposits, deployment, and predicate outcomes are
/// all configurable; `resolve` implements real hashlock semantics unless
/// overridden.
pub struct MockChainReader {
    pub deployed: DashMap<Address, bool>,
    /// `(channel, asset)` -> cumulative total.
    pub deposits_alice: DashMap<(Address, Address), U256>,
    pub deposits_bob: DashMap<(Address, Address), U256>,
    /// `(asset, holder)` -> balance.
    pub onchain_balances: DashMap<(Address, Address), U256>,
    pub registered: Vec<RegisteredTransfer>,
    pub create_result: AtomicBool,
    pub resolve_override: Mutex<Option<Balance>>,
}

impl MockChainReader {
    pub fn new() -> Self {
        MockChainReader {
            deployed: DashMap::new(),
            deposits_alice: DashMap::new(),
            deposits_bob: DashMap::new(),
            onchain_balances: DashMap::new(),
            registered: vec![hashlock_registered()],
            create_result: AtomicBool::new(true),
            resolve_override: Mutex::new(None),
        }
    }

    pub fn deploy(&self, channel: Address) {
        self.deployed.insert(channel, true);
    }

    pub fn set_alice_deposits(&self, channel: Address, asset: Address, total: U256) {
        self.deposits_alice.insert((channel, asset), total);
    }

    pub fn set_bob_deposits(&self, channel: Address, asset: Address, total: U256) {
        self.deposits_bob.insert((channel, asset), total);
    }

    fn is_deployed(&self, channel: Address) -> bool {
        self.deployed.get(&channel).map(|d| *d).unwrap_or(false)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_code(&self, address: Address, _chain_id: u64) -> Result<Bytes, ChainError> {
        if self.is_deployed(address) {
            Ok(Bytes::from(vec![0x60, 0x80]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn get_total_deposits_alice(
        &self,
        channel: Address,
        _chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError> {
        // Undeployed channels cannot have factory-routed deposits.
        if !self.is_deployed(channel) {
            return Ok(U256::ZERO);
        }
        Ok(self
            .deposits_alice
            .get(&(channel, asset_id))
            .map(|v| *v)
            .unwrap_or(U256::ZERO))
    }

    async fn get_total_deposits_bob(
        &self,
        channel: Address,
        chain_id: u64,
        asset_id: Address,
    ) -> Result<U256, ChainError> {
        if !self.is_deployed(channel) {
            // Every plain send to an undeployed channel counts toward Bob.
            return self.get_onchain_balance(asset_id, channel, chain_id).await;
        }
        Ok(self
            .deposits_bob
            .get(&(channel, asset_id))
            .map(|v| *v)
            .unwrap_or(U256::ZERO))
    }

    async fn get_channel_address(
        &self,
        alice: Address,
        bob: Address,
        factory: Address,
        chain_id: u64,
    ) -> Result<Address, ChainError> {
        let mut buf = Vec::with_capacity(68);
        buf.extend_from_slice(alice.as_slice());
        buf.extend_from_slice(bob.as_slice());
        buf.extend_from_slice(factory.as_slice());
        buf.extend_from_slice(&chain_id.to_be_bytes());
        let digest = keccak256(&buf);
        Ok(Address::from_slice(&digest[12..]))
    }

    async fn get_registered_transfer_by_name(
        &self,
        name: &str,
        _registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError> {
        self.registered
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| {
                ChainError::ContractCall(format!("no transfer named {name:?} on {chain_id}"))
            })
    }

    async fn get_registered_transfer_by_definition(
        &self,
        definition: Address,
        _registry: Address,
        chain_id: u64,
    ) -> Result<RegisteredTransfer, ChainError> {
        self.registered
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
        _registry: Address,
        _chain_id: u64,
    ) -> Result<Vec<RegisteredTransfer>, ChainError> {
        Ok(self.registered.clone())
    }

    async fn create(
        &self,
        initial_state: &Value,
        _balance: &Balance,
        _definition: Address,
        _registry: Address,
        _chain_id: u64,
    ) -> Result<bool, ChainError> {
        // The state must at least encode; mirrors the eth_call path which
        // would revert on garbage calldata.
        codec::encode_payload(HASHLOCK_STATE_ENCODING, initial_state)?;
        Ok(self.create_result.load(Ordering::SeqCst))
    }

    async fn resolve(&self, transfer: &Transfer, _chain_id: u64) -> Result<Balance, ChainError> {
        if let Some(balance) = self.resolve_override.lock().unwrap().clone() {
            return Ok(balance);
        }
        let resolver = transfer
            .transfer_resolver
            .as_ref()
            .ok_or_else(|| ChainError::ContractCall("missing resolver".to_string()))?;
        let preimage: B256 = resolver["preImage"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ChainError::ContractCall("malformed resolver".to_string()))?;
        let lock_hash: B256 = transfer.transfer_state["lockHash"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ChainError::ContractCall("malformed state".to_string()))?;

        if preimage == B256::ZERO {
            // Cancellation payout: locked balance unchanged.
            return Ok(transfer.balance.clone());
        }
        if keccak256(preimage) == lock_hash {
            // Full payout to the responder slot.
            return Ok(Balance {
                to: transfer.balance.to,
                amount: [U256::ZERO, transfer.balance.total()],
            });
        }
        Err(ChainError::ContractCall("invalid preimage".to_string()))
    }

    async fn get_channel_dispute(
        &self,
        _channel: Address,
        _chain_id: u64,
    ) -> Result<Option<ChannelDispute>, ChainError> {
        Ok(None)
    }

    async fn get_onchain_balance(
        &self,
        asset_id: Address,
        holder: Address,
        _chain_id: u64,
    ) -> Result<U256, ChainError> {
        Ok(self
            .onchain_balances
            .get(&(asset_id, holder))
            .map(|v| *v)
            .unwrap_or(U256::ZERO))
    }

    async fn get_withdrawal_transaction_record(
        &self,
        _commitment: &WithdrawCommitment,
        _channel: Address,
        _chain_id: u64,
    ) -> Result<bool, ChainError> {
        Ok(false)
    }
}

/// Messenger wrapper counting outgoing protocol requests.
pub struct CountingMessenger {
    inner: memory::MemoryMessenger,
    pub sent: AtomicUsize,
}

impl CountingMessenger {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolMessenger for CountingMessenger {
    async fn send_protocol_update(
        &self,
        to: &PublicIdentifier,
        message: ProtocolUpdate,
        timeout: Duration,
    ) -> Result<ProtocolReply, MessagingError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.send_protocol_update(to, message, timeout).await
    }

    async fn next_inbound(&self) -> Option<InboundProtocolUpdate> {
        self.inner.next_inbound().await
    }
}

pub type TestEngine = ProtocolEngine<InMemoryStore, MockChainReader, CountingMessenger>;

pub struct Peer {
    pub engine: Arc<TestEngine>,
    pub store: Arc<InMemoryStore>,
    pub signer: ChannelSigner,
    pub messenger: Arc<CountingMessenger>,
}

impl Peer {
    pub fn identifier(&self) -> PublicIdentifier {
        self.signer.public_identifier().clone()
    }
}

pub struct Harness {
    pub alice: Peer,
    pub bob: Peer,
    pub reader: Arc<MockChainReader>,
}

fn test_signer(byte: u8) -> ChannelSigner {
    let mut key = [0u8; 32];
    key[31] = byte;
    ChannelSigner::from_bytes(&key.into()).unwrap()
}

/// Builds two connected engines over a shared scripted chain, with their
/// inbound loops running.
pub fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let alice_signer = test_signer(0xa1);
    let bob_signer = test_signer(0xb2);
    let (alice_transport, bob_transport) = memory::pair(
        alice_signer.public_identifier().clone(),
        bob_signer.public_identifier().clone(),
    );
    let alice_messenger = Arc::new(CountingMessenger {
        inner: alice_transport,
        sent: AtomicUsize::new(0),
    });
    let bob_messenger = Arc::new(CountingMessenger {
        inner: bob_transport,
        sent: AtomicUsize::new(0),
    });
    let reader = Arc::new(MockChainReader::new());

    let build = |signer: &ChannelSigner,
                 store: &Arc<InMemoryStore>,
                 messenger: &Arc<CountingMessenger>| {
        Arc::new(ProtocolEngine::new(
            signer.clone(),
            store.clone(),
            reader.clone(),
            messenger.clone(),
            EngineConfig::default(),
        ))
    };

    let alice_store = Arc::new(InMemoryStore::new());
    let bob_store = Arc::new(InMemoryStore::new());
    let alice_engine = build(&alice_signer, &alice_store, &alice_messenger);
    let bob_engine = build(&bob_signer, &bob_store, &bob_messenger);
    let _ = alice_engine.clone().serve();
    let _ = bob_engine.clone().serve();

    Harness {
        alice: Peer {
            engine: alice_engine,
            store: alice_store,
            signer: alice_signer,
            messenger: alice_messenger,
        },
        bob: Peer {
            engine: bob_engine,
            store: bob_store,
            signer: bob_signer,
            messenger: bob_messenger,
        },
        reader,
    }
}
