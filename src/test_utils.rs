//! In-memory ledgers and stores for exercising whole relay cycles

use crate::chain::contracts::{decode_call, BRIDGE_ABI, MULTISIG_ABI};
use crate::chain::{DestinationChain, SourceChain};
use crate::checkpoint::{CheckpointName, CheckpointStore};
use crate::config::CheckpointPolicy;
use crate::error::{FederatorError, FederatorResult};
use crate::events::{TransferEvent, TransferIdentity};
use crate::relay::{EventScanner, Federator, IdempotencyGuard, MultisigReconciler, TransferVoter};
use crate::tx::TransactionSender;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub fn main_token() -> Address {
    Address::repeat_byte(0x71)
}

pub fn side_token() -> Address {
    Address::repeat_byte(0x72)
}

pub fn side_bridge() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn multisig() -> Address {
    Address::repeat_byte(0xc2)
}

pub fn transfer_event(
    block_number: u64,
    log_index: u32,
    receiver: Address,
    amount: u64,
) -> TransferEvent {
    TransferEvent {
        block_number,
        block_hash: H256::from_low_u64_be(block_number),
        tx_hash: H256::from_low_u64_be(block_number * 1_000 + log_index as u64),
        log_index,
        original_receiver: receiver,
        amount: U256::from(amount),
        symbol: "X".to_string(),
        token_address: main_token(),
    }
}

#[derive(Debug, Clone)]
pub struct Proposal {
    pub destination: Address,
    pub data: Bytes,
    pub confirmed_by: HashSet<Address>,
    pub executed: bool,
}

#[derive(Debug, Clone)]
pub struct SentTx {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct LedgerState {
    pub head: u64,
    pub events: Vec<TransferEvent>,
    pub mapping: HashMap<Address, Address>,
    pub processed: HashSet<TransferIdentity>,
    pub proposals: Vec<Proposal>,
    /// Confirmations needed before a proposal executes
    pub quorum: usize,
    pub sent: Vec<SentTx>,
    /// Reject every send once this many have been accepted
    pub fail_sends_after: Option<usize>,
}

/// Mainchain bridge, sidechain bridge and multisig in one process
pub struct FakeLedger {
    pub state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new(head: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                head,
                events: Vec::new(),
                mapping: HashMap::new(),
                processed: HashSet::new(),
                proposals: Vec::new(),
                quorum: 1,
                sent: Vec::new(),
                fail_sends_after: None,
            }),
        })
    }

    pub fn with_state(&self, f: impl FnOnce(&mut LedgerState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn submissions(&self) -> usize {
        self.count_calls("submitTransaction")
    }

    pub fn confirmations_sent(&self) -> Vec<U256> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter_map(|tx| decode_call(&MULTISIG_ABI, "confirmTransaction", &tx.data).ok())
            .filter_map(|args| args.into_iter().next().and_then(Token::into_uint))
            .collect()
    }

    fn count_calls(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|tx| decode_call(&MULTISIG_ABI, name, &tx.data).is_ok())
            .count()
    }

    fn apply(&self, from: Address, to: Address, data: Bytes) -> FederatorResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_sends_after {
            if state.sent.len() >= limit {
                return Err(FederatorError::Transaction("injected send failure".to_string()));
            }
        }
        if to != multisig() {
            return Err(FederatorError::Transaction(format!("unexpected target {:?}", to)));
        }
        state.sent.push(SentTx {
            from,
            to,
            data: data.clone(),
        });

        let id = if let Ok(args) = decode_call(&MULTISIG_ABI, "submitTransaction", &data) {
            let mut args = args.into_iter();
            let destination = args.next().and_then(Token::into_address).unwrap_or_default();
            let _value = args.next();
            let inner = args.next().and_then(Token::into_bytes).unwrap_or_default();
            state.proposals.push(Proposal {
                destination,
                data: Bytes::from(inner),
                confirmed_by: HashSet::from([from]),
                executed: false,
            });
            state.proposals.len() - 1
        } else {
            let args = decode_call(&MULTISIG_ABI, "confirmTransaction", &data)?;
            let id = args
                .into_iter()
                .next()
                .and_then(Token::into_uint)
                .ok_or_else(|| FederatorError::Contract("confirm without id".to_string()))?
                .as_usize();
            state
                .proposals
                .get_mut(id)
                .ok_or_else(|| FederatorError::Contract(format!("no proposal {}", id)))?
                .confirmed_by
                .insert(from);
            id
        };

        let quorum = state.quorum;
        let proposal = state.proposals[id].clone();
        if !proposal.executed && proposal.confirmed_by.len() >= quorum {
            let identity = accepted_identity(&proposal.data)?;
            state.processed.insert(identity);
            state.proposals[id].executed = true;
        }
        Ok(())
    }
}

/// Identity carried by an `acceptTransfer` payload
fn accepted_identity(data: &[u8]) -> FederatorResult<TransferIdentity> {
    let args = decode_call(&BRIDGE_ABI, "acceptTransfer", data)?;
    let bad = || FederatorError::Contract("malformed acceptTransfer".to_string());
    let uint = |i: usize| args[i].clone().into_uint().ok_or_else(bad);
    let hash = |i: usize| {
        args[i]
            .clone()
            .into_fixed_bytes()
            .map(|b| H256::from_slice(&b))
            .ok_or_else(bad)
    };

    Ok(TransferIdentity {
        block_number: uint(4)?.as_u64(),
        block_hash: hash(5)?,
        tx_hash: hash(6)?,
        receiver: args[1].clone().into_address().ok_or_else(bad)?,
        amount: uint(2)?,
        log_index: uint(7)?.as_u32(),
    })
}

#[async_trait]
impl SourceChain for FakeLedger {
    async fn head_height(&self) -> FederatorResult<u64> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        token: Address,
    ) -> FederatorResult<Vec<TransferEvent>> {
        let mut events: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| {
                e.token_address == token
                    && e.block_number >= from_block
                    && e.block_number <= to_block
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn mapped_address(&self, account: Address) -> FederatorResult<Address> {
        let state = self.state.lock().unwrap();
        Ok(state.mapping.get(&account).copied().unwrap_or(account))
    }
}

#[async_trait]
impl DestinationChain for FakeLedger {
    fn bridge_address(&self) -> Address {
        side_bridge()
    }

    fn multisig_address(&self) -> Address {
        multisig()
    }

    async fn was_processed(&self, identity: &TransferIdentity) -> FederatorResult<bool> {
        Ok(self.state.lock().unwrap().processed.contains(identity))
    }

    async fn transaction_count(&self) -> FederatorResult<u64> {
        Ok(self.state.lock().unwrap().proposals.len() as u64)
    }

    async fn transaction_ids(
        &self,
        from: u64,
        to: u64,
        pending: bool,
        executed: bool,
    ) -> FederatorResult<Vec<U256>> {
        let state = self.state.lock().unwrap();
        Ok((from..to.min(state.proposals.len() as u64))
            .filter(|id| {
                let p = &state.proposals[*id as usize];
                (pending && !p.executed) || (executed && p.executed)
            })
            .map(U256::from)
            .collect())
    }

    async fn is_confirmed_by(&self, id: U256, owner: Address) -> FederatorResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .proposals
            .get(id.as_usize())
            .map(|p| p.confirmed_by.contains(&owner))
            .unwrap_or(false))
    }
}

/// A federator's signing identity on a [`FakeLedger`]
pub struct FakeSender {
    pub ledger: Arc<FakeLedger>,
    pub address: Address,
}

#[async_trait]
impl TransactionSender for FakeSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn send(
        &self,
        to: Address,
        data: Bytes,
        _value: U256,
    ) -> FederatorResult<TransactionReceipt> {
        self.ledger.apply(self.address, to, data)?;
        Ok(TransactionReceipt {
            status: Some(U64::from(1)),
            ..Default::default()
        })
    }
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    values: Mutex<HashMap<CheckpointName, u64>>,
}

impl MemoryCheckpointStore {
    pub fn get(&self, name: CheckpointName) -> Option<u64> {
        self.values.lock().unwrap().get(&name).copied()
    }

    pub fn set(&self, name: CheckpointName, value: u64) {
        self.values.lock().unwrap().insert(name, value);
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, name: CheckpointName) -> FederatorResult<Option<u64>> {
        Ok(self.get(name))
    }

    async fn save(&self, name: CheckpointName, value: u64) -> FederatorResult<()> {
        self.set(name, value);
        Ok(())
    }
}

/// Wire a federator with 10 confirmations and start block 0 against `ledger`
pub fn federator(
    ledger: &Arc<FakeLedger>,
    agent: Address,
    checkpoints: &Arc<MemoryCheckpointStore>,
    policy: CheckpointPolicy,
) -> Federator {
    let sender: Arc<dyn TransactionSender> = Arc::new(FakeSender {
        ledger: ledger.clone(),
        address: agent,
    });
    let store: Arc<dyn CheckpointStore> = checkpoints.clone();

    Federator::new(
        MultisigReconciler::new(ledger.clone(), sender.clone(), store.clone()),
        EventScanner::new(ledger.clone(), store.clone(), 10, 0, main_token()),
        IdempotencyGuard::new(ledger.clone()),
        TransferVoter::new(ledger.clone(), ledger.clone(), sender, side_token()),
        store,
        policy,
    )
}
