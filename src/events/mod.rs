//! Transfer event types and parsing
//!
//! `TransferEvent` is built from a raw `Cross` log emitted by the mainchain
//! bridge. Every field is required; a log missing any of them is rejected
//! rather than relayed with placeholder values.

use crate::chain::contracts::CROSS_EVENT;
use crate::error::{FederatorError, FederatorResult};

use ethers::abi::{RawLog, Token};
use ethers::types::{Address, Log, H256, U256};
use serde::Serialize;
use std::fmt;

/// A finalized `Cross` event read from the mainchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    pub block_number: u64,
    pub block_hash: H256,
    pub tx_hash: H256,
    pub log_index: u32,
    pub original_receiver: Address,
    pub amount: U256,
    pub symbol: String,
    pub token_address: Address,
}

impl TransferEvent {
    /// Parse a mainchain log into a transfer event
    pub fn from_log(log: &Log) -> FederatorResult<Self> {
        if log.removed == Some(true) {
            return Err(FederatorError::EventParsing(format!(
                "log {:?} was removed by a reorg",
                log.transaction_hash
            )));
        }

        let block_number = log
            .block_number
            .ok_or_else(|| missing("blockNumber"))?
            .as_u64();
        let block_hash = log.block_hash.ok_or_else(|| missing("blockHash"))?;
        let tx_hash = log.transaction_hash.ok_or_else(|| missing("transactionHash"))?;
        let log_index = log.log_index.ok_or_else(|| missing("logIndex"))?;
        if log_index > U256::from(u32::MAX) {
            return Err(FederatorError::EventParsing(format!(
                "logIndex {} out of range",
                log_index
            )));
        }

        let parsed = CROSS_EVENT
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .map_err(|e| FederatorError::EventParsing(format!("Cross in {:?}: {}", tx_hash, e)))?;

        let mut token_address = None;
        let mut original_receiver = None;
        let mut amount = None;
        let mut symbol = None;
        for param in parsed.params {
            match (param.name.as_str(), param.value) {
                ("_tokenAddress", Token::Address(a)) => token_address = Some(a),
                ("_to", Token::Address(a)) => original_receiver = Some(a),
                ("_amount", Token::Uint(v)) => amount = Some(v),
                ("_symbol", Token::String(s)) => symbol = Some(s),
                _ => {}
            }
        }

        Ok(Self {
            block_number,
            block_hash,
            tx_hash,
            log_index: log_index.as_u32(),
            original_receiver: original_receiver.ok_or_else(|| missing("_to"))?,
            amount: amount.ok_or_else(|| missing("_amount"))?,
            symbol: symbol.ok_or_else(|| missing("_symbol"))?,
            token_address: token_address.ok_or_else(|| missing("_tokenAddress"))?,
        })
    }
}

fn missing(field: &str) -> FederatorError {
    FederatorError::EventParsing(format!("Cross log without {}", field))
}

/// A transfer with its sidechain receiver resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTransfer {
    pub event: TransferEvent,
    pub mapped_receiver: Address,
}

impl ResolvedTransfer {
    /// The tuple the sidechain bridge uses to detect duplicates
    pub fn identity(&self) -> TransferIdentity {
        TransferIdentity {
            block_number: self.event.block_number,
            block_hash: self.event.block_hash,
            tx_hash: self.event.tx_hash,
            receiver: self.mapped_receiver,
            amount: self.event.amount,
            log_index: self.event.log_index,
        }
    }
}

/// Duplicate-detection key of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransferIdentity {
    pub block_number: u64,
    pub block_hash: H256,
    pub tx_hash: H256,
    pub receiver: Address,
    pub amount: U256,
    pub log_index: u32,
}

impl fmt::Display for TransferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}#{} (block {}) -> {:?} amount {}",
            self.tx_hash, self.log_index, self.block_number, self.receiver, self.amount
        )
    }
}
