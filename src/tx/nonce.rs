//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking so consecutive sends in one cycle never collide
//! - Release of nonces whose broadcast never reached the node
//! - Resync with the chain after "nonce too low"

use ethers::types::{Address, H256};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct NonceState {
    /// Next nonce to hand out
    current: u64,
    /// Broadcast but not yet mined: nonce -> tx hash
    pending: BTreeMap<u64, H256>,
    /// Nonces below this are used on chain and are never handed out again
    floor: u64,
}

/// Tracks the signing account's nonce on the sidechain
pub struct NonceManager {
    address: Address,
    state: Mutex<NonceState>,
}

impl NonceManager {
    /// Start from the on-chain (pending-inclusive) transaction count
    pub fn new(address: Address, on_chain_nonce: u64) -> Self {
        debug!("Initialized nonce for {:?}: {}", address, on_chain_nonce);
        Self {
            address,
            state: Mutex::new(NonceState {
                current: on_chain_nonce,
                pending: BTreeMap::new(),
                floor: on_chain_nonce,
            }),
        }
    }

    /// Allocate the next nonce
    pub async fn next_nonce(&self) -> u64 {
        let mut state = self.state.lock().await;
        let nonce = state.current;
        state.current += 1;
        debug!("Allocated nonce {}", nonce);
        nonce
    }

    /// Record the hash broadcast with `nonce`
    pub async fn mark_pending(&self, nonce: u64, tx_hash: H256) {
        self.state.lock().await.pending.insert(nonce, tx_hash);
    }

    /// Transaction with `nonce` was mined
    pub async fn confirm(&self, nonce: u64) {
        self.state.lock().await.pending.remove(&nonce);
    }

    /// Broadcast with `nonce` failed; hand it out again if it was the last one
    pub async fn release(&self, nonce: u64) {
        let mut state = self.state.lock().await;
        state.pending.remove(&nonce);
        if nonce >= state.floor && state.current == nonce + 1 {
            state.current = nonce;
        }
    }

    /// Align with the chain's view of the account
    pub async fn sync(&self, on_chain_nonce: u64) {
        let mut state = self.state.lock().await;

        if on_chain_nonce > state.current {
            warn!(
                "Nonce gap detected for {:?}: local {}, chain {}",
                self.address, state.current, on_chain_nonce
            );
        }

        state.pending.retain(|nonce, _| *nonce >= on_chain_nonce);
        state.floor = state.floor.max(on_chain_nonce);
        if state.current < on_chain_nonce {
            state.current = on_chain_nonce;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
