//! Safe block range computation and `Cross` event retrieval

use crate::chain::SourceChain;
use crate::checkpoint::{CheckpointName, CheckpointStore};
use crate::error::FederatorResult;
use crate::events::TransferEvent;

use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one scan, keeping "nothing to do" apart from failures
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// `head - confirmations <= 0`: nothing is final yet
    NotFinal { head: u64 },
    /// The checkpoint is already at or past the last final block
    CaughtUp { from_block: u64, to_block: u64 },
    /// The range was scanned; `events` may be empty
    Scanned {
        from_block: u64,
        to_block: u64,
        events: Vec<TransferEvent>,
    },
}

/// Reads finalized transfer events for the watched token
pub struct EventScanner {
    source: Arc<dyn SourceChain>,
    checkpoints: Arc<dyn CheckpointStore>,
    confirmations: u64,
    start_block: u64,
    token: Address,
}

impl EventScanner {
    pub fn new(
        source: Arc<dyn SourceChain>,
        checkpoints: Arc<dyn CheckpointStore>,
        confirmations: u64,
        start_block: u64,
        token: Address,
    ) -> Self {
        Self {
            source,
            checkpoints,
            confirmations,
            start_block,
            token,
        }
    }

    /// Last block old enough to be processed, if any
    pub fn final_block(&self, head: u64) -> Option<u64> {
        head.checked_sub(self.confirmations).filter(|b| *b > 0)
    }

    pub async fn scan(&self) -> FederatorResult<ScanOutcome> {
        let head = self.source.head_height().await?;
        let Some(to_block) = self.final_block(head) else {
            info!(
                "Head {} has fewer than {} confirmations, nothing final",
                head, self.confirmations
            );
            return Ok(ScanOutcome::NotFinal { head });
        };
        info!("Running to block {}", to_block);

        let from_block = match self.checkpoints.load(CheckpointName::LastBlock).await? {
            Some(last) => last + 1,
            None => self.start_block,
        };
        debug!("Running from block {}", from_block);

        if from_block > to_block {
            debug!("Already processed up to block {}", from_block - 1);
            return Ok(ScanOutcome::CaughtUp {
                from_block,
                to_block,
            });
        }

        let events = self
            .source
            .cross_events(from_block, to_block, self.token)
            .await?;
        info!("Found {} logs in blocks {}..={}", events.len(), from_block, to_block);

        Ok(ScanOutcome::Scanned {
            from_block,
            to_block,
            events,
        })
    }
}
