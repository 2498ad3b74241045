//! Run orchestrator: sequences one polling cycle and owns checkpoint advancement

use super::guard::IdempotencyGuard;
use super::reconciler::MultisigReconciler;
use super::scanner::{EventScanner, ScanOutcome};
use super::voter::TransferVoter;
use crate::checkpoint::{CheckpointName, CheckpointStore};
use crate::config::CheckpointPolicy;
use crate::error::{FederatorError, FederatorResult};
use crate::events::TransferEvent;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Where the orchestrator is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Confirming,
    Scanning,
    Processing,
    /// Terminal: the process is expected to exit
    Failed,
}

/// Summary of a completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub confirmations_sent: usize,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub events: usize,
    pub submitted: usize,
    pub skipped: usize,
    /// Last-block checkpoint written by this cycle, if any
    pub checkpoint: Option<u64>,
}

/// One federator agent
pub struct Federator {
    reconciler: MultisigReconciler,
    scanner: EventScanner,
    guard: IdempotencyGuard,
    voter: TransferVoter,
    checkpoints: Arc<dyn CheckpointStore>,
    policy: CheckpointPolicy,
    state: RwLock<CycleState>,
    last_report: RwLock<Option<CycleReport>>,
    /// Held for the whole cycle; cycles never overlap
    cycle_lock: Mutex<()>,
}

impl Federator {
    pub fn new(
        reconciler: MultisigReconciler,
        scanner: EventScanner,
        guard: IdempotencyGuard,
        voter: TransferVoter,
        checkpoints: Arc<dyn CheckpointStore>,
        policy: CheckpointPolicy,
    ) -> Self {
        Self {
            reconciler,
            scanner,
            guard,
            voter,
            checkpoints,
            policy,
            state: RwLock::new(CycleState::Idle),
            last_report: RwLock::new(None),
            cycle_lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> CycleState {
        *self.state.read().await
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub async fn checkpoint(&self, name: CheckpointName) -> FederatorResult<Option<u64>> {
        self.checkpoints.load(name).await
    }

    async fn set_state(&self, state: CycleState) {
        *self.state.write().await = state;
    }

    /// Run cycles every `poll_interval` until one fails.
    ///
    /// Returns the failure; there is no internal retry, restarting is left to
    /// whatever supervises the process.
    pub async fn run(&self, poll_interval: Duration, run_once: bool) -> FederatorResult<()> {
        loop {
            self.run_cycle().await?;
            if run_once {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Execute a single cycle: confirm, scan, process, checkpoint
    pub async fn run_cycle(&self) -> FederatorResult<CycleReport> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| FederatorError::CycleInProgress)?;

        if self.state().await == CycleState::Failed {
            return Err(FederatorError::Internal(
                "federator is in the failed state".to_string(),
            ));
        }

        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        let started = Instant::now();

        let result = self.cycle(cycle_id).instrument(span).await;
        crate::metrics::record_cycle(result.is_ok(), started.elapsed().as_secs_f64());

        match result {
            Ok(report) => {
                self.set_state(CycleState::Idle).await;
                *self.last_report.write().await = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                error!(cycle = %cycle_id, "Exception running federator: {}", e);
                self.set_state(CycleState::Failed).await;
                Err(e)
            }
        }
    }

    async fn cycle(&self, cycle_id: Uuid) -> FederatorResult<CycleReport> {
        let started_at = Utc::now();

        self.set_state(CycleState::Confirming).await;
        let reconciled = self.reconciler.reconcile().await?;

        self.set_state(CycleState::Scanning).await;
        let outcome = self.scanner.scan().await?;

        let mut report = CycleReport {
            cycle_id,
            started_at,
            finished_at: started_at,
            confirmations_sent: reconciled.confirmed.len(),
            from_block: None,
            to_block: None,
            events: 0,
            submitted: 0,
            skipped: 0,
            checkpoint: None,
        };

        if let ScanOutcome::Scanned {
            from_block,
            to_block,
            events,
        } = outcome
        {
            report.from_block = Some(from_block);
            report.to_block = Some(to_block);
            report.events = events.len();

            self.set_state(CycleState::Processing).await;
            let last_event_block = self.process_events(events, &mut report).await?;

            let checkpoint = match self.policy {
                CheckpointPolicy::ScannedRange => Some(to_block),
                CheckpointPolicy::LastEvent => last_event_block,
            };
            if let Some(block) = checkpoint {
                self.checkpoints.save(CheckpointName::LastBlock, block).await?;
                crate::metrics::record_checkpoint(CheckpointName::LastBlock, block);
                report.checkpoint = Some(block);
            }
        }

        report.finished_at = Utc::now();
        info!(
            "Cycle done: {} events, {} submitted, {} already processed, {} confirmations",
            report.events, report.submitted, report.skipped, report.confirmations_sent
        );
        Ok(report)
    }

    /// Vote every event not yet applied on the sidechain; returns the last event's block
    async fn process_events(
        &self,
        events: Vec<TransferEvent>,
        report: &mut CycleReport,
    ) -> FederatorResult<Option<u64>> {
        let mut last_block = None;

        for event in events {
            info!(
                "Processing event log: block {} tx {:?} index {}",
                event.block_number, event.tx_hash, event.log_index
            );
            crate::metrics::record_event_seen();
            let block_number = event.block_number;

            let transfer = self.voter.resolve(event).await?;
            if self.guard.already_applied(&transfer).await? {
                report.skipped += 1;
                crate::metrics::record_transfer_skipped();
            } else {
                self.voter.vote(&transfer).await?;
                report.submitted += 1;
                crate::metrics::record_transfer_submitted();
            }

            last_block = Some(block_number);
        }

        Ok(last_block)
    }
}
