//! The federator's relay loop
//!
//! One cycle:
//! 1. `MultisigReconciler` confirms outstanding multisig proposals
//! 2. `EventScanner` reads finalized `Cross` events past the last checkpoint
//! 3. per event: `TransferVoter::resolve`, `IdempotencyGuard`, `TransferVoter::vote`
//! 4. checkpoints advance only after everything above succeeded

pub mod federator;
pub mod guard;
pub mod reconciler;
pub mod scanner;
pub mod voter;

pub use federator::{CycleReport, CycleState, Federator};
pub use guard::IdempotencyGuard;
pub use reconciler::MultisigReconciler;
pub use scanner::EventScanner;
pub use voter::TransferVoter;
