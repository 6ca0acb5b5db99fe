//! Saga composer: multi-plan workflows with stop-on-first-failure.
//!
//! A saga applies N independently-built plans in build order, accumulating
//! every successful receipt into one ordered journal. There is no automatic
//! compensation: when a plan fails, the saga stops issuing further plans and
//! surfaces the error together with the journal of everything that did
//! commit, so an operator sees exactly which steps landed. Later plans may
//! read documents earlier plans just wrote, which is why plans are never
//! reordered or parallelized.

use std::path::Path;

use crate::core::error::PlanfsError;
use crate::core::executor;
use crate::core::plan::Plan;
use crate::core::receipt::{self, JournalEntry, Receipt};

/// Error carrying the partial journal out of a failed saga.
#[derive(Debug)]
pub struct SagaError {
    pub error: PlanfsError,
    pub journal: Vec<JournalEntry>,
}

impl std::fmt::Display for SagaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} journal entr{} committed before failure)",
            self.error,
            self.journal.len(),
            if self.journal.len() == 1 { "y" } else { "ies" }
        )
    }
}

impl std::error::Error for SagaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Default)]
pub struct Saga {
    receipts: Vec<Receipt>,
}

impl Saga {
    pub fn new() -> Self {
        Saga::default()
    }

    /// Apply one plan; on success the receipt is accumulated and returned.
    /// On failure the caller should stop and convert via [`Saga::fail`].
    pub fn apply(&mut self, plan: &Plan) -> Result<Receipt, PlanfsError> {
        let receipt = executor::apply_plan(plan)?;
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    /// Apply a plan, mapping failure into a SagaError that carries the
    /// journal accumulated so far.
    pub fn try_apply(&mut self, plan: &Plan) -> Result<Receipt, SagaError> {
        match self.apply(plan) {
            Ok(receipt) => Ok(receipt),
            Err(error) => Err(SagaError {
                error,
                journal: self.journal(),
            }),
        }
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Ordered journal across all receipts accumulated so far.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.receipts
            .iter()
            .flat_map(Receipt::journal_entries)
            .collect()
    }

    /// Wrap an error from outside plan application (e.g. a collaborator
    /// call between plans) with the journal accumulated so far.
    pub fn fail(&self, error: PlanfsError) -> SagaError {
        SagaError {
            error,
            journal: self.journal(),
        }
    }

    /// Persist the accumulated journal to a per-task/thread JSONL file.
    pub fn commit_journal(&self, path: &Path) -> Result<Vec<JournalEntry>, PlanfsError> {
        let entries = self.journal();
        receipt::append_journal(path, &entries)?;
        Ok(entries)
    }
}
