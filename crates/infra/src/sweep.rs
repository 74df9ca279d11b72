//! Budgeted sweep bookkeeping.
//!
//! Sweeps have no persisted cursor: each invocation re-derives its due-set,
//! works through it until the wall-clock budget runs out, and leaves the rest
//! for the next tick.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::{SweepSchedule, SweepSettings};

#[derive(Debug, Clone, Copy)]
pub struct SweepBudget {
    started: Instant,
    limit: Duration,
}

impl SweepBudget {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn exceeded(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    /// What is left of the limit, for handing on to a follow-up sweep.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }
}

/// Outcome of one sweep invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items taken from the due-set.
    pub visited: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items inspected but not due or not eligible.
    pub skipped: usize,
    /// The budget ran out before the due-set was exhausted.
    pub exhausted: bool,
}

impl SweepReport {
    pub fn merge(mut self, other: SweepReport) -> SweepReport {
        self.visited += other.visited;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.exhausted |= other.exhausted;
        self
    }
}

/// Each timer-driven job the runner schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    InvoiceTasks,
    GlobalInvoices,
    DueInstallments,
    DueSubscriptions,
    PendingCharges,
    StaleIntents,
    TaxReminder,
}

impl SweepKind {
    pub const ALL: [SweepKind; 7] = [
        SweepKind::InvoiceTasks,
        SweepKind::GlobalInvoices,
        SweepKind::DueInstallments,
        SweepKind::DueSubscriptions,
        SweepKind::PendingCharges,
        SweepKind::StaleIntents,
        SweepKind::TaxReminder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepKind::InvoiceTasks => "invoice_tasks",
            SweepKind::GlobalInvoices => "global_invoices",
            SweepKind::DueInstallments => "due_installments",
            SweepKind::DueSubscriptions => "due_subscriptions",
            SweepKind::PendingCharges => "pending_charges",
            SweepKind::StaleIntents => "stale_intents",
            SweepKind::TaxReminder => "tax_reminder",
        }
    }

    pub fn settings(self, schedule: &SweepSchedule) -> SweepSettings {
        match self {
            SweepKind::InvoiceTasks => schedule.invoice_tasks,
            SweepKind::GlobalInvoices => schedule.global_invoices,
            SweepKind::DueInstallments => schedule.due_installments,
            SweepKind::DueSubscriptions => schedule.due_subscriptions,
            SweepKind::PendingCharges => schedule.pending_charges,
            SweepKind::StaleIntents => schedule.stale_intents,
            SweepKind::TaxReminder => schedule.tax_reminder,
        }
    }
}
