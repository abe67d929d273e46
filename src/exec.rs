//! Generic plan executor.
//!
//! Takes the planned items of one operation and a per-item action, fans the
//! items across the rayon worker pool (sized to the available CPU
//! parallelism) and streams results back over a channel so the caller sees
//! one progress event per completion, with cumulative counters that only
//! ever grow. Items are dispatched in plan order; completion order is
//! unspecified.
//!
//! Cancellation is polled between dispatches and by every worker at its
//! item boundary: an item that already started runs its atomic step to
//! completion, everything not yet started is reported skipped. The action
//! receives the poll result so it can short-circuit without touching the
//! filesystem.
//!
//! [`run_sequential`] exists for the one plan shape that must not run in
//! parallel: renames whose destinations overlap other items' sources.

use crate::progress::{Operation, OperationProgressEvent};
use crate::types::ExecStatus;
use rayon::prelude::*;
use std::sync::mpsc;
use std::time::Duration;

/// What the executor needs to know about an op-specific detail record.
pub trait ExecDetail {
    fn status(&self) -> ExecStatus;
    fn source_path(&self) -> &str;
}

#[derive(Debug)]
pub struct RunReport<D> {
    pub details: Vec<D>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub canceled: bool,
}

impl<D> RunReport<D> {
    fn new() -> Self {
        Self {
            details: Vec::new(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            canceled: false,
        }
    }

    fn record(&mut self, status: ExecStatus) {
        self.processed += 1;
        match status {
            ExecStatus::Succeeded => self.succeeded += 1,
            ExecStatus::Failed => self.failed += 1,
            ExecStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Run `action` over every item on the worker pool.
pub fn run_parallel<T, D, A, C, F>(
    operation: Operation,
    items: Vec<T>,
    action: A,
    is_canceled: C,
    report_progress: &mut F,
) -> RunReport<D>
where
    T: Send + 'static,
    D: ExecDetail + Send + 'static,
    A: Fn(&T, bool) -> D + Send + Sync + 'static,
    C: Fn() -> bool + Send + Sync + 'static,
    F: FnMut(OperationProgressEvent),
{
    let total = items.len();
    let mut report = RunReport::new();

    let (tx, rx) = mpsc::channel::<D>();
    let worker_canceled = std::sync::Arc::new(is_canceled);
    let poll = std::sync::Arc::clone(&worker_canceled);

    let worker = std::thread::spawn(move || {
        items.into_par_iter().for_each_with(tx, |sender, item| {
            let canceled = (*poll)();
            let detail = action(&item, canceled);
            let _ = sender.send(detail);
        });
    });

    while report.processed < total {
        if !report.canceled && (*worker_canceled)() {
            report.canceled = true;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(detail) => {
                report.record(detail.status());
                let current_path = Some(detail.source_path().to_string());
                report.details.push(detail);
                report_progress(event(operation, &report, total, current_path, false));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = worker.join();

    if !report.canceled && (*worker_canceled)() {
        report.canceled = true;
    }
    report_progress(event(operation, &report, total, None, true));
    report
}

/// Run `action` over every item on the calling thread, in plan order.
pub fn run_sequential<T, D, A, C, F>(
    operation: Operation,
    items: Vec<T>,
    action: A,
    is_canceled: C,
    report_progress: &mut F,
) -> RunReport<D>
where
    D: ExecDetail,
    A: Fn(&T, bool) -> D,
    C: Fn() -> bool,
    F: FnMut(OperationProgressEvent),
{
    let total = items.len();
    let mut report = RunReport::new();

    for item in &items {
        if !report.canceled && is_canceled() {
            report.canceled = true;
        }
        let detail = action(item, report.canceled);
        report.record(detail.status());
        let current_path = Some(detail.source_path().to_string());
        report.details.push(detail);
        report_progress(event(operation, &report, total, current_path, false));
    }

    report_progress(event(operation, &report, total, None, true));
    report
}

fn event<D>(
    operation: Operation,
    report: &RunReport<D>,
    total: usize,
    current_path: Option<String>,
    done: bool,
) -> OperationProgressEvent {
    OperationProgressEvent {
        operation,
        processed: report.processed,
        total,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        current_path,
        done,
        canceled: report.canceled,
    }
}
