// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Refund processing engine.
//!
//! The [`RefundEngine`] is the central component that takes refund requests
//! in, routes them by amount, and drives them to a terminal state.
//!
//! # Request Lifecycle
//!
//! - **Create**: Idempotent on `request_id`. Amounts up to the threshold are
//!   processed immediately; larger ones stay `pending`.
//! - **Approve**: Records the approver and processes the request.
//! - **Reject**: Records the approver. The request is never processed.
//! - **Process**: Up to `max_attempts` attempts, ending `completed` or `dlq`.
//! - **Requeue**: Runs a dead-lettered request through a fresh cycle.
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync`. Every state change is a check-then-set under
//! the record's own lock, so concurrent callers cannot both create, approve
//! or claim the same request. Simulated processing delays run without any
//! lock held.

use crate::base::{ApproverId, CustomerId, RequestId};
use crate::config::EngineConfig;
use crate::error::{ExportError, RefundError};
use crate::export::{self, ExportFormat};
use crate::ledger::{Ledger, Statistics};
use crate::policy::{self, Route, validate_amount};
use crate::processor::{AttemptOutcome, FailFirstAttempt, RetryProcessor};
use crate::refund::{Refund, RefundRequest, RefundStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Refund processing engine that owns the ledger.
///
/// # Invariants
///
/// - Request IDs are unique; creating an existing ID returns the stored record.
/// - Only requests above [`policy::AUTO_PROCESS_THRESHOLD`] pass through the
///   approval gate.
/// - A rejected request is never processed.
/// - A processing cycle makes at most `max_attempts` attempts.
#[derive(Debug)]
pub struct RefundEngine {
    ledger: Ledger,
    processor: RetryProcessor,
    config: EngineConfig,
}

impl RefundEngine {
    /// Creates an engine with the default configuration and the
    /// fail-then-succeed attempt simulation.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_outcome(config, FailFirstAttempt)
    }

    /// Creates an engine whose processing attempts are decided by `outcome`.
    pub fn with_outcome(config: EngineConfig, outcome: impl AttemptOutcome + 'static) -> Self {
        Self {
            ledger: Ledger::new(),
            processor: RetryProcessor::new(&config, Box::new(outcome)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates a refund request, or returns the existing one for `request_id`.
    ///
    /// New requests at or below the threshold are processed before this call
    /// returns; larger ones are left `pending` for approval.
    ///
    /// # Errors
    ///
    /// - [`RefundError::MissingField`] - Empty request or customer ID.
    /// - [`RefundError::InvalidAmount`] - Amount is zero, negative or above
    ///   [`policy::MAX_AMOUNT`].
    pub fn create(
        &self,
        request_id: RequestId,
        amount: Decimal,
        customer_id: CustomerId,
        reason: Option<String>,
    ) -> Result<RefundRequest, RefundError> {
        if request_id.as_str().trim().is_empty() {
            return Err(RefundError::MissingField("request_id"));
        }
        // A retried create gets the stored record back whatever else it carries
        if let Some(existing) = self.ledger.get(&request_id) {
            let existing = existing.snapshot();
            debug!(request_id = %existing.request_id, "duplicate create, returning existing request");
            return Ok(existing);
        }
        if customer_id.0.trim().is_empty() {
            return Err(RefundError::MissingField("customer_id"));
        }
        validate_amount(amount)?;
        let reason = reason.filter(|reason| !reason.trim().is_empty());

        let (refund, created) = self.ledger.create(request_id, amount, customer_id, reason)?;
        if !created {
            let existing = refund.snapshot();
            debug!(request_id = %existing.request_id, "duplicate create, returning existing request");
            return Ok(existing);
        }

        let request = refund.snapshot();
        info!(
            request_id = %request.request_id,
            amount = %request.amount,
            customer_id = %request.customer_id,
            "refund request created"
        );

        match policy::route(amount) {
            Route::AutoProcess => {
                debug!(request_id = %request.request_id, "below threshold, processing automatically");
                Ok(self.process_refund(&refund))
            }
            Route::RequiresApproval => {
                info!(request_id = %request.request_id, "above threshold, waiting for approval");
                Ok(request)
            }
        }
    }

    /// Creates a refund request under a freshly generated ID.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn submit(
        &self,
        amount: Decimal,
        customer_id: CustomerId,
        reason: Option<String>,
    ) -> Result<RefundRequest, RefundError> {
        self.create(RequestId::generate(), amount, customer_id, reason)
    }

    /// Approves a pending request above the threshold and processes it.
    ///
    /// # Errors
    ///
    /// - [`RefundError::RequestNotFound`] - Unknown request ID.
    /// - [`RefundError::MissingField`] - Empty approver ID.
    /// - [`RefundError::ApprovalNotRequired`] - Amount at or below the threshold.
    /// - [`RefundError::InvalidTransition`] - Request is no longer pending.
    pub fn approve(
        &self,
        request_id: &RequestId,
        approver: ApproverId,
    ) -> Result<RefundRequest, RefundError> {
        let refund = self.find(request_id)?;
        validate_approver(&approver)?;
        refund.approve(approver.clone())?;
        info!(request_id = %request_id, approver = %approver, "refund approved");
        Ok(self.processor.run(&refund))
    }

    /// Rejects a pending request above the threshold. Rejection is final.
    ///
    /// # Errors
    ///
    /// Same as [`approve`](Self::approve).
    pub fn reject(
        &self,
        request_id: &RequestId,
        approver: ApproverId,
    ) -> Result<RefundRequest, RefundError> {
        let refund = self.find(request_id)?;
        validate_approver(&approver)?;
        refund.reject(approver.clone())?;
        info!(request_id = %request_id, approver = %approver, "refund rejected");
        Ok(refund.snapshot())
    }

    /// Runs a processing cycle on an existing request.
    ///
    /// # Errors
    ///
    /// - [`RefundError::RequestNotFound`] - Unknown request ID.
    /// - [`RefundError::InvalidTransition`] - Request is rejected, completed
    ///   or already processing.
    /// - [`RefundError::ApprovalRequired`] - Pending above the threshold.
    pub fn process(&self, request_id: &RequestId) -> Result<RefundRequest, RefundError> {
        let refund = self.find(request_id)?;
        self.processor.process(&refund)
    }

    /// Re-enters a dead-lettered request into processing with a fresh budget.
    ///
    /// # Errors
    ///
    /// - [`RefundError::RequestNotFound`] - Unknown request ID.
    /// - [`RefundError::InvalidTransition`] - Request is not in `dlq`.
    pub fn requeue(&self, request_id: &RequestId) -> Result<RefundRequest, RefundError> {
        let refund = self.find(request_id)?;
        refund.requeue()?;
        info!(request_id = %request_id, "refund requeued from dead-letter queue");
        Ok(self.processor.run(&refund))
    }

    /// Returns a snapshot of the request, or `None` if it does not exist.
    pub fn get(&self, request_id: &RequestId) -> Option<RefundRequest> {
        self.ledger.get(request_id).map(|refund| refund.snapshot())
    }

    /// All requests in creation order, optionally filtered by status.
    pub fn list(&self, status: Option<RefundStatus>) -> Vec<RefundRequest> {
        self.ledger.list(status)
    }

    /// Pending requests that need a decision from an approver.
    pub fn pending_approvals(&self) -> Vec<RefundRequest> {
        self.ledger
            .list(Some(RefundStatus::Pending))
            .into_iter()
            .filter(|request| policy::requires_approval(request.amount))
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        self.ledger.statistics()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Writes the whole ledger to `writer` in creation order.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] if encoding or writing fails.
    pub fn write_snapshot<W: Write>(
        &self,
        writer: W,
        format: ExportFormat,
    ) -> Result<(), ExportError> {
        export::write_records(&self.ledger.list(None), format, writer)
    }

    /// Writes the ledger to `path`, or to a timestamped file in the configured
    /// export directory, and returns the path written.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] if the file cannot be created or written.
    pub fn export(
        &self,
        path: Option<&Path>,
        format: ExportFormat,
    ) -> Result<PathBuf, ExportError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self
                .config
                .export_dir
                .join(export::default_file_name(format, Utc::now())),
        };
        let file = File::create(&path)?;
        self.write_snapshot(BufWriter::new(file), format)?;
        info!(path = %path.display(), records = self.len(), "ledger exported");
        Ok(path)
    }

    fn find(&self, request_id: &RequestId) -> Result<Arc<Refund>, RefundError> {
        self.ledger
            .get(request_id)
            .ok_or_else(|| RefundError::RequestNotFound(request_id.clone()))
    }

    /// Auto-path processing for a request this engine just created.
    fn process_refund(&self, refund: &Refund) -> RefundRequest {
        match self.processor.process(refund) {
            Ok(request) => request,
            // Another caller claimed it first; report whatever state it is in now.
            Err(e) => {
                debug!(error = %e, "auto-processing skipped");
                refund.snapshot()
            }
        }
    }
}

impl Default for RefundEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_approver(approver: &ApproverId) -> Result<(), RefundError> {
    if approver.0.trim().is_empty() {
        return Err(RefundError::MissingField("approver"));
    }
    Ok(())
}
