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

//! Refund requests and their lifecycle.
//!
//! Implemented State Machine
//!
//! ```text
//!  Pending ──(amount <= threshold)──────────────► Processing ──► Completed
//!     │                                               ▲   │
//!     ├──approve──► Approved ──────────────────────────┘   └──► Dlq
//!     │                                               ▲          │
//!     └──reject───► Rejected                          └─requeue──┘
//! ```
//!
//! # Example
//!
//! ```
//! use refund_engine_rs::{CustomerId, Refund, RefundStatus, RequestId};
//! use rust_decimal_macros::dec;
//!
//! let refund = Refund::new(RequestId::from("REQ001"), dec!(500), CustomerId::from("CUST123"), None)?;
//! assert_eq!(refund.status(), RefundStatus::Pending);
//! assert_eq!(refund.snapshot().retry_count, 0);
//!
//! assert!(Refund::new(RequestId::from("REQ002"), dec!(0), CustomerId::from("CUST123"), None).is_err());
//! # Ok::<(), refund_engine_rs::RefundError>(())
//! ```

use crate::base::{ApproverId, CustomerId, RequestId};
use crate::error::RefundError;
use crate::policy::{requires_approval, validate_amount};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
    Dlq,
}

impl RefundStatus {
    /// Every status, in lifecycle order. Reports iterate in this order.
    pub const ALL: [RefundStatus; 6] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Processing,
        Self::Completed,
        Self::Dlq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Dlq => "dlq",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// Amount-dependent guards (auto-path vs. approval path) are checked by
    /// the callers that know the amount.
    pub fn can_transition_to(self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Dlq)
                | (Dlq, Processing)
        )
    }

    /// `Dlq` counts as terminal even though [`requeue`](crate::RefundEngine::requeue)
    /// can revive it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Dlq)
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == name)
            .ok_or_else(|| RefundError::UnknownStatus(s.trim().to_owned()))
    }
}

/// Point-in-time view of a refund request.
///
/// This is what callers and exports see. The authoritative copy lives inside
/// a [`Refund`] owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub request_id: RequestId,
    pub amount: Decimal,
    pub customer_id: CustomerId,
    pub reason: Option<String>,
    pub status: RefundStatus,
    /// Attempts made in the current processing cycle.
    pub retry_count: u32,
    pub error: Option<String>,
    pub approver: Option<ApproverId>,
    pub created_at: DateTime<Utc>,
}

impl RefundRequest {
    fn assert_invariants(&self) {
        debug_assert!(
            self.amount > Decimal::ZERO,
            "Invariant violated: non-positive amount {} on {}",
            self.amount,
            self.request_id
        );
        debug_assert!(
            !matches!(self.status, RefundStatus::Approved | RefundStatus::Rejected)
                || requires_approval(self.amount),
            "Invariant violated: {} went through the approval gate with amount {}",
            self.request_id,
            self.amount
        );
        debug_assert!(
            self.status != RefundStatus::Completed || self.error.is_none(),
            "Invariant violated: completed request {} still carries an error",
            self.request_id
        );
    }

    fn transition(&mut self, next: RefundStatus) -> Result<(), RefundError> {
        if !self.status.can_transition_to(next) {
            return Err(RefundError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Gate shared by approve and reject.
    fn check_approvable(&self, next: RefundStatus) -> Result<(), RefundError> {
        if !requires_approval(self.amount) {
            return Err(RefundError::ApprovalNotRequired(self.request_id.clone()));
        }
        if !self.status.can_transition_to(next) {
            return Err(RefundError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }

    /// Enters `Processing` with a fresh retry budget.
    fn claim_for_processing(&mut self) -> Result<(), RefundError> {
        if self.status == RefundStatus::Pending && requires_approval(self.amount) {
            return Err(RefundError::ApprovalRequired(self.request_id.clone()));
        }
        self.transition(RefundStatus::Processing)?;
        self.retry_count = 0;
        self.error = None;
        Ok(())
    }
}

/// Ledger entry for one refund request.
///
/// All mutation goes through the methods below, each of which runs as a single
/// check-then-set under the record's lock.
#[derive(Debug)]
pub struct Refund {
    inner: Mutex<RefundRequest>,
}

impl Refund {
    /// Creates a pending request stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RefundError::InvalidAmount`] if `amount` is not positive or
    /// exceeds [`MAX_AMOUNT`](crate::policy::MAX_AMOUNT).
    pub fn new(
        request_id: RequestId,
        amount: Decimal,
        customer_id: CustomerId,
        reason: Option<String>,
    ) -> Result<Self, RefundError> {
        validate_amount(amount)?;
        let request = RefundRequest {
            request_id,
            amount,
            customer_id,
            reason,
            status: RefundStatus::Pending,
            retry_count: 0,
            error: None,
            approver: None,
            created_at: Utc::now(),
        };
        request.assert_invariants();
        Ok(Self {
            inner: Mutex::new(request),
        })
    }

    pub fn snapshot(&self) -> RefundRequest {
        self.inner.lock().clone()
    }

    pub fn status(&self) -> RefundStatus {
        self.inner.lock().status
    }

    pub fn amount(&self) -> Decimal {
        self.inner.lock().amount
    }

    /// `Pending -> Approved -> Processing`, recording the approver.
    ///
    /// Both steps happen under one lock so no other caller can claim the
    /// request between approval and the start of processing.
    pub(crate) fn approve(&self, approver: ApproverId) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        data.check_approvable(RefundStatus::Approved)?;
        data.transition(RefundStatus::Approved)?;
        data.approver = Some(approver);
        data.claim_for_processing()?;
        data.assert_invariants();
        Ok(())
    }

    /// `Pending -> Rejected`, recording the approver.
    pub(crate) fn reject(&self, approver: ApproverId) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        data.check_approvable(RefundStatus::Rejected)?;
        data.transition(RefundStatus::Rejected)?;
        data.approver = Some(approver);
        data.assert_invariants();
        Ok(())
    }

    /// Claims the request for the retry processor.
    ///
    /// Accepted from `Pending` (auto-path amounts only), `Approved` and `Dlq`.
    pub(crate) fn begin_processing(&self) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        data.claim_for_processing()?;
        data.assert_invariants();
        Ok(())
    }

    /// `Dlq -> Processing` with the error cleared and the retry count reset.
    pub(crate) fn requeue(&self) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        if data.status != RefundStatus::Dlq {
            return Err(RefundError::InvalidTransition {
                from: data.status,
                to: RefundStatus::Processing,
            });
        }
        data.claim_for_processing()?;
        data.assert_invariants();
        Ok(())
    }

    /// Counts a new attempt and returns its 1-based number.
    pub(crate) fn start_attempt(&self) -> u32 {
        let mut data = self.inner.lock();
        debug_assert_eq!(data.status, RefundStatus::Processing);
        data.retry_count += 1;
        data.retry_count
    }

    pub(crate) fn record_failure(&self, message: String) {
        self.inner.lock().error = Some(message);
    }

    /// `Processing -> Completed`, clearing the last error.
    pub(crate) fn complete(&self) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        data.transition(RefundStatus::Completed)?;
        data.error = None;
        data.assert_invariants();
        Ok(())
    }

    /// `Processing -> Dlq`, keeping the last error for inspection.
    pub(crate) fn dead_letter(&self) -> Result<(), RefundError> {
        let mut data = self.inner.lock();
        data.transition(RefundStatus::Dlq)?;
        data.assert_invariants();
        Ok(())
    }
}
