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

//! Bounded-retry payout processing.
//!
//! The [`RetryProcessor`] drives a claimed request through at most
//! `max_attempts` attempts. Each attempt bumps `retry_count`, sleeps for the
//! configured delay times the attempt number, and asks an [`AttemptOutcome`]
//! whether the payout went through. The first success completes the request;
//! running out of attempts moves it to the dead-letter state.
//!
//! Failures never escape: they are written to the record's `error` field and
//! are visible only through its status.

use crate::config::EngineConfig;
use crate::error::RefundError;
use crate::refund::{Refund, RefundRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Decides whether a single processing attempt succeeds.
///
/// Production code plugs a payment gateway in here. Implementations report a
/// failed attempt with [`RefundError::TransientFailure`].
pub trait AttemptOutcome: Send + Sync {
    fn attempt(&self, request: &RefundRequest, attempt: u32) -> Result<(), RefundError>;
}

impl<T: AttemptOutcome + ?Sized> AttemptOutcome for Arc<T> {
    fn attempt(&self, request: &RefundRequest, attempt: u32) -> Result<(), RefundError> {
        (**self).attempt(request, attempt)
    }
}

/// Deterministic simulation of a transient failure: the first attempt of every
/// cycle fails, every later attempt succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFirstAttempt;

impl FailFirstAttempt {
    pub const MESSAGE: &'static str = "temporary error";
}

impl AttemptOutcome for FailFirstAttempt {
    fn attempt(&self, _request: &RefundRequest, attempt: u32) -> Result<(), RefundError> {
        if attempt == 1 {
            Err(RefundError::TransientFailure(Self::MESSAGE.to_owned()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSucceed;

impl AttemptOutcome for AlwaysSucceed {
    fn attempt(&self, _request: &RefundRequest, _attempt: u32) -> Result<(), RefundError> {
        Ok(())
    }
}

/// Wraps another outcome and fails every attempt while the gateway is down.
#[derive(Debug, Default)]
pub struct GatewayOutage<O> {
    down: AtomicBool,
    inner: O,
}

impl<O: AttemptOutcome> GatewayOutage<O> {
    pub const MESSAGE: &'static str = "payment gateway unavailable";

    pub fn new(inner: O) -> Self {
        Self {
            down: AtomicBool::new(false),
            inner,
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

impl<O: AttemptOutcome> AttemptOutcome for GatewayOutage<O> {
    fn attempt(&self, request: &RefundRequest, attempt: u32) -> Result<(), RefundError> {
        if self.is_down() {
            return Err(RefundError::TransientFailure(Self::MESSAGE.to_owned()));
        }
        self.inner.attempt(request, attempt)
    }
}

/// Runs processing cycles against an injected [`AttemptOutcome`].
pub struct RetryProcessor {
    max_attempts: u32,
    attempt_delay: Duration,
    outcome: Box<dyn AttemptOutcome>,
}

impl RetryProcessor {
    pub fn new(config: &EngineConfig, outcome: Box<dyn AttemptOutcome>) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_delay: config.attempt_delay,
            outcome,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Claims `refund` and runs a full processing cycle.
    ///
    /// # Errors
    ///
    /// Only claim failures are returned: [`RefundError::InvalidTransition`]
    /// for rejected, completed or in-flight requests, and
    /// [`RefundError::ApprovalRequired`] for unapproved requests above the
    /// threshold. The outcome of the cycle itself is in the returned record.
    pub fn process(&self, refund: &Refund) -> Result<RefundRequest, RefundError> {
        refund.begin_processing()?;
        Ok(self.run(refund))
    }

    /// Runs the attempt loop on a request the caller has already claimed.
    pub(crate) fn run(&self, refund: &Refund) -> RefundRequest {
        for _ in 0..self.max_attempts {
            let attempt = refund.start_attempt();
            let delay = self.attempt_delay.saturating_mul(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            let request = refund.snapshot();
            match self.outcome.attempt(&request, attempt) {
                Ok(()) => {
                    if let Err(e) = refund.complete() {
                        error!(request_id = %request.request_id, error = %e, "failed to complete refund");
                        return refund.snapshot();
                    }
                    info!(
                        request_id = %request.request_id,
                        amount = %request.amount,
                        attempt,
                        "refund completed"
                    );
                    return refund.snapshot();
                }
                Err(e) => {
                    let message = match e {
                        RefundError::TransientFailure(message) => message,
                        other => other.to_string(),
                    };
                    warn!(request_id = %request.request_id, attempt, error = %message, "attempt failed");
                    refund.record_failure(message);
                }
            }
        }

        let request = refund.snapshot();
        match refund.dead_letter() {
            Ok(()) => warn!(
                request_id = %request.request_id,
                attempts = request.retry_count,
                "retries exhausted, moved to dead-letter queue"
            ),
            Err(e) => error!(request_id = %request.request_id, error = %e, "failed to dead-letter refund"),
        }
        refund.snapshot()
    }
}

impl std::fmt::Debug for RetryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryProcessor")
            .field("max_attempts", &self.max_attempts)
            .field("attempt_delay", &self.attempt_delay)
            .finish_non_exhaustive()
    }
}
