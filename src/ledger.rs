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

//! Thread-safe refund ledger with idempotent creation.
//!
//! Combines a [`DashMap`] for O(1) lookup and duplicate detection with a
//! creation-order log, so listings and exports come out in the order requests
//! were first seen.

use crate::base::{CustomerId, RequestId};
use crate::error::RefundError;
use crate::refund::{Refund, RefundRequest, RefundStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The authoritative store of refund requests.
///
/// Records are never removed. Lock order is map shard, then creation log,
/// then record; nothing acquires them in the other direction.
#[derive(Debug, Default)]
pub struct Ledger {
    /// Requests indexed by ID.
    records: DashMap<RequestId, Arc<Refund>>,
    /// Requests in creation order.
    log: RwLock<Vec<Arc<Refund>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new pending request unless `request_id` is already taken.
    ///
    /// Returns the stored entry and `true` if this call created it. A
    /// duplicate call gets the existing entry back untouched, whatever
    /// amount or reason it carried.
    ///
    /// # Errors
    ///
    /// Returns [`RefundError::InvalidAmount`] for a new request whose amount
    /// is out of range. Nothing is stored.
    pub fn create(
        &self,
        request_id: RequestId,
        amount: Decimal,
        customer_id: CustomerId,
        reason: Option<String>,
    ) -> Result<(Arc<Refund>, bool), RefundError> {
        // Entry API keeps check-and-insert atomic for concurrent callers
        match self.records.entry(request_id) {
            Entry::Occupied(entry) => Ok((Arc::clone(entry.get()), false)),
            Entry::Vacant(entry) => {
                let refund = Arc::new(Refund::new(
                    entry.key().clone(),
                    amount,
                    customer_id,
                    reason,
                )?);
                self.log.write().push(Arc::clone(&refund));
                entry.insert(Arc::clone(&refund));
                Ok((refund, true))
            }
        }
    }

    pub fn get(&self, request_id: &RequestId) -> Option<Arc<Refund>> {
        self.records.get(request_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of all requests in creation order, optionally filtered by status.
    pub fn list(&self, status: Option<RefundStatus>) -> Vec<RefundRequest> {
        self.log
            .read()
            .iter()
            .map(|refund| refund.snapshot())
            .filter(|request| status.is_none_or(|status| request.status == status))
            .collect()
    }

    /// Per-status counts and amounts, computed in a single pass.
    pub fn statistics(&self) -> Statistics {
        let mut statistics = Statistics::default();
        for refund in self.log.read().iter() {
            let request = refund.snapshot();
            statistics.record(request.status, request.amount);
        }
        statistics
    }
}

/// Count and amount of the requests in one status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub count: usize,
    pub total_amount: Decimal,
}

/// Aggregate view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_count: usize,
    pub total_amount: Decimal,
    by_status: HashMap<RefundStatus, StatusSummary>,
}

impl Statistics {
    fn record(&mut self, status: RefundStatus, amount: Decimal) {
        self.total_count += 1;
        self.total_amount += amount;
        let summary = self.by_status.entry(status).or_default();
        summary.count += 1;
        summary.total_amount += amount;
    }

    pub fn status(&self, status: RefundStatus) -> StatusSummary {
        self.by_status.get(&status).copied().unwrap_or_default()
    }

    pub fn count(&self, status: RefundStatus) -> usize {
        self.status(status).count
    }

    /// Summaries for every status in lifecycle order, including empty ones.
    pub fn iter(&self) -> impl Iterator<Item = (RefundStatus, StatusSummary)> + '_ {
        RefundStatus::ALL
            .into_iter()
            .map(|status| (status, self.status(status)))
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total requests: {}", self.total_count)?;
        writeln!(f, "Total amount:   {:.2}", self.total_amount)?;
        for (status, summary) in self.iter() {
            writeln!(
                f,
                "  {:<10} {:>5}  {:>12.2}",
                status.as_str(),
                summary.count,
                summary.total_amount
            )?;
        }
        Ok(())
    }
}
