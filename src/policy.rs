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

//! Amount-based routing.
//!
//! Refunds up to [`AUTO_PROCESS_THRESHOLD`] are paid out straight away; larger
//! ones wait for a manual approval.

use crate::error::RefundError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Largest amount that is processed without approval.
pub const AUTO_PROCESS_THRESHOLD: Decimal = dec!(1000);

/// Largest amount accepted at intake (10^15).
///
/// Keeps ledger totals far below `Decimal::MAX`, so aggregation cannot
/// overflow.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

/// Where a freshly created request goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AutoProcess,
    RequiresApproval,
}

/// Returns `true` iff `amount` is strictly above the auto-process threshold.
pub fn requires_approval(amount: Decimal) -> bool {
    amount > AUTO_PROCESS_THRESHOLD
}

pub fn route(amount: Decimal) -> Route {
    if requires_approval(amount) {
        Route::RequiresApproval
    } else {
        Route::AutoProcess
    }
}

/// Rejects amounts that are not positive or exceed [`MAX_AMOUNT`].
pub(crate) fn validate_amount(amount: Decimal) -> Result<(), RefundError> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT {
        return Err(RefundError::InvalidAmount(amount.to_string()));
    }
    Ok(())
}
