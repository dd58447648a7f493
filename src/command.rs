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

//! Operator commands and input validation.
//!
//! Both the batch file reader and the interactive menu turn raw text into a
//! [`Command`] here, so malformed input is rejected before the engine sees it.
//!
//! # CSV Format
//!
//! ```csv
//! type,request,amount,customer,reason,approver
//! create,REQ001,500,CUST123,defective,
//! create,REQ002,1500,CUST456,cancel,
//! approve,REQ002,,,,MGR01
//! reject,REQ003,,,,MGR01
//! requeue,REQ004,,,,
//! ```
//!
//! An empty `request` on a `create` row asks for a generated ID.

use crate::base::{ApproverId, CustomerId, RequestId};
use crate::engine::RefundEngine;
use crate::error::RefundError;
use crate::policy::validate_amount;
use crate::refund::RefundRequest;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        request_id: Option<RequestId>,
        amount: Decimal,
        customer_id: CustomerId,
        reason: Option<String>,
    },
    Approve {
        request_id: RequestId,
        approver: ApproverId,
    },
    Reject {
        request_id: RequestId,
        approver: ApproverId,
    },
    Requeue {
        request_id: RequestId,
    },
}

impl Command {
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Create { request_id, .. } => request_id.as_ref(),
            Self::Approve { request_id, .. }
            | Self::Reject { request_id, .. }
            | Self::Requeue { request_id } => Some(request_id),
        }
    }

    /// Runs the command against `engine`.
    ///
    /// # Errors
    ///
    /// Whatever the underlying engine operation returns.
    pub fn apply(self, engine: &RefundEngine) -> Result<RefundRequest, RefundError> {
        match self {
            Self::Create {
                request_id: Some(request_id),
                amount,
                customer_id,
                reason,
            } => engine.create(request_id, amount, customer_id, reason),
            Self::Create {
                request_id: None,
                amount,
                customer_id,
                reason,
            } => engine.submit(amount, customer_id, reason),
            Self::Approve {
                request_id,
                approver,
            } => engine.approve(&request_id, approver),
            Self::Reject {
                request_id,
                approver,
            } => engine.reject(&request_id, approver),
            Self::Requeue { request_id } => engine.requeue(&request_id),
        }
    }
}

/// Parses a user-typed amount.
///
/// # Errors
///
/// Returns [`RefundError::InvalidAmount`] if the input is not a number or is
/// not strictly positive.
pub fn parse_amount(input: &str) -> Result<Decimal, RefundError> {
    let trimmed = input.trim();
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| RefundError::InvalidAmount(trimmed.to_owned()))?;
    validate_amount(amount).map_err(|_| RefundError::InvalidAmount(trimmed.to_owned()))?;
    Ok(amount)
}

/// Raw CSV record matching the batch input format.
///
/// Fields: `type, request, amount, customer, reason, approver`
#[derive(Debug, Deserialize)]
pub struct CsvCommand {
    #[serde(rename = "type")]
    pub command: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub approver: Option<String>,
}

impl CsvCommand {
    /// Converts the record into a validated [`Command`].
    ///
    /// # Errors
    ///
    /// - [`RefundError::MissingField`] - A field the command needs is empty.
    /// - [`RefundError::InvalidAmount`] - Amount is unparsable or not positive.
    /// - [`RefundError::UnknownCommand`] - Unrecognised `type`.
    pub fn into_command(self) -> Result<Command, RefundError> {
        let request_id = non_empty(self.request).map(RequestId::from);

        match self.command.trim().to_ascii_lowercase().as_str() {
            "create" => {
                let amount = non_empty(self.amount).ok_or(RefundError::MissingField("amount"))?;
                let customer =
                    non_empty(self.customer).ok_or(RefundError::MissingField("customer"))?;
                Ok(Command::Create {
                    request_id,
                    amount: parse_amount(&amount)?,
                    customer_id: CustomerId(customer),
                    reason: non_empty(self.reason),
                })
            }
            "approve" | "reject" => {
                let request_id = request_id.ok_or(RefundError::MissingField("request"))?;
                let approver = non_empty(self.approver)
                    .map(ApproverId)
                    .ok_or(RefundError::MissingField("approver"))?;
                if self.command.trim().eq_ignore_ascii_case("approve") {
                    Ok(Command::Approve {
                        request_id,
                        approver,
                    })
                } else {
                    Ok(Command::Reject {
                        request_id,
                        approver,
                    })
                }
            }
            "requeue" => Ok(Command::Requeue {
                request_id: request_id.ok_or(RefundError::MissingField("request"))?,
            }),
            other => Err(RefundError::UnknownCommand(other.to_owned())),
        }
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
