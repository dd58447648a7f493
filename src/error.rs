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

//! Error types for refund processing and export.

use crate::base::RequestId;
use crate::refund::RefundStatus;
use thiserror::Error;

/// Refund processing errors.
///
/// None of these are fatal: each one describes an operation that was refused
/// without touching ledger state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundError {
    /// Referenced request ID does not exist
    #[error("refund request {0} not found")]
    RequestNotFound(RequestId),

    /// Requested status change is not an edge of the state machine
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: RefundStatus, to: RefundStatus },

    /// Approve/reject on a request at or below the auto-process threshold
    #[error("refund request {0} does not require approval")]
    ApprovalNotRequired(RequestId),

    /// Process on a pending request that is still waiting for approval
    #[error("refund request {0} is waiting for approval")]
    ApprovalRequired(RequestId),

    /// Amount is unparsable, zero or negative
    #[error("invalid amount `{0}` (must be a positive number up to 10^15)")]
    InvalidAmount(String),

    /// Required input field is empty
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Unknown status name used as a filter
    #[error("unknown status `{0}`")]
    UnknownStatus(String),

    /// Unknown command type in batch input
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// Unknown export format name
    #[error("unknown export format `{0}`")]
    UnknownFormat(String),

    /// A processing attempt failed; absorbed by the retry processor
    #[error("transient processing failure: {0}")]
    TransientFailure(String),
}

/// Errors raised while writing a ledger snapshot.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode CSV report: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            RefundError::RequestNotFound(RequestId::from("REQ404")).to_string(),
            "refund request REQ404 not found"
        );
        assert_eq!(
            RefundError::InvalidTransition {
                from: RefundStatus::Rejected,
                to: RefundStatus::Processing,
            }
            .to_string(),
            "invalid transition from rejected to processing"
        );
        assert_eq!(
            RefundError::ApprovalNotRequired(RequestId::from("REQ001")).to_string(),
            "refund request REQ001 does not require approval"
        );
        assert_eq!(
            RefundError::ApprovalRequired(RequestId::from("REQ002")).to_string(),
            "refund request REQ002 is waiting for approval"
        );
        assert_eq!(
            RefundError::InvalidAmount("abc".into()).to_string(),
            "invalid amount `abc` (must be a positive number up to 10^15)"
        );
        assert_eq!(
            RefundError::MissingField("customer").to_string(),
            "missing required field `customer`"
        );
        assert_eq!(
            RefundError::UnknownStatus("erro".into()).to_string(),
            "unknown status `erro`"
        );
        assert_eq!(
            RefundError::UnknownCommand("refund".into()).to_string(),
            "unknown command `refund`"
        );
        assert_eq!(
            RefundError::UnknownFormat("xml".into()).to_string(),
            "unknown export format `xml`"
        );
        assert_eq!(
            RefundError::TransientFailure("connection reset".into()).to_string(),
            "transient processing failure: connection reset"
        );
    }

    #[test]
    fn io_errors_convert_into_export_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error: ExportError = io.into();
        assert!(matches!(error, ExportError::Io(_)));
        assert_eq!(error.to_string(), "failed to write snapshot: read-only");
    }
}
