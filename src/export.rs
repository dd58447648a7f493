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

//! Ledger snapshots.
//!
//! The JSON snapshot is the persisted format: an array of refund requests in
//! creation order. The CSV report carries the same columns for spreadsheets.
//!
//! # JSON Format
//!
//! ```json
//! [
//!   {
//!     "request_id": "REQ001",
//!     "amount": "500",
//!     "customer_id": "CUST123",
//!     "reason": "defective",
//!     "status": "completed",
//!     "retry_count": 2,
//!     "error": null,
//!     "approver": null,
//!     "created_at": "2025-10-19T10:10:00Z"
//!   }
//! ]
//! ```

use crate::error::{ExportError, RefundError};
use crate::refund::RefundRequest;
use chrono::{DateTime, Utc};
use csv::Writer;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = RefundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(RefundError::UnknownFormat(other.to_owned())),
        }
    }
}

/// File name used when an export is not given a path, e.g.
/// `refunds_20251019_101500.json`.
pub fn default_file_name(format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "refunds_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Writes `records` to `writer` in the given format.
///
/// # Errors
///
/// Returns an [`ExportError`] if encoding or writing fails.
pub fn write_records<W: Write>(
    records: &[RefundRequest],
    format: ExportFormat,
    writer: W,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Json => write_json(records, writer),
        ExportFormat::Csv => write_csv(records, writer),
    }
}

pub fn write_json<W: Write>(records: &[RefundRequest], mut writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes a CSV report with a header row.
///
/// # CSV Format
///
/// Columns: `request_id, amount, customer_id, reason, status, retry_count, error, approver, created_at`
///
/// Missing optional fields are written as empty cells.
pub fn write_csv<W: Write>(records: &[RefundRequest], writer: W) -> Result<(), ExportError> {
    let mut wtr = Writer::from_writer(writer);
    if records.is_empty() {
        wtr.write_record(CSV_HEADER)?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

const CSV_HEADER: [&str; 9] = [
    "request_id",
    "amount",
    "customer_id",
    "reason",
    "status",
    "retry_count",
    "error",
    "approver",
    "created_at",
];
