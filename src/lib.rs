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

//! # Refund Engine
//!
//! This library provides a refund request processing engine: idempotent
//! intake, amount-based routing, a manual approval gate for large refunds,
//! bounded-retry processing, and dead-letter recovery.
//!
//! ## Core Components
//!
//! - [`RefundEngine`]: Central processor owning the refund ledger
//! - [`Ledger`]: Request store with idempotent creation and reporting
//! - [`RetryProcessor`]: Bounded attempt loop driven by an [`AttemptOutcome`]
//! - [`RefundStatus`]: Lifecycle states (pending, approved, rejected, processing, completed, dlq)
//! - [`RefundError`]: Error types for refused operations
//!
//! ## Example
//!
//! ```
//! use refund_engine_rs::{ApproverId, CustomerId, EngineConfig, RefundEngine, RefundStatus, RequestId};
//! use rust_decimal_macros::dec;
//!
//! let engine = RefundEngine::with_config(EngineConfig::immediate());
//!
//! // Small refunds are processed on creation
//! let small = engine
//!     .create(RequestId::from("REQ001"), dec!(500), CustomerId::from("CUST123"), None)
//!     .unwrap();
//! assert_eq!(small.status, RefundStatus::Completed);
//! assert_eq!(small.retry_count, 2);
//!
//! // Large refunds wait for an approver
//! let large = engine
//!     .create(RequestId::from("REQ002"), dec!(1500), CustomerId::from("CUST456"), None)
//!     .unwrap();
//! assert_eq!(large.status, RefundStatus::Pending);
//!
//! let approved = engine.approve(&RequestId::from("REQ002"), ApproverId::from("MGR01")).unwrap();
//! assert_eq!(approved.status, RefundStatus::Completed);
//! ```
//!
//! ## Thread Safety
//!
//! The engine can be shared across threads behind an `Arc`. Creation is
//! atomic per request ID and every status change runs under the record's lock.

mod base;
pub mod command;
pub mod config;
mod engine;
pub mod error;
pub mod export;
mod ledger;
pub mod policy;
pub mod processor;
mod refund;

pub use base::{ApproverId, CustomerId, RequestId};
pub use command::{Command, CsvCommand};
pub use config::EngineConfig;
pub use engine::RefundEngine;
pub use error::{ExportError, RefundError};
pub use export::ExportFormat;
pub use ledger::{Ledger, Statistics, StatusSummary};
pub use policy::{AUTO_PROCESS_THRESHOLD, requires_approval};
pub use processor::{AlwaysSucceed, AttemptOutcome, FailFirstAttempt, GatewayOutage, RetryProcessor};
pub use refund::{Refund, RefundRequest, RefundStatus};
