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

//! Engine tunables.
//!
//! The approval threshold is policy, not configuration; see [`crate::policy`].

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for a [`RefundEngine`](crate::RefundEngine).
///
/// # Default Values
///
/// - `max_attempts`: 2
/// - `attempt_delay`: 100ms (multiplied by the attempt number)
/// - `export_dir`: current directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts per processing cycle before a request is dead-lettered.
    pub max_attempts: u32,
    /// Simulated processing time of the first attempt.
    pub attempt_delay: Duration,
    /// Directory used by exports that are not given an explicit path.
    pub export_dir: PathBuf,
}

impl EngineConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
    pub const DEFAULT_ATTEMPT_DELAY: Duration = Duration::from_millis(100);

    /// Default configuration without any simulated delay.
    ///
    /// Used by tests and benchmarks.
    pub fn immediate() -> Self {
        Self {
            attempt_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Sets the attempt budget. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_attempt_delay(mut self, attempt_delay: Duration) -> Self {
        self.attempt_delay = attempt_delay;
        self
    }

    #[must_use]
    pub fn with_export_dir(mut self, export_dir: impl Into<PathBuf>) -> Self {
        self.export_dir = export_dir.into();
        self
    }

    /// Delay before evaluating attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.attempt_delay.saturating_mul(attempt)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            attempt_delay: Self::DEFAULT_ATTEMPT_DELAY,
            export_dir: PathBuf::from("."),
        }
    }
}
