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

use clap::Parser;
use csv::{ReaderBuilder, Trim};
use refund_engine_rs::command::parse_amount;
use refund_engine_rs::{
    ApproverId, Command, CsvCommand, CustomerId, EngineConfig, ExportFormat, FailFirstAttempt,
    GatewayOutage, RefundEngine, RefundError, RefundRequest, RefundStatus, RequestId,
};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Refund Engine - Process refund requests
///
/// With a FILE, runs the commands in it and prints the resulting ledger as
/// CSV to stdout. Without one, starts an interactive menu.
#[derive(Parser, Debug)]
#[command(name = "refund-engine-rs")]
#[command(about = "A refund engine with approval gating and dead-letter recovery", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,request,amount,customer,reason,approver
    /// Example: cargo run -- commands.csv > refunds.csv
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Simulated processing time of the first attempt, in milliseconds
    #[arg(long, env = "REFUND_ATTEMPT_DELAY_MS", default_value_t = 100)]
    attempt_delay_ms: u64,

    /// Attempts per processing cycle before a request is dead-lettered
    #[arg(long, env = "REFUND_MAX_ATTEMPTS", default_value_t = EngineConfig::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Directory for exports written without an explicit path
    #[arg(long, env = "REFUND_EXPORT_DIR", default_value = ".")]
    export_dir: PathBuf,

    /// Write a ledger snapshot to PATH after a batch run
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Snapshot format: json or csv
    #[arg(long, default_value = "json")]
    format: ExportFormat,

    /// Print ledger statistics to stderr after a batch run
    #[arg(long)]
    stats: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "REFUND_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_attempt_delay(Duration::from_millis(self.attempt_delay_ms))
            .with_export_dir(&self.export_dir)
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let outage = Arc::new(GatewayOutage::new(FailFirstAttempt));
    let engine = RefundEngine::with_outcome(args.engine_config(), Arc::clone(&outage));

    let result = match &args.input {
        Some(path) => run_batch(&args, &engine, path),
        None => {
            let stdin = io::stdin();
            Menu::new(&engine, &outage, stdin.lock(), io::stdout())
                .run()
                .map_err(|e| format!("Error in interactive session: {e}"))
        }
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

/// Logs go to stderr; stdout is reserved for reports.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn run_batch(args: &Args, engine: &RefundEngine, path: &Path) -> Result<(), String> {
    // Open input file
    let file = File::open(path)
        .map_err(|e| format!("Error opening file '{}': {}", path.display(), e))?;

    let applied = process_commands(engine, BufReader::new(file))
        .map_err(|e| format!("Error processing commands: {e}"))?;
    info!(applied, total = engine.len(), "batch finished");

    // Write results to stdout
    engine
        .write_snapshot(io::stdout().lock(), ExportFormat::Csv)
        .map_err(|e| format!("Error writing output: {e}"))?;

    if let Some(export_path) = &args.export {
        engine
            .export(Some(export_path), args.format)
            .map_err(|e| format!("Error exporting ledger: {e}"))?;
    }
    if args.stats {
        eprint!("{}", engine.statistics());
    }
    Ok(())
}

/// Applies commands from a CSV reader to `engine`.
///
/// Rows are streamed, so arbitrarily large files are fine. Malformed rows and
/// refused commands are logged and skipped; they never stop the batch.
///
/// # CSV Format
///
/// Expected columns: `type, request, amount, customer, reason, approver`
/// - `type`: Command type (create, approve, reject, requeue)
/// - `request`: Request ID (optional for create)
/// - `amount`: Positive decimal amount (create only)
/// - `customer`: Customer ID (create only)
/// - `reason`: Free text (optional)
/// - `approver`: Approver ID (approve/reject only)
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is unreadable.
/// Returns the number of commands that were applied successfully.
pub fn process_commands<R: Read>(engine: &RefundEngine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " create "
        .flexible(true) // Allow trailing fields to be omitted
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0;
    for (line, result) in rdr.deserialize::<CsvCommand>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed row");
                continue;
            }
        };

        let command = match record.into_command() {
            Ok(command) => command,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping invalid command");
                continue;
            }
        };

        let request_id = command.request_id().cloned();
        match command.apply(engine) {
            Ok(_) => applied += 1,
            Err(e) => {
                warn!(line = line + 2, request_id = ?request_id, error = %e, "command refused");
            }
        }
    }

    Ok(applied)
}

/// Interactive operator menu.
struct Menu<'a, R, W> {
    engine: &'a RefundEngine,
    outage: &'a GatewayOutage<FailFirstAttempt>,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Menu<'a, R, W> {
    fn new(
        engine: &'a RefundEngine,
        outage: &'a GatewayOutage<FailFirstAttempt>,
        input: R,
        output: W,
    ) -> Self {
        Self {
            engine,
            outage,
            input,
            output,
        }
    }

    fn run(mut self) -> io::Result<()> {
        writeln!(self.output, "REFUND ENGINE")?;
        writeln!(self.output, "{}", "=".repeat(50))?;
        writeln!(self.output, "Refunds up to 1000 are processed automatically.")?;
        writeln!(self.output, "Refunds above 1000 need approval.")?;

        loop {
            self.print_options()?;
            let Some(choice) = self.prompt("Choose an option (0-9)")? else {
                break;
            };
            match choice.as_str() {
                "1" => self.create()?,
                "2" => self.decide(true)?,
                "3" => self.decide(false)?,
                "4" => self.list()?,
                "5" => self.requeue()?,
                "6" => write!(self.output, "\n{}", self.engine.statistics())?,
                "7" => self.export()?,
                "8" => self.demo()?,
                "9" => self.toggle_outage()?,
                "0" => break,
                _ => writeln!(self.output, "Invalid option, choose a number from 0 to 9.")?,
            }
        }

        writeln!(self.output, "Bye.")?;
        Ok(())
    }

    fn print_options(&mut self) -> io::Result<()> {
        let outage = if self.outage.is_down() { "on" } else { "off" };
        writeln!(self.output)?;
        writeln!(self.output, "1. Create refund")?;
        writeln!(self.output, "2. Approve refund")?;
        writeln!(self.output, "3. Reject refund")?;
        writeln!(self.output, "4. List refunds")?;
        writeln!(self.output, "5. Requeue dead-lettered refund")?;
        writeln!(self.output, "6. Statistics")?;
        writeln!(self.output, "7. Export to file")?;
        writeln!(self.output, "8. Run demo")?;
        writeln!(self.output, "9. Toggle gateway outage (currently {outage})")?;
        writeln!(self.output, "0. Exit")
    }

    /// Reads one trimmed line. `None` on end of input.
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    fn create(&mut self) -> io::Result<()> {
        let Some(amount) = self.prompt("Amount")? else {
            return Ok(());
        };
        let amount = match parse_amount(&amount) {
            Ok(amount) => amount,
            Err(e) => return writeln!(self.output, "Error: {e}"),
        };
        let Some(customer) = self.prompt("Customer ID")? else {
            return Ok(());
        };
        let Some(reason) = self.prompt("Reason (optional)")? else {
            return Ok(());
        };
        let Some(request_id) = self.prompt("Request ID (blank to generate)")? else {
            return Ok(());
        };

        let command = Command::Create {
            request_id: (!request_id.is_empty()).then(|| RequestId(request_id)),
            amount,
            customer_id: CustomerId(customer),
            reason: (!reason.is_empty()).then_some(reason),
        };
        let result = command.apply(self.engine);
        self.report(result)
    }

    fn decide(&mut self, approve: bool) -> io::Result<()> {
        if approve {
            let pending = self.engine.pending_approvals();
            if pending.is_empty() {
                return writeln!(self.output, "No refunds are waiting for approval.");
            }
            writeln!(self.output, "\nWaiting for approval ({}):", pending.len())?;
            for request in &pending {
                write_request(&mut self.output, request)?;
            }
        }

        let Some(request_id) = self.prompt("Request ID")? else {
            return Ok(());
        };
        let Some(approver) = self.prompt("Approver ID")? else {
            return Ok(());
        };
        let request_id = RequestId(request_id);
        let approver = ApproverId(approver);
        let result = if approve {
            self.engine.approve(&request_id, approver)
        } else {
            self.engine.reject(&request_id, approver)
        };
        self.report(result)
    }

    fn list(&mut self) -> io::Result<()> {
        let Some(filter) = self.prompt("Status filter (blank for all)")? else {
            return Ok(());
        };
        let status = if filter.is_empty() {
            None
        } else {
            match filter.parse::<RefundStatus>() {
                Ok(status) => Some(status),
                Err(e) => return writeln!(self.output, "Error: {e}"),
            }
        };

        let requests = self.engine.list(status);
        if requests.is_empty() {
            return writeln!(self.output, "No refunds found.");
        }
        writeln!(self.output, "\nRefunds ({}):", requests.len())?;
        for request in &requests {
            write_request(&mut self.output, request)?;
        }
        Ok(())
    }

    fn requeue(&mut self) -> io::Result<()> {
        let Some(request_id) = self.prompt("Request ID")? else {
            return Ok(());
        };
        let result = self.engine.requeue(&RequestId(request_id));
        self.report(result)
    }

    fn export(&mut self) -> io::Result<()> {
        let Some(format) = self.prompt("Format (json/csv, blank for json)")? else {
            return Ok(());
        };
        let format = if format.is_empty() {
            ExportFormat::Json
        } else {
            match format.parse::<ExportFormat>() {
                Ok(format) => format,
                Err(e) => return writeln!(self.output, "Error: {e}"),
            }
        };
        let Some(path) = self.prompt("Path (blank for a timestamped file)")? else {
            return Ok(());
        };
        let path = (!path.is_empty()).then(|| PathBuf::from(path));

        match self.engine.export(path.as_deref(), format) {
            Ok(written) => writeln!(
                self.output,
                "Saved {} refunds to {}",
                self.engine.len(),
                written.display()
            ),
            Err(e) => writeln!(self.output, "Error: {e}"),
        }
    }

    fn toggle_outage(&mut self) -> io::Result<()> {
        let down = !self.outage.is_down();
        self.outage.set_down(down);
        if down {
            writeln!(self.output, "Gateway outage simulated: every attempt now fails.")
        } else {
            writeln!(self.output, "Gateway restored.")
        }
    }

    /// Walks through the three main paths: auto-processed, approved, rejected.
    fn demo(&mut self) -> io::Result<()> {
        writeln!(self.output, "\nDemo: small refund, processed automatically")?;
        let small = self.engine.submit(
            Decimal::from(250),
            CustomerId::from("DEMO_CUST1"),
            Some("damaged item".into()),
        );
        self.report(small)?;

        writeln!(self.output, "\nDemo: large refund, approved")?;
        let large = self.engine.submit(
            Decimal::from(1500),
            CustomerId::from("DEMO_CUST2"),
            Some("order cancelled".into()),
        );
        self.report(large.clone())?;
        if let Ok(large) = large {
            let approved = self
                .engine
                .approve(&large.request_id, ApproverId::from("DEMO_MGR"));
            self.report(approved)?;
        }

        writeln!(self.output, "\nDemo: large refund, rejected")?;
        let suspicious = self.engine.submit(
            Decimal::from(5000),
            CustomerId::from("DEMO_CUST3"),
            Some("suspicious claim".into()),
        );
        if let Ok(suspicious) = suspicious {
            let rejected = self
                .engine
                .reject(&suspicious.request_id, ApproverId::from("DEMO_MGR"));
            self.report(rejected)?;
        }

        write!(self.output, "\n{}", self.engine.statistics())
    }

    fn report(&mut self, result: Result<RefundRequest, RefundError>) -> io::Result<()> {
        match result {
            Ok(request) => write_request(&mut self.output, &request),
            Err(e) => writeln!(self.output, "Error: {e}"),
        }
    }
}

fn write_request<W: Write>(output: &mut W, request: &RefundRequest) -> io::Result<()> {
    writeln!(
        output,
        "[{}] {} | {:.2} | customer {} | attempts {} | created {}",
        request.status,
        request.request_id,
        request.amount,
        request.customer_id,
        request.retry_count,
        request.created_at.format("%d/%m/%Y %H:%M")
    )?;
    if let Some(reason) = &request.reason {
        writeln!(output, "    reason: {reason}")?;
    }
    if let Some(approver) = &request.approver {
        writeln!(output, "    approver: {approver}")?;
    }
    if let Some(error) = &request.error {
        writeln!(output, "    error: {error}")?;
    }
    Ok(())
}
