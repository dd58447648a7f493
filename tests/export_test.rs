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

//! Snapshot export tests against a temporary directory.

use refund_engine_rs::{
    ApproverId, CustomerId, EngineConfig, ExportError, ExportFormat, RefundEngine,
    RefundRequest, RefundStatus, RequestId,
};
use rust_decimal_macros::dec;
use std::fs;
use tempfile::TempDir;

fn populated_engine(export_dir: &TempDir) -> RefundEngine {
    let engine =
        RefundEngine::with_config(EngineConfig::immediate().with_export_dir(export_dir.path()));
    engine
        .create(
            RequestId::from("REQ001"),
            dec!(500),
            CustomerId::from("CUST123"),
            Some("defective".into()),
        )
        .unwrap();
    engine
        .create(
            RequestId::from("REQ002"),
            dec!(1500),
            CustomerId::from("CUST456"),
            Some("cancel".into()),
        )
        .unwrap();
    engine
        .create(RequestId::from("REQ003"), dec!(2500.50), CustomerId::from("CUST789"), None)
        .unwrap();
    engine
        .reject(&RequestId::from("REQ003"), ApproverId::from("MGR02"))
        .unwrap();
    engine
}

#[test]
fn json_export_to_explicit_path() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir);
    let path = dir.path().join("snapshot.json");

    let written = engine.export(Some(&path), ExportFormat::Json).unwrap();

    assert_eq!(written, path);
    let restored: Vec<RefundRequest> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(restored, engine.list(None));
    assert_eq!(restored[0].status, RefundStatus::Completed);
    assert_eq!(restored[1].status, RefundStatus::Pending);
    assert_eq!(restored[2].approver, Some(ApproverId::from("MGR02")));
}

#[test]
fn json_export_keeps_amounts_exact() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir);
    let path = dir.path().join("snapshot.json");

    engine.export(Some(&path), ExportFormat::Json).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value[2]["amount"], "2500.50");
    assert_eq!(value[2]["status"], "rejected");
    assert_eq!(value[1]["reason"], "cancel");
}

#[test]
fn default_export_lands_in_export_dir() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir);

    let written = engine.export(None, ExportFormat::Csv).unwrap();

    assert_eq!(written.parent(), Some(dir.path()));
    let name = written.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("refunds_"), "{name}");
    assert!(name.ends_with(".csv"), "{name}");

    let contents = fs::read_to_string(&written).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("request_id,amount,customer_id"));
    assert!(lines[1].starts_with("REQ001,500,CUST123,defective,completed,2,,,"));
    assert!(lines[3].starts_with("REQ003,2500.50,CUST789,,rejected,0,,MGR02,"));
}

#[test]
fn empty_ledger_exports_empty_array() {
    let dir = TempDir::new().unwrap();
    let engine = RefundEngine::with_config(EngineConfig::immediate());
    let path = dir.path().join("empty.json");

    engine.export(Some(&path), ExportFormat::Json).unwrap();

    let restored: Vec<RefundRequest> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(restored.is_empty());
}

#[test]
fn export_to_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir);
    let path = dir.path().join("missing").join("snapshot.json");

    let result = engine.export(Some(&path), ExportFormat::Json);

    assert!(matches!(result, Err(ExportError::Io(_))));
    assert!(!path.exists());
}

#[test]
fn write_snapshot_streams_csv() {
    let dir = TempDir::new().unwrap();
    let engine = populated_engine(&dir);
    let mut output = Vec::new();

    engine.write_snapshot(&mut output, ExportFormat::Csv).unwrap();

    let mut reader = csv::Reader::from_reader(output.as_slice());
    let ids: Vec<String> = reader
        .records()
        .map(|record| record.unwrap()[0].to_owned())
        .collect();
    assert_eq!(ids, ["REQ001", "REQ002", "REQ003"]);
}
