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

//! Concurrency tests for the refund engine.
//!
//! Many threads hit the same requests at once. The engine's records are
//! guarded by `parking_lot` locks, and the `deadlock_detection` dev feature
//! lets a background thread check the lock graph while the tests run.

use parking_lot::deadlock;
use refund_engine_rs::{
    ApproverId, CustomerId, EngineConfig, FailFirstAttempt, GatewayOutage, RefundEngine,
    RefundError, RefundStatus, RequestId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// === Deadlock Detection ===

/// Starts a background thread that periodically checks for deadlocks.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

fn shared_engine() -> Arc<RefundEngine> {
    Arc::new(RefundEngine::with_config(EngineConfig::immediate()))
}

/// Runs `f` on `threads` threads released at the same instant.
fn race<T, F>(threads: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f(i)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .collect()
}

// === Tests ===

#[test]
fn concurrent_create_same_id_stores_one_record() {
    let engine = shared_engine();

    let results = race(32, {
        let engine = engine.clone();
        move |i| {
            engine
                .create(
                    RequestId::from("REQ001"),
                    Decimal::from(i as u32 + 1),
                    CustomerId(format!("CUST{i}")),
                    None,
                )
                .unwrap()
        }
    });

    assert_eq!(engine.len(), 1);
    let stored = engine.get(&RequestId::from("REQ001")).unwrap();
    assert_eq!(stored.status, RefundStatus::Completed);
    assert_eq!(stored.retry_count, 2);
    for result in results {
        assert_eq!(result.amount, stored.amount);
        assert_eq!(result.customer_id, stored.customer_id);
    }
}

#[test]
fn concurrent_approve_processes_once() {
    let engine = shared_engine();
    let id = RequestId::from("REQ002");
    engine
        .create(id.clone(), dec!(1500), CustomerId::from("CUST456"), None)
        .unwrap();

    let results = race(16, {
        let engine = engine.clone();
        let id = id.clone();
        move |i| engine.approve(&id, ApproverId(format!("MGR{i:02}")))
    });

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, RefundError::InvalidTransition { .. }))
    );

    let stored = engine.get(&id).unwrap();
    assert_eq!(stored.status, RefundStatus::Completed);
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.approver, winners[0].approver);
}

#[test]
fn approve_and_reject_race_has_one_winner() {
    let engine = shared_engine();
    let id = RequestId::from("REQ003");
    engine
        .create(id.clone(), dec!(2500), CustomerId::from("CUST789"), None)
        .unwrap();

    let results = race(16, {
        let engine = engine.clone();
        let id = id.clone();
        move |i| {
            if i % 2 == 0 {
                engine.approve(&id, ApproverId::from("MGR01"))
            } else {
                engine.reject(&id, ApproverId::from("MGR02"))
            }
        }
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let stored = engine.get(&id).unwrap();
    match stored.status {
        RefundStatus::Completed => assert_eq!(stored.approver, Some(ApproverId::from("MGR01"))),
        RefundStatus::Rejected => assert_eq!(stored.approver, Some(ApproverId::from("MGR02"))),
        other => panic!("unexpected final status {other}"),
    }
}

#[test]
fn concurrent_requeue_claims_once() {
    let outage = Arc::new(GatewayOutage::new(FailFirstAttempt));
    let engine = Arc::new(RefundEngine::with_outcome(
        EngineConfig::immediate(),
        Arc::clone(&outage),
    ));
    let id = RequestId::from("REQ009");
    outage.set_down(true);
    engine
        .create(id.clone(), dec!(300), CustomerId::from("CUST1"), None)
        .unwrap();
    outage.set_down(false);

    let results = race(16, {
        let engine = engine.clone();
        let id = id.clone();
        move |_| engine.requeue(&id)
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let stored = engine.get(&id).unwrap();
    assert_eq!(stored.status, RefundStatus::Completed);
    assert_eq!(stored.retry_count, 2);
}

#[test]
fn no_deadlock_mixed_operations() {
    let detector = start_deadlock_detector();
    let outage = Arc::new(GatewayOutage::new(FailFirstAttempt));
    let engine = Arc::new(RefundEngine::with_outcome(
        EngineConfig::immediate(),
        Arc::clone(&outage),
    ));

    const NUM_THREADS: usize = 16;
    const OPS_PER_THREAD: usize = 200;

    race(NUM_THREADS, {
        let engine = engine.clone();
        let outage = outage.clone();
        move |t| {
            for i in 0..OPS_PER_THREAD {
                // Shared id space so threads collide on the same records
                let id = RequestId(format!("REQ{:03}", (t * 7 + i) % 64));
                let amount = Decimal::from(((t + i) % 4) as u32 * 600 + 100);
                let approver = ApproverId::from("MGR01");
                match i % 8 {
                    0 | 1 => {
                        let _ = engine.create(id, amount, CustomerId::from("CUST"), None);
                    }
                    2 => {
                        let _ = engine.approve(&id, approver);
                    }
                    3 => {
                        let _ = engine.reject(&id, approver);
                    }
                    4 => {
                        let _ = engine.requeue(&id);
                    }
                    5 => outage.set_down(i % 16 == 5),
                    6 => {
                        let statistics = engine.statistics();
                        assert!(statistics.total_count <= 64);
                    }
                    _ => {
                        let _ = engine.list(None);
                        let _ = engine.pending_approvals();
                    }
                }
            }
        }
    });

    stop_deadlock_detector(detector);

    // Verify final state is consistent
    let records = engine.list(None);
    let statistics = engine.statistics();
    assert_eq!(statistics.total_count, records.len());
    assert_eq!(
        statistics.total_amount,
        records.iter().map(|r| r.amount).sum::<Decimal>()
    );
    for request in &records {
        assert_ne!(request.status, RefundStatus::Processing);
        assert!(request.retry_count <= engine.config().max_attempts);
    }
}

#[test]
fn no_deadlock_readers_during_intake() {
    let detector = start_deadlock_detector();
    let engine = shared_engine();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut last = 0;
                while !done.load(Ordering::SeqCst) {
                    let listed = engine.list(None).len();
                    assert!(listed >= last, "creation log shrank");
                    last = listed;
                }
            })
        })
        .collect();

    race(8, {
        let engine = engine.clone();
        move |t| {
            for i in 0..250 {
                engine
                    .create(
                        RequestId(format!("T{t}_{i}")),
                        dec!(10),
                        CustomerId::from("CUST"),
                        None,
                    )
                    .unwrap();
            }
        }
    });

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    assert_eq!(engine.len(), 2000);
    assert_eq!(engine.statistics().count(RefundStatus::Completed), 2000);
}
