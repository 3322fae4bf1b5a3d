//! Admission Controller Tests
//!
//! Tests verify:
//! - Capacity is never exceeded under contention
//! - A blocked acquirer proceeds when a permit is released
//! - Shutdown wakes blocked acquirers with a rejection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use marina::network::AdmissionController;
use marina::MarinaError;

#[test]
fn test_capacity_never_exceeded() {
    let admission = AdmissionController::new(3);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let admission = admission.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _permit = admission.acquire().unwrap();
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    current.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(admission.in_use(), 0);
    assert_eq!(admission.available(), admission.capacity());
    assert_eq!(admission.capacity(), 3);
}

#[test]
fn test_blocked_acquire_resumes_after_release() {
    let admission = AdmissionController::new(1);
    let held = admission.acquire().unwrap();

    let (tx, rx) = channel::bounded(1);
    let waiter = {
        let admission = admission.clone();
        thread::spawn(move || {
            let permit = admission.acquire();
            tx.send(permit.is_ok()).unwrap();
            drop(permit);
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    drop(held);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(true));
    waiter.join().unwrap();
}

#[test]
fn test_shutdown_wakes_waiters() {
    let admission = AdmissionController::new(1);
    let _held = admission.acquire().unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let admission = admission.clone();
            thread::spawn(move || admission.acquire())
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    admission.shutdown();

    for waiter in waiters {
        assert!(matches!(
            waiter.join().unwrap(),
            Err(MarinaError::AdmissionRejected)
        ));
    }
    assert!(admission.is_shut_down());
    assert_eq!(admission.in_use(), 1);
}
