//! Worker Pool Tests
//!
//! Tests verify:
//! - Tasks run and return values
//! - Panics are reported per task and do not kill workers
//! - Reject policy refuses work when the queue is full
//! - Shutdown drains queued tasks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use marina::config::Backpressure;
use marina::network::WorkerPool;
use marina::MarinaError;

#[test]
fn test_tasks_return_values() {
    let pool = WorkerPool::new("values", 2, 8, Backpressure::Block).unwrap();
    let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i * i).unwrap()).collect();
    let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(results, (0..10).map(|i| i * i).collect::<Vec<_>>());
}

#[test]
fn test_panic_is_contained() {
    let pool = WorkerPool::new("panics", 1, 4, Backpressure::Block).unwrap();

    let failing = pool.submit(|| -> u32 { panic!("bad task") }).unwrap();
    match failing.wait() {
        Err(MarinaError::TaskPanicked(msg)) => assert!(msg.contains("bad task")),
        other => panic!("Expected TaskPanicked, got {:?}", other),
    }

    // The single worker is still alive
    assert_eq!(pool.submit(|| 7).unwrap().wait().unwrap(), 7);
}

#[test]
fn test_reject_when_saturated() {
    let pool = WorkerPool::new("reject", 1, 1, Backpressure::Reject).unwrap();
    let (release_tx, release_rx) = channel::bounded::<()>(0);
    let (started_tx, started_rx) = channel::bounded::<()>(1);

    let running = pool
        .submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
    started_rx.recv().unwrap();

    // Worker busy, one slot free
    let queued = pool.submit(|| ()).unwrap();
    assert_eq!(pool.queued(), 1);
    assert_eq!(pool.name(), "reject");

    match pool.submit(|| ()) {
        Err(MarinaError::PoolSaturated(name)) => assert_eq!(name, "reject"),
        other => panic!("Expected PoolSaturated, got {:?}", other.is_ok()),
    }

    release_tx.send(()).unwrap();
    running.wait().unwrap();
    queued.wait().unwrap();
    assert_eq!(pool.queued(), 0);
}

#[test]
fn test_block_waits_for_space() {
    let pool = Arc::new(WorkerPool::new("block", 1, 1, Backpressure::Block).unwrap());
    let done = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let done = Arc::clone(&done);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();

    for handle in handles {
        handle.wait().unwrap();
    }
    assert_eq!(done.load(Ordering::SeqCst), 5);
}

#[test]
fn test_shutdown_drains_queue() {
    let mut pool = WorkerPool::new("drain", 1, 16, Backpressure::Block).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();
    assert_eq!(done.load(Ordering::SeqCst), 10);
}
