// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named semaphores: create/open semantics, counting, abortable waits and
// the zero-count probe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ipcsync::{zero_count_probe, AbortHandle, InterprocessSemaphore, Permissions};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_sem_{n}_{}", std::process::id())
}

fn create(name: &str) -> InterprocessSemaphore {
    InterprocessSemaphore::clear_storage(name);
    InterprocessSemaphore::create(name, &Permissions::default()).expect("create")
}

#[test]
fn starts_at_zero() {
    let name = unique_name("zero");
    let sem = create(&name);

    assert!(sem.is_creator());
    assert!(!sem.try_wait().expect("try_wait"));

    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn post_then_wait() {
    let name = unique_name("post_wait");
    let sem = create(&name);

    sem.post(2).expect("post");
    sem.wait().expect("wait 1");
    sem.wait().expect("wait 2");
    assert!(!sem.try_wait().expect("try_wait"));

    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn create_existing_fails_and_open_sees_count() {
    let name = unique_name("existing");
    let sem = create(&name);
    assert!(InterprocessSemaphore::create(&name, &Permissions::default()).is_err());

    sem.post(1).expect("post");
    let other = InterprocessSemaphore::open(&name).expect("open");
    assert!(!other.is_creator());
    assert!(other.try_wait().expect("try_wait"));
    assert!(!sem.try_wait().expect("try_wait"));

    drop(other);
    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn create_or_open_race_has_one_creator() {
    let name = unique_name("race");
    InterprocessSemaphore::clear_storage(&name);

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let name = name.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                InterprocessSemaphore::create_or_open(&name, &Permissions::default())
                    .expect("create_or_open")
            })
        })
        .collect();

    let sems: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    assert_eq!(sems.iter().filter(|s| s.is_creator()).count(), 1);

    drop(sems);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn is_zero_count_leaves_count_unchanged() {
    let name = unique_name("probe");
    let sem = create(&name);

    assert!(sem.is_zero_count().expect("probe empty"));
    assert!(zero_count_probe().is_some());

    sem.post(3).expect("post");
    assert!(!sem.is_zero_count().expect("probe full"));
    assert!(!sem.is_zero_count().expect("probe again"));
    if let Some(count) = sem.count().expect("count") {
        assert_eq!(count, 3);
    }

    for _ in 0..3 {
        assert!(sem.try_wait().expect("try_wait"));
    }
    assert!(!sem.try_wait().expect("drained"));
    assert!(sem.is_zero_count().expect("probe drained"));

    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn post_wakes_blocked_waiter() {
    let name = unique_name("wake");
    let sem = create(&name);

    let name2 = name.clone();
    let t = thread::spawn(move || {
        let sem = InterprocessSemaphore::open(&name2).expect("open");
        sem.wait().expect("wait");
    });

    thread::sleep(Duration::from_millis(20));
    sem.post(1).expect("post");
    t.join().expect("join");
    assert!(!sem.try_wait().expect("try_wait"));

    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

#[test]
fn abort_interrupts_wait() {
    let name = unique_name("abort");
    let sem = create(&name);

    let abort = AbortHandle::new().expect("abort handle");
    let abort2 = abort.clone();
    let name2 = name.clone();
    let t = thread::spawn(move || {
        let sem = InterprocessSemaphore::open(&name2).expect("open");
        sem.wait_abortable(&abort2).expect("wait_abortable")
    });

    thread::sleep(Duration::from_millis(20));
    abort.abort().expect("abort");
    assert!(!t.join().expect("join"));

    // Nothing was consumed by the aborted waiter.
    sem.post(1).expect("post");
    assert!(sem.try_wait().expect("try_wait"));

    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}
