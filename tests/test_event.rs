// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named events: creation races, auto/manual reset and abortable waits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ipcsync::{AbortHandle, InterprocessEvent, Permissions};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_evt_{n}_{}", std::process::id())
}

fn aborted() -> AbortHandle {
    let abort = AbortHandle::new().expect("abort handle");
    abort.abort().expect("abort");
    abort
}

#[test]
fn create_is_exclusive() {
    let name = unique_name("exclusive");
    InterprocessEvent::clear_storage(&name);

    let first = InterprocessEvent::create(&name, false, &Permissions::default()).expect("create");
    assert!(first.is_creator());
    assert!(InterprocessEvent::create(&name, false, &Permissions::default()).is_err());

    let opened = InterprocessEvent::open(&name).expect("open");
    assert!(!opened.is_creator());

    drop(first);
    drop(opened);
    InterprocessEvent::clear_storage(&name);
}

#[test]
fn open_missing_fails() {
    let name = unique_name("missing");
    InterprocessEvent::clear_storage(&name);

    let err = InterprocessEvent::open(&name).expect_err("open must fail");
    assert!(err.os_code().is_some());
}

#[test]
fn create_or_open_race_has_one_creator() {
    let name = unique_name("race");
    InterprocessEvent::clear_storage(&name);

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let name = name.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                InterprocessEvent::create_or_open(&name, false, &Permissions::default())
                    .expect("create_or_open")
            })
        })
        .collect();

    let events: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    let creators = events.iter().filter(|e| e.is_creator()).count();
    assert_eq!(creators, 1);

    drop(events);
    InterprocessEvent::clear_storage(&name);
}

#[test]
fn auto_reset_consumes_signal() {
    let name = unique_name("auto");
    InterprocessEvent::clear_storage(&name);

    let evt = InterprocessEvent::create(&name, false, &Permissions::default()).expect("create");
    evt.set().expect("set");
    evt.set().expect("set twice");
    evt.wait().expect("wait");

    // Repeated sets do not accumulate.
    assert!(!evt.wait_abortable(&aborted()).expect("wait_abortable"));

    drop(evt);
    InterprocessEvent::clear_storage(&name);
}

#[test]
fn manual_reset_stays_signalled() {
    let name = unique_name("manual");
    InterprocessEvent::clear_storage(&name);

    let evt = InterprocessEvent::create(&name, true, &Permissions::default()).expect("create");
    evt.set().expect("set");
    evt.wait().expect("first wait");
    evt.wait().expect("second wait");

    evt.reset().expect("reset");
    assert!(!evt.wait_abortable(&aborted()).expect("wait_abortable"));

    drop(evt);
    InterprocessEvent::clear_storage(&name);
}

#[test]
fn set_wakes_waiter_in_other_thread() {
    let name = unique_name("wake");
    InterprocessEvent::clear_storage(&name);

    let evt = InterprocessEvent::create(&name, false, &Permissions::default()).expect("create");
    let name2 = name.clone();
    let abort = AbortHandle::new().expect("abort handle");
    let abort2 = abort.clone();
    let t = thread::spawn(move || {
        let evt = InterprocessEvent::open(&name2).expect("open");
        evt.wait_abortable(&abort2).expect("wait_abortable")
    });

    thread::sleep(Duration::from_millis(20));
    evt.set().expect("set");
    assert!(t.join().expect("join"));

    drop(evt);
    InterprocessEvent::clear_storage(&name);
}

#[test]
fn abort_interrupts_wait() {
    let name = unique_name("abort");
    InterprocessEvent::clear_storage(&name);

    let evt = InterprocessEvent::create(&name, false, &Permissions::default()).expect("create");
    let abort = AbortHandle::new().expect("abort handle");
    let abort2 = abort.clone();
    let name2 = name.clone();
    let t = thread::spawn(move || {
        let evt = InterprocessEvent::open(&name2).expect("open");
        evt.wait_abortable(&abort2).expect("wait_abortable")
    });

    thread::sleep(Duration::from_millis(20));
    abort.abort().expect("abort");
    assert!(!t.join().expect("join"));

    drop(evt);
    InterprocessEvent::clear_storage(&name);
}
