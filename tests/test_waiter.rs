// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Waiter: predicate waits over a named mutex and condition variable.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ipcsync::Waiter;

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test_waiter_{tag}_{n}_{}", std::process::id())
}

#[test]
fn waiter_broadcast() {
    let name = unique_name("broadcast");
    Waiter::clear_storage(&name);

    let k = Arc::new(AtomicI32::new(0));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let n = name.clone();
            let k2 = Arc::clone(&k);
            thread::spawn(move || {
                let mut waiter = Waiter::open(&n).expect("open");
                for i in 0..3 {
                    assert!(waiter
                        .wait_if(|| k2.load(Ordering::Acquire) == i)
                        .expect("wait_if"));
                }
            })
        })
        .collect();

    let mut waiter = Waiter::open(&name).expect("open");
    for val in 1..=3 {
        thread::sleep(Duration::from_millis(20));
        k.store(val, Ordering::Release);
        waiter.broadcast().expect("broadcast");
    }

    for t in threads {
        t.join().expect("join");
    }
}

#[test]
fn waiter_notify_wakes_each_in_turn() {
    let name = unique_name("notify");
    Waiter::clear_storage(&name);

    let flag = Arc::new(AtomicBool::new(false));
    let woken = Arc::new(AtomicI32::new(0));

    let threads: Vec<_> = (0..3)
        .map(|_| {
            let n = name.clone();
            let f = Arc::clone(&flag);
            let w = Arc::clone(&woken);
            thread::spawn(move || {
                let mut waiter = Waiter::open(&n).expect("open");
                waiter
                    .wait_if(|| !f.load(Ordering::Acquire))
                    .expect("wait_if");
                w.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    flag.store(true, Ordering::Release);

    // One notify per waiter; extra notifies with nobody waiting are no-ops.
    let mut waiter = Waiter::open(&name).expect("open");
    for _ in 0..200 {
        if woken.load(Ordering::SeqCst) == 3 {
            break;
        }
        waiter.notify().expect("notify");
        thread::sleep(Duration::from_millis(5));
    }

    for t in threads {
        t.join().expect("join");
    }
    assert_eq!(woken.load(Ordering::SeqCst), 3);
}

#[test]
fn waiter_quit_waiting() {
    let name = unique_name("quit");
    Waiter::clear_storage(&name);

    let mut waiter = Waiter::open(&name).expect("open");
    let quit = waiter.quit_handle();

    let t = thread::spawn(move || waiter.wait_if(|| true).expect("wait_if"));

    thread::sleep(Duration::from_millis(50));
    quit.abort().expect("quit");
    assert!(!t.join().expect("join"), "quit must end the wait");
}

#[test]
fn waiter_predicate_false_returns_immediately() {
    let name = unique_name("pred_false");
    Waiter::clear_storage(&name);

    let mut waiter = Waiter::open(&name).expect("open");
    assert!(waiter.wait_if(|| false).expect("wait_if"));
}

#[test]
fn waiter_quit_before_wait() {
    let name = unique_name("quit_early");
    Waiter::clear_storage(&name);

    let mut waiter = Waiter::open(&name).expect("open");
    waiter.quit_waiting().expect("quit_waiting");
    assert!(!waiter.wait_if(|| true).expect("wait_if"));
}

#[test]
fn waiter_clear_storage_and_reopen() {
    let name = unique_name("clear");

    {
        let _w = Waiter::open(&name).expect("open");
    }

    Waiter::clear_storage(&name);
    let mut w = Waiter::open(&name).expect("re-open after clear");
    assert!(w.wait_if(|| false).expect("wait_if"));
}
