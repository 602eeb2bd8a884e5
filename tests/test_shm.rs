// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory segments backing mutex and condition variable state.

use std::sync::atomic::{AtomicUsize, Ordering};

use ipcsync::{Error, ShmHandle, ShmOpenMode};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_shm_{n}_{}", std::process::id())
}

#[test]
fn create_is_zero_filled_and_first() {
    let name = unique_name("create");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, 64, ShmOpenMode::Create).expect("create");
    assert!(shm.is_first());
    assert_eq!(shm.ref_count(), 1);
    assert_eq!(shm.user_size(), 64);

    let bytes = unsafe { std::slice::from_raw_parts(shm.get(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn open_missing_fails() {
    let name = unique_name("missing");
    ShmHandle::clear_storage(&name);

    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Open).is_err());
}

#[test]
fn create_exclusive_fails_if_exists() {
    let name = unique_name("exclusive");
    ShmHandle::clear_storage(&name);

    let _first = ShmHandle::acquire(&name, 64, ShmOpenMode::Create).expect("create");
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Create).is_err());
}

#[test]
fn handles_share_data_and_ref_count() {
    let name = unique_name("shared");
    ShmHandle::clear_storage(&name);

    let a = ShmHandle::acquire(&name, 16, ShmOpenMode::CreateOrOpen).expect("a");
    let b = ShmHandle::acquire(&name, 16, ShmOpenMode::CreateOrOpen).expect("b");
    assert!(a.is_first());
    assert!(!b.is_first());
    assert_eq!(b.ref_count(), 2);

    unsafe { a.get().write(0x5a) };
    assert_eq!(unsafe { b.get().read() }, 0x5a);

    drop(a);
    assert_eq!(b.ref_count(), 1);
}

#[test]
fn last_handle_removes_name() {
    let name = unique_name("last");
    ShmHandle::clear_storage(&name);

    {
        let _shm = ShmHandle::acquire(&name, 16, ShmOpenMode::Create).expect("create");
    }
    assert!(ShmHandle::acquire(&name, 16, ShmOpenMode::Open).is_err());
}

#[test]
fn invalid_requests_fail() {
    assert!(matches!(
        ShmHandle::acquire("", 16, ShmOpenMode::CreateOrOpen),
        Err(Error::Conversion(_))
    ));

    let name = unique_name("zero_size");
    assert!(ShmHandle::acquire(&name, 0, ShmOpenMode::CreateOrOpen).is_err());
}
