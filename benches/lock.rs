// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lock and probe benchmarks.
//
// Run with:
//   cargo bench --bench lock
//
// Groups:
//   mutex_uncontended — lock/unlock and try_lock/unlock on a named mutex
//   semaphore_probe   — is_zero_count with the accurate and emulated probes

use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ipcsync::{InterprocessSemaphore, IpcMutex, Permissions};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("bench_lock_{tag}_{n}_{}", std::process::id())
}

fn bench_mutex(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_uncontended");

    let name = unique_name("mtx");
    IpcMutex::clear_storage(&name);
    let mtx = IpcMutex::open(&name).expect("open mutex");

    group.bench_function("lock_unlock", |b| {
        b.iter(|| {
            mtx.lock().expect("lock");
            mtx.unlock().expect("unlock");
        });
    });

    group.bench_function("try_lock_unlock", |b| {
        b.iter(|| {
            black_box(mtx.try_lock());
            mtx.unlock().expect("unlock");
        });
    });

    group.finish();
    drop(mtx);
    IpcMutex::clear_storage(&name);
}

fn bench_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("semaphore_probe");

    let name = unique_name("sem");
    InterprocessSemaphore::clear_storage(&name);
    let sem = InterprocessSemaphore::create(&name, &Permissions::default()).expect("create");
    sem.post(1).expect("post");

    group.bench_function("is_zero_count_nonzero", |b| {
        b.iter(|| black_box(sem.is_zero_count().expect("probe")));
    });

    sem.try_wait().expect("drain");
    group.bench_function("is_zero_count_zero", |b| {
        b.iter(|| black_box(sem.is_zero_count().expect("probe")));
    });

    group.finish();
    drop(sem);
    InterprocessSemaphore::clear_storage(&name);
}

criterion_group!(benches, bench_mutex, bench_probe);
criterion_main!(benches);
