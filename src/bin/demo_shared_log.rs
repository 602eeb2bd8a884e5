// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared log counter demo.
//
// Usage:
//   demo_shared_log write <count> <interval_ms>
//   demo_shared_log watch
//   demo_shared_log clear
//
// Writers append entries to a sequence kept in shared memory, guarded by a
// named IpcMutex, and wake watchers through a named IpcCondition. Watchers
// print every sequence number they observe. Set RUST_LOG=debug to see the
// condition variable's semaphore rotation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use ipcsync::{IpcCondition, IpcMutex, Result, ShmHandle, ShmOpenMode};

const NAME: &str = "demo_shared_log";
const SEQ_NAME: &str = "demo_shared_log_SEQ_";

struct Shared {
    seq_shm: ShmHandle,
    mtx: IpcMutex,
    cond: IpcCondition,
}

impl Shared {
    fn open() -> Result<Self> {
        let seq_shm = ShmHandle::acquire(
            SEQ_NAME,
            std::mem::size_of::<AtomicU64>(),
            ShmOpenMode::CreateOrOpen,
        )?;
        Ok(Self {
            seq_shm,
            mtx: IpcMutex::open(NAME)?,
            cond: IpcCondition::open(NAME)?,
        })
    }

    fn seq(&self) -> &AtomicU64 {
        // Zero-filled on creation, sized and aligned for one AtomicU64.
        unsafe { &*(self.seq_shm.get() as *const AtomicU64) }
    }
}

fn do_write(count: u64, interval_ms: u64) -> Result<()> {
    let mut shared = Shared::open()?;
    let pid = std::process::id();
    for _ in 0..count {
        shared.mtx.lock()?;
        let seq = shared.seq().fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{pid}] write seq {seq}");
        let notified = shared.cond.notify_all();
        shared.mtx.unlock()?;
        notified?;
        thread::sleep(Duration::from_millis(interval_ms));
    }
    Ok(())
}

fn do_watch() -> Result<()> {
    let mut shared = Shared::open()?;
    let pid = std::process::id();
    shared.mtx.lock()?;
    let mut last = shared.seq().load(Ordering::Relaxed);
    println!("[{pid}] watching from seq {last}");
    loop {
        while shared.seq().load(Ordering::Relaxed) == last {
            if let Err(e) = shared.cond.wait(&shared.mtx, None) {
                let _ = shared.mtx.unlock();
                return Err(e);
            }
        }
        let now = shared.seq().load(Ordering::Relaxed);
        for seq in last + 1..=now {
            println!("[{pid}] saw seq {seq}");
        }
        last = now;
    }
}

fn usage() -> ! {
    eprintln!("usage: demo_shared_log write <count> <interval_ms>");
    eprintln!("       demo_shared_log watch");
    eprintln!("       demo_shared_log clear");
    std::process::exit(1);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let result = match args[1].as_str() {
        "write" => {
            if args.len() < 4 {
                usage();
            }
            let count: u64 = args[2].parse().unwrap_or_else(|_| usage());
            let interval: u64 = args[3].parse().unwrap_or_else(|_| usage());
            do_write(count, interval)
        }
        "watch" => do_watch(),
        "clear" => {
            IpcCondition::clear_storage(NAME);
            IpcMutex::clear_storage(NAME);
            ShmHandle::clear_storage(SEQ_NAME);
            Ok(())
        }
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("demo_shared_log: {e}");
        std::process::exit(1);
    }
}
