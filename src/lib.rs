// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Inter-process synchronization primitives: named events and semaphores,
// a mutex over a shared 32-bit lock word, and a condition variable built
// from a rotating pool of named semaphores. Same behavior on POSIX and
// Win32.

pub mod object_name;

mod platform;

mod error;
pub use error::{Error, Result};

mod permissions;
pub use permissions::Permissions;

mod options;
pub use options::{SyncOptions, DEFAULT_NON_ZERO_TIMEOUT};

mod abort;
pub use abort::AbortHandle;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod event;
pub use event::InterprocessEvent;

mod semaphore;
pub use semaphore::{zero_count_probe, InterprocessSemaphore, ZeroCountProbe};

mod mutex;
pub use mutex::{
    IpcMutex, MutexSharedState, MutexStateSnapshot, EVENT_SET_FLAG, LOCK_FLAG, WAITER_COUNT_MASK,
};

mod guard;
pub use guard::IpcMutexGuard;

mod sem_pool;

mod condition;
pub use condition::{CondSharedState, IpcCondition};

mod waiter;
pub use waiter::Waiter;
