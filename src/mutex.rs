// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Interprocess mutex over a single shared atomic word.
// - Bit 31 (LOCK_FLAG) marks the mutex as held.
// - Bit 30 (EVENT_SET_FLAG) marks a posted, not yet consumed wakeup.
// - The low 30 bits count blocked waiters.
// Uncontended lock/unlock never leave user space; blocked waiters sleep on
// a named auto-reset event.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::shm::ShmHandle;
use crate::{AbortHandle, Error, InterprocessEvent, IpcMutexGuard, Permissions, Result, SyncOptions};

pub const LOCK_FLAG: u32 = 1 << 31;
pub const EVENT_SET_FLAG: u32 = 1 << 30;
pub const WAITER_COUNT_MASK: u32 = EVENT_SET_FLAG - 1;

/// Shared state of an [`IpcMutex`]: one 32-bit word, zero when unlocked.
#[repr(C)]
#[derive(Debug, Default)]
pub struct MutexSharedState {
    lock_state: AtomicU32,
}

/// Decoded view of the mutex state word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MutexStateSnapshot {
    pub locked: bool,
    pub event_set: bool,
    pub waiters: u32,
}

impl MutexStateSnapshot {
    pub fn decode(word: u32) -> Self {
        Self {
            locked: word & LOCK_FLAG != 0,
            event_set: word & EVENT_SET_FLAG != 0,
            waiters: word & WAITER_COUNT_MASK,
        }
    }

    pub fn encode(&self) -> u32 {
        let mut word = self.waiters & WAITER_COUNT_MASK;
        if self.locked {
            word |= LOCK_FLAG;
        }
        if self.event_set {
            word |= EVENT_SET_FLAG;
        }
        word
    }
}

impl MutexSharedState {
    pub const fn new() -> Self {
        Self {
            lock_state: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> MutexStateSnapshot {
        MutexStateSnapshot::decode(self.lock_state.load(Ordering::Acquire))
    }

    pub(crate) fn word(&self) -> &AtomicU32 {
        &self.lock_state
    }
}

fn state_name(name: &str) -> String {
    format!("{name}_MTX_STATE_")
}

fn event_name(name: &str) -> String {
    format!("{name}_MTX_EVT_")
}

/// A named, inter-process mutex.
///
/// Not recursive and not fair: a woken waiter re-races for the lock and
/// re-validates it under CAS, so over-broad wakeups are harmless.
pub struct IpcMutex {
    state: NonNull<MutexSharedState>,
    shm: Option<ShmHandle>,
    event: InterprocessEvent,
    event_name: String,
}

// Safety: all access to the shared word goes through atomics.
unsafe impl Send for IpcMutex {}
unsafe impl Sync for IpcMutex {}

impl IpcMutex {
    /// Open (or create) a named inter-process mutex.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, &SyncOptions::default())
    }

    pub fn open_with(name: &str, opts: &SyncOptions) -> Result<Self> {
        let shm = ShmHandle::acquire_for::<MutexSharedState>(&state_name(name), &opts.permissions)?;
        // The mapping succeeded, so the base address is non-null.
        let state = unsafe { NonNull::new_unchecked(shm.get() as *mut MutexSharedState) };
        let event_name = event_name(name);
        let event = InterprocessEvent::create_or_open(&event_name, false, &opts.permissions)?;
        Ok(Self {
            state,
            shm: Some(shm),
            event,
            event_name,
        })
    }

    /// Build a mutex over a state block placed by an external allocator.
    ///
    /// # Safety
    /// `state` must point to a `MutexSharedState` that stays mapped (and is
    /// only accessed atomically) for the lifetime of the returned mutex.
    pub unsafe fn from_shared(
        state: NonNull<MutexSharedState>,
        event_name: &str,
        perms: &Permissions,
    ) -> Result<Self> {
        let event = InterprocessEvent::create_or_open(event_name, false, perms)?;
        Ok(Self {
            state,
            shm: None,
            event,
            event_name: event_name.to_string(),
        })
    }

    pub fn shared_state(&self) -> &MutexSharedState {
        unsafe { self.state.as_ref() }
    }

    fn word(&self) -> &AtomicU32 {
        self.shared_state().word()
    }

    /// Try to lock the mutex without blocking.
    pub fn try_lock(&self) -> bool {
        self.word().fetch_or(LOCK_FLAG, Ordering::Acquire) & LOCK_FLAG == 0
    }

    /// Lock the mutex, blocking on the wake event while it is held.
    pub fn lock(&self) -> Result<()> {
        if self.try_lock_uncontended() {
            return Ok(());
        }
        self.lock_slow()
    }

    /// Lock the mutex unless `abort` fires first.
    /// Returns `Ok(false)` (mutex not held) when aborted.
    pub fn lock_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        if self.try_lock_uncontended() {
            return Ok(true);
        }
        self.lock_slow_abortable(abort)
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard(&self) -> Result<IpcMutexGuard<'_>> {
        IpcMutexGuard::new(self)
    }

    /// Unlock the mutex, waking one waiter if any are blocked and no
    /// wakeup is already pending.
    pub fn unlock(&self) -> Result<()> {
        let old = self.word().fetch_and(!LOCK_FLAG, Ordering::Release);
        if old & EVENT_SET_FLAG == 0 && old & WAITER_COUNT_MASK != 0 {
            let prev = self.word().fetch_or(EVENT_SET_FLAG, Ordering::Relaxed);
            if prev & EVENT_SET_FLAG == 0 {
                self.event.set()?;
            }
        }
        Ok(())
    }

    /// Remove the backing storage for a named mutex.
    pub fn clear_storage(name: &str) {
        ShmHandle::clear_storage(&state_name(name));
        InterprocessEvent::clear_storage(&event_name(name));
    }

    fn try_lock_uncontended(&self) -> bool {
        let old = self.word().load(Ordering::Relaxed);
        old & (LOCK_FLAG | WAITER_COUNT_MASK) == 0
            && self
                .word()
                .compare_exchange_weak(old, old | LOCK_FLAG, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    fn lock_slow(&self) -> Result<()> {
        let mut old = self.word().load(Ordering::Relaxed);
        self.mark_waiting_and_try_lock(&mut old)?;

        while old & LOCK_FLAG != 0 {
            if let Err(e) = self.event.wait() {
                self.word().fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
            self.clear_waiting_and_try_lock(&mut old);
        }
        Ok(())
    }

    fn lock_slow_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        let mut old = self.word().load(Ordering::Relaxed);
        self.mark_waiting_and_try_lock(&mut old)?;

        while old & LOCK_FLAG != 0 {
            match self.event.wait_abortable(abort) {
                Ok(true) => self.clear_waiting_and_try_lock(&mut old),
                Ok(false) => {
                    self.word().fetch_sub(1, Ordering::AcqRel);
                    return Ok(false);
                }
                Err(e) => {
                    self.word().fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            }
        }
        Ok(true)
    }

    /// Register as a waiter if the mutex is held, or take it if it is free.
    /// On return `old` holds the word as it was before the update.
    pub(crate) fn mark_waiting_and_try_lock(&self, old: &mut u32) -> Result<()> {
        loop {
            let new = if *old & LOCK_FLAG != 0 {
                if *old & WAITER_COUNT_MASK == WAITER_COUNT_MASK {
                    return Err(Error::Limitation("too many waiters on an interprocess mutex"));
                }
                *old + 1
            } else {
                *old | LOCK_FLAG
            };
            match self
                .word()
                .compare_exchange_weak(*old, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(cur) => *old = cur,
            }
        }
    }

    /// After a wakeup: consume the pending-event flag and, if the mutex is
    /// free, drop our waiter registration and take it in the same CAS.
    fn clear_waiting_and_try_lock(&self, old: &mut u32) {
        *old = (*old & !LOCK_FLAG) | EVENT_SET_FLAG;
        loop {
            let new = if *old & LOCK_FLAG != 0 {
                *old
            } else {
                (*old - 1) | LOCK_FLAG
            };
            match self.word().compare_exchange(
                *old,
                new & !EVENT_SET_FLAG,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(cur) => *old = cur,
            }
        }
    }
}

impl Drop for IpcMutex {
    fn drop(&mut self) {
        // The event name persists on POSIX. The last user removes it before
        // the segment name, so a later opener never pairs a fresh lock word
        // with a stale event.
        if let Some(shm) = self.shm.as_mut() {
            if shm.release() {
                InterprocessEvent::clear_storage(&self.event_name);
            }
        }
    }
}
