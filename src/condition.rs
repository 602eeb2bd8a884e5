// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Interprocess condition variable built from a rotating pool of named
// semaphores.
//
// Shared state (guarded by the associated IpcMutex):
// - `waiters`: blocked waiters of the current generation, -1 when no
//   generation is active.
// - `generation`: bumped whenever a new semaphore becomes the wait target.
// - `semaphore_id`: id of that semaphore; waiters joining the generation
//   open it by name.
// notify_all hands the current semaphore over to its waiters and clears
// the generation, so the next waiter picks a semaphore nobody is still
// draining.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use log::debug;

use crate::sem_pool::{SemKey, SemaphorePool};
use crate::shm::ShmHandle;
use crate::{AbortHandle, Error, InterprocessSemaphore, IpcMutex, Result, SyncOptions};

/// Shared state of an [`IpcCondition`].
#[repr(C)]
#[derive(Debug)]
pub struct CondSharedState {
    waiters: AtomicI32,
    generation: AtomicU32,
    semaphore_id: AtomicU32,
}

impl CondSharedState {
    /// State with no active generation.
    pub const fn new() -> Self {
        Self {
            waiters: AtomicI32::new(-1),
            generation: AtomicU32::new(0),
            semaphore_id: AtomicU32::new(0),
        }
    }

    pub fn waiters(&self) -> i32 {
        self.waiters.load(Ordering::Relaxed)
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn semaphore_id(&self) -> u32 {
        self.semaphore_id.load(Ordering::Relaxed)
    }
}

impl Default for CondSharedState {
    fn default() -> Self {
        Self::new()
    }
}

fn state_name(name: &str) -> String {
    format!("{name}_CV_STATE_")
}

fn semaphore_prefix(name: &str) -> String {
    format!("{name}_CV_SEM_")
}

/// The shared block, borrowed through the `state` field only so that the
/// semaphore pool can be borrowed mutably next to it.
fn state_of(state: &NonNull<CondSharedState>) -> &CondSharedState {
    // Safety: the block stays mapped for as long as its IpcCondition lives.
    unsafe { state.as_ref() }
}

/// Undo a registration whose notification slot was never consumed.
/// If the generation moved on, a notifier already settled the count.
fn unregister(state: &CondSharedState, generation: u32) {
    let waiters = state.waiters.load(Ordering::Relaxed);
    if generation == state.generation.load(Ordering::Relaxed) && waiters > 0 {
        state.waiters.store(waiters - 1, Ordering::Relaxed);
    }
}

/// The cached semaphore with `id`, opening it if this process has not yet.
fn active_semaphore(pool: &mut SemaphorePool, id: u32) -> Result<SemKey> {
    if let Some(key) = pool.current() {
        if pool.id(key) == id {
            return Ok(key);
        }
    }
    let key = pool.get_semaphore(id)?;
    pool.set_current(key);
    Ok(key)
}

/// A named, inter-process condition variable.
///
/// Every operation must be called with the associated [`IpcMutex`] held.
/// An instance caches semaphore handles for its process and is not meant
/// to be shared between threads; each participant opens its own.
pub struct IpcCondition {
    state: NonNull<CondSharedState>,
    shm: Option<ShmHandle>,
    pool: SemaphorePool,
}

// Safety: the shared block is only touched while the associated mutex is
// held, and the pool is owned by this instance.
unsafe impl Send for IpcCondition {}

impl IpcCondition {
    /// Open (or create) a named condition variable.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, &SyncOptions::default())
    }

    pub fn open_with(name: &str, opts: &SyncOptions) -> Result<Self> {
        let shm = ShmHandle::acquire_for::<CondSharedState>(&state_name(name), &opts.permissions)?;
        // The mapping succeeded, so the base address is non-null.
        let state = unsafe { NonNull::new_unchecked(shm.get() as *mut CondSharedState) };
        if shm.is_first() {
            // A fresh segment is zero-filled. Unless a racing opener has
            // already registered, start with no active generation.
            let _ = unsafe { state.as_ref() }.waiters.compare_exchange(
                0,
                -1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
        Ok(Self {
            state,
            shm: Some(shm),
            pool: SemaphorePool::new(
                semaphore_prefix(name),
                opts.permissions,
                opts.non_zero_timeout,
            ),
        })
    }

    /// Build a condition variable over a state block placed by an external
    /// allocator. Pooled semaphores are named `<semaphore_prefix><8 hex>`.
    ///
    /// # Safety
    /// `state` must point to a `CondSharedState` that stays mapped for the
    /// lifetime of the returned value and is only accessed by condition
    /// variables sharing the same mutex and prefix.
    pub unsafe fn from_shared(
        state: NonNull<CondSharedState>,
        semaphore_prefix: &str,
        opts: &SyncOptions,
    ) -> Self {
        Self {
            state,
            shm: None,
            pool: SemaphorePool::new(
                semaphore_prefix.to_string(),
                opts.permissions,
                opts.non_zero_timeout,
            ),
        }
    }

    fn shared(&self) -> &CondSharedState {
        state_of(&self.state)
    }

    pub fn shared_state(&self) -> &CondSharedState {
        self.shared()
    }

    /// Current generation counter.
    pub fn generation(&self) -> u32 {
        self.shared().generation()
    }

    /// Registered waiters of the current generation, -1 if none is active.
    pub fn waiters(&self) -> i32 {
        self.shared().waiters()
    }

    /// Id of the semaphore serving the current generation, if any.
    pub fn active_semaphore_id(&self) -> Option<u32> {
        let state = self.shared();
        (state.waiters() >= 0).then(|| state.semaphore_id())
    }

    /// Wait for a notification. `mtx` must be held by the caller; it is
    /// released while blocked and held again on return, whatever the outcome.
    ///
    /// Returns `Ok(true)` when woken by a notification, `Ok(false)` when
    /// `abort` fired first.
    pub fn wait(&mut self, mtx: &IpcMutex, abort: Option<&AbortHandle>) -> Result<bool> {
        let state = state_of(&self.state);

        let mut waiters = state.waiters.load(Ordering::Relaxed);
        let key = if waiters < 0 {
            let key = self.pool.get_unused_semaphore()?;
            self.pool.set_current(key);
            let generation = state.generation.load(Ordering::Relaxed).wrapping_add(1);
            let id = self.pool.id(key);
            state.generation.store(generation, Ordering::Relaxed);
            state.semaphore_id.store(id, Ordering::Relaxed);
            debug!("condition generation {generation} waits on semaphore {id:08x}");
            waiters = 0;
            key
        } else {
            if waiters >= i32::MAX - 1 {
                return Err(Error::Limitation(
                    "too many waiters on an interprocess condition variable",
                ));
            }
            active_semaphore(&mut self.pool, state.semaphore_id.load(Ordering::Relaxed))?
        };

        state.waiters.store(waiters + 1, Ordering::Relaxed);
        let generation = state.generation.load(Ordering::Relaxed);

        if let Err(e) = mtx.unlock() {
            mtx.lock()?;
            unregister(state, generation);
            return Err(e);
        }

        let semaphore: &InterprocessSemaphore = self.pool.semaphore(key);
        let result = match abort {
            Some(abort) => semaphore.wait_abortable(abort),
            None => semaphore.wait().map(|()| true),
        };
        let consumed = matches!(result, Ok(true));

        if let Err(e) = mtx.lock() {
            // The mutex is not held here; settle the count anyway rather
            // than leave a registration nobody will consume.
            if !consumed {
                unregister(state, generation);
            }
            return Err(e);
        }

        if !consumed {
            unregister(state, generation);
        }
        result
    }

    /// Wake one waiter of the current generation.
    pub fn notify_one(&mut self) -> Result<()> {
        let state = state_of(&self.state);
        let waiters = state.waiters.load(Ordering::Relaxed);
        if waiters > 0 {
            let key = active_semaphore(&mut self.pool, state.semaphore_id.load(Ordering::Relaxed))?;
            self.pool.semaphore(key).post(1)?;
            state.waiters.store(waiters - 1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Wake every waiter of the current generation and retire it.
    pub fn notify_all(&mut self) -> Result<()> {
        let state = state_of(&self.state);
        let waiters = state.waiters.load(Ordering::Relaxed);
        if waiters > 0 {
            let key = active_semaphore(&mut self.pool, state.semaphore_id.load(Ordering::Relaxed))?;
            self.pool.semaphore(key).post(waiters as u32)?;
            state.waiters.store(-1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Number of semaphores cached by this instance.
    pub fn cached_semaphores(&self) -> usize {
        self.pool.len()
    }

    /// Remove the shared state segment of a named condition variable.
    ///
    /// Pooled semaphore names are removed by the last instance to drop.
    pub fn clear_storage(name: &str) {
        ShmHandle::clear_storage(&state_name(name));
    }
}

impl Drop for IpcCondition {
    fn drop(&mut self) {
        if let Some(shm) = self.shm.as_mut() {
            if shm.release() {
                for name in self.pool.cached_names() {
                    InterprocessSemaphore::clear_storage(&name);
                }
            }
        }
    }
}
