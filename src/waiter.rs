// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Predicate wait helper: a named mutex and condition variable plus a quit
// signal, for "sleep until the shared data changes" loops.

use crate::{AbortHandle, IpcCondition, IpcMutex, Result, SyncOptions};

/// A named waiter combining a condition variable, a mutex, and a quit signal.
///
/// The quit signal is process-local: clone it with [`Waiter::quit_handle`]
/// to stop a waiting thread of the same process.
pub struct Waiter {
    cond: IpcCondition,
    lock: IpcMutex,
    quit: AbortHandle,
}

impl Waiter {
    /// Open a named waiter. The mutex and condition variable get names
    /// derived from `name`.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, &SyncOptions::default())
    }

    pub fn open_with(name: &str, opts: &SyncOptions) -> Result<Self> {
        let cond = IpcCondition::open_with(&format!("{name}_WAITER_COND_"), opts)?;
        let lock = IpcMutex::open_with(&format!("{name}_WAITER_LOCK_"), opts)?;
        Ok(Self {
            cond,
            lock,
            quit: AbortHandle::new()?,
        })
    }

    /// The mutex guarding the predicate's shared data.
    pub fn mutex(&self) -> &IpcMutex {
        &self.lock
    }

    /// Block while `pred` returns `true`. `pred` runs with the mutex held.
    /// Returns `Ok(false)` if quit was signalled, `Ok(true)` otherwise.
    pub fn wait_if<F>(&mut self, mut pred: F) -> Result<bool>
    where
        F: FnMut() -> bool,
    {
        self.lock.lock()?;
        while !self.quit.is_aborted() && pred() {
            if let Err(e) = self.cond.wait(&self.lock, Some(&self.quit)) {
                let _ = self.lock.unlock();
                return Err(e);
            }
        }
        self.lock.unlock()?;
        Ok(!self.quit.is_aborted())
    }

    /// Wake one waiter.
    pub fn notify(&mut self) -> Result<()> {
        self.lock.lock()?;
        let result = self.cond.notify_one();
        self.lock.unlock()?;
        result
    }

    /// Wake all waiters.
    pub fn broadcast(&mut self) -> Result<()> {
        self.lock.lock()?;
        let result = self.cond.notify_all();
        self.lock.unlock()?;
        result
    }

    /// Handle that makes `wait_if` return `false` when aborted.
    pub fn quit_handle(&self) -> AbortHandle {
        self.quit.clone()
    }

    /// Signal quit to threads of this process blocked in `wait_if`.
    pub fn quit_waiting(&self) -> Result<()> {
        self.quit.abort()
    }

    /// Remove the backing storage for a named waiter.
    pub fn clear_storage(name: &str) {
        IpcCondition::clear_storage(&format!("{name}_WAITER_COND_"));
        IpcMutex::clear_storage(&format!("{name}_WAITER_LOCK_"));
    }
}
