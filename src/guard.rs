// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard that holds an interprocess mutex for its lifetime.

use crate::{IpcMutex, Result};

/// Locks the mutex on construction, unlocks on drop.
pub struct IpcMutexGuard<'a> {
    mtx: &'a IpcMutex,
}

impl<'a> IpcMutexGuard<'a> {
    pub fn new(mtx: &'a IpcMutex) -> Result<Self> {
        mtx.lock()?;
        Ok(Self { mtx })
    }

    /// The held mutex, e.g. to pass to `IpcCondition::wait`.
    pub fn mutex(&self) -> &'a IpcMutex {
        self.mtx
    }
}

impl<'a> Drop for IpcMutexGuard<'a> {
    fn drop(&mut self) {
        let _ = self.mtx.unlock();
    }
}
