// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named interprocess event.

use crate::platform::PlatformEvent;
use crate::{AbortHandle, Permissions, Result};

/// A named event shared between processes.
///
/// Auto-reset events release one waiter per `set`; manual-reset events stay
/// signaled until `reset`. The local handle is closed on drop; the named
/// object itself lives on while other processes reference it.
pub struct InterprocessEvent {
    inner: PlatformEvent,
}

impl InterprocessEvent {
    /// Create a new named event. Fails if an object with this name exists.
    pub fn create(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let inner = PlatformEvent::create(name, manual_reset, perms)?;
        Ok(Self { inner })
    }

    /// Create the event, or adopt the existing one if another process
    /// created it first.
    pub fn create_or_open(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let inner = PlatformEvent::create_or_open(name, manual_reset, perms)?;
        Ok(Self { inner })
    }

    /// Open an existing named event.
    pub fn open(name: &str) -> Result<Self> {
        let inner = PlatformEvent::open(name)?;
        Ok(Self { inner })
    }

    /// Whether this handle performed the creation of the named object.
    pub fn is_creator(&self) -> bool {
        self.inner.created()
    }

    pub fn set(&self) -> Result<()> {
        self.inner.set()
    }

    pub fn reset(&self) -> Result<()> {
        self.inner.reset()
    }

    /// Block until the event is signaled.
    pub fn wait(&self) -> Result<()> {
        self.inner.wait()
    }

    /// Block until the event is signaled or `abort` fires.
    /// Returns `Ok(true)` when signaled, `Ok(false)` when aborted.
    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        self.inner.wait_abortable(abort)
    }

    /// Remove the persistent name of an event (no-op on Windows).
    pub fn clear_storage(name: &str) {
        PlatformEvent::unlink(name);
    }
}

impl std::fmt::Debug for InterprocessEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterprocessEvent")
            .field("is_creator", &self.is_creator())
            .finish()
    }
}
