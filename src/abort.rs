// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cooperative cancellation for blocking waits.
// POSIX: a shared flag polled by the sliced wait loop in platform::posix.
// Windows: an unnamed manual-reset event waited on alongside the target.

use crate::Result;

/// Externally triggered signal that interrupts `wait` calls.
///
/// Clones share the same underlying signal. Once aborted, every abortable
/// wait using this handle returns `false` until `reset` is called.
#[derive(Clone)]
pub struct AbortHandle {
    #[cfg(unix)]
    flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
    #[cfg(windows)]
    event: std::sync::Arc<crate::platform::windows::OwnedHandle>,
}

#[cfg(unix)]
impl AbortHandle {
    pub fn new() -> Result<Self> {
        Ok(Self {
            flag: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    pub fn abort(&self) -> Result<()> {
        self.flag.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.flag.store(false, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(windows)]
impl AbortHandle {
    pub fn new() -> Result<Self> {
        let event = crate::platform::windows::create_abort_event()?;
        Ok(Self {
            event: std::sync::Arc::new(event),
        })
    }

    pub fn abort(&self) -> Result<()> {
        crate::platform::windows::set_event(self.event.raw())
    }

    pub fn reset(&self) -> Result<()> {
        crate::platform::windows::reset_event(self.event.raw())
    }

    pub fn is_aborted(&self) -> bool {
        crate::platform::windows::is_signaled(self.event.raw())
    }

    pub(crate) fn raw(&self) -> windows_sys::Win32::Foundation::HANDLE {
        self.event.raw()
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
