// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named interprocess semaphore with a zero-count probe.
// The probe strategy is picked once per process, the first time any
// semaphore is probed, and published through an atomic selector.

use std::sync::atomic::{AtomicU8, Ordering};

use log::trace;

use crate::platform::PlatformSemaphore;
use crate::{AbortHandle, Permissions, Result};

const PROBE_UNSELECTED: u8 = 0;
const PROBE_ACCURATE: u8 = 1;
const PROBE_EMULATED: u8 = 2;

// Concurrent first calls may all run the capability check; whichever store
// lands last wins, and both outcomes are valid.
static PROBE: AtomicU8 = AtomicU8::new(PROBE_UNSELECTED);

/// How `is_zero_count` inspects a semaphore on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroCountProbe {
    /// Side-effect-free count query (`sem_getvalue`, `NtQuerySemaphore`).
    Accurate,
    /// Zero-timeout acquire followed by a release when it succeeds.
    Emulated,
}

/// The strategy selected for this process, if any probe has run yet.
pub fn zero_count_probe() -> Option<ZeroCountProbe> {
    match PROBE.load(Ordering::Acquire) {
        PROBE_ACCURATE => Some(ZeroCountProbe::Accurate),
        PROBE_EMULATED => Some(ZeroCountProbe::Emulated),
        _ => None,
    }
}

/// A named counting semaphore shared between processes.
///
/// Created with a zero count and the platform's largest maximum count.
pub struct InterprocessSemaphore {
    inner: PlatformSemaphore,
}

impl InterprocessSemaphore {
    /// Create a new named semaphore. Fails if an object with this name exists.
    pub fn create(name: &str, perms: &Permissions) -> Result<Self> {
        let inner = PlatformSemaphore::create(name, perms)?;
        Ok(Self { inner })
    }

    /// Create the semaphore, or adopt the existing one if another process
    /// created it first.
    pub fn create_or_open(name: &str, perms: &Permissions) -> Result<Self> {
        let inner = PlatformSemaphore::create_or_open(name, perms)?;
        Ok(Self { inner })
    }

    /// Open an existing named semaphore.
    pub fn open(name: &str) -> Result<Self> {
        let inner = PlatformSemaphore::open(name)?;
        Ok(Self { inner })
    }

    /// Whether this handle performed the creation of the named object.
    pub fn is_creator(&self) -> bool {
        self.inner.created()
    }

    pub fn wait(&self) -> Result<()> {
        self.inner.wait()
    }

    /// Returns `Ok(false)` if `abort` fired before a unit was acquired.
    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        self.inner.wait_abortable(abort)
    }

    /// Zero-timeout acquire.
    pub fn try_wait(&self) -> Result<bool> {
        self.inner.try_wait()
    }

    /// Release `count` units.
    pub fn post(&self, count: u32) -> Result<()> {
        self.inner.post(count)
    }

    /// Whether the semaphore's count is currently zero.
    pub fn is_zero_count(&self) -> Result<bool> {
        match PROBE.load(Ordering::Acquire) {
            PROBE_ACCURATE => self.is_zero_count_accurate(),
            PROBE_EMULATED => self.is_zero_count_emulated(),
            _ => self.is_zero_count_init(),
        }
    }

    fn is_zero_count_init(&self) -> Result<bool> {
        match self.inner.query_count()? {
            Some(count) => {
                trace!("zero-count probe: accurate count query");
                PROBE.store(PROBE_ACCURATE, Ordering::Release);
                Ok(count == 0)
            }
            None => {
                trace!("zero-count probe: emulated via zero-timeout acquire");
                PROBE.store(PROBE_EMULATED, Ordering::Release);
                self.is_zero_count_emulated()
            }
        }
    }

    fn is_zero_count_accurate(&self) -> Result<bool> {
        match self.inner.query_count()? {
            Some(count) => Ok(count == 0),
            None => self.is_zero_count_emulated(),
        }
    }

    /// A concurrent acquirer may observe the transient decrement.
    pub(crate) fn is_zero_count_emulated(&self) -> Result<bool> {
        if !self.inner.try_wait()? {
            return Ok(true);
        }
        self.inner.post(1)?;
        Ok(false)
    }

    /// Exact count when the host supports querying it.
    pub fn count(&self) -> Result<Option<u32>> {
        self.inner.query_count()
    }

    /// Remove the persistent name of a semaphore (no-op on Windows).
    pub fn clear_storage(name: &str) {
        PlatformSemaphore::unlink(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        use std::sync::atomic::AtomicUsize;
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("ut_sem_{tag}_{n}_{}", std::process::id())
    }

    #[test]
    fn emulated_probe_restores_count() {
        let name = unique_name("emulated");
        InterprocessSemaphore::clear_storage(&name);
        let sem = InterprocessSemaphore::create_or_open(&name, &Permissions::default()).unwrap();

        assert!(sem.is_zero_count_emulated().unwrap());

        sem.post(3).unwrap();
        assert!(!sem.is_zero_count_emulated().unwrap());
        if let Some(count) = sem.count().unwrap() {
            assert_eq!(count, 3);
        }
        for _ in 0..3 {
            assert!(sem.try_wait().unwrap());
        }
        assert!(!sem.try_wait().unwrap());

        InterprocessSemaphore::clear_storage(&name);
    }

    #[test]
    fn probe_is_selected_once_and_published() {
        let name = unique_name("select");
        InterprocessSemaphore::clear_storage(&name);
        let sem = InterprocessSemaphore::create_or_open(&name, &Permissions::default()).unwrap();

        assert!(sem.is_zero_count().unwrap());
        let first = zero_count_probe().expect("selected after first probe");
        assert!(sem.is_zero_count().unwrap());
        assert_eq!(zero_count_probe(), Some(first));

        InterprocessSemaphore::clear_storage(&name);
    }
}
