// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory segment hosting the shared state blocks of mutexes
// and condition variables.

use std::io;

use crate::platform::{PlatformShm, ShmMode};
use crate::{Error, Permissions, Result};

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively: fail if already exists.
    Create,
    /// Open existing: fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

/// A named, inter-process shared memory region.
///
/// A trailing atomic reference counter is shared between every process
/// mapping the segment; new segments are zero-filled and the last handle
/// to drop removes the name.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a named shared memory region of `size` bytes (user-visible).
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> Result<Self> {
        Self::acquire_with(name, size, mode, &Permissions::default())
    }

    pub fn acquire_with(
        name: &str,
        size: usize,
        mode: ShmOpenMode,
        perms: &Permissions,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::system(
                "failed to map a shared memory segment",
                io::Error::new(io::ErrorKind::InvalidInput, "size is 0"),
            ));
        }
        let platform_mode = match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        };
        let inner = PlatformShm::acquire(name, size, platform_mode, perms)?;
        Ok(Self { inner })
    }

    /// Map a segment sized for one `T`.
    pub(crate) fn acquire_for<T>(name: &str, perms: &Permissions) -> Result<Self> {
        Self::acquire_with(
            name,
            std::mem::size_of::<T>(),
            ShmOpenMode::CreateOrOpen,
            perms,
        )
    }

    /// Mutable pointer to the start of the user-visible region.
    pub fn get(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// User-requested size (the usable portion).
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// Whether this handle was the first to map the segment.
    pub fn is_first(&self) -> bool {
        self.inner.prev_ref_count() == 0
    }

    /// Current reference count (number of handles mapping this segment).
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// Drop this handle's reference ahead of the handle itself. Returns
    /// `true` for the last reference; the segment is then retired and no
    /// other opener adopts it, so the caller may remove companion objects
    /// before the segment name goes away on drop.
    pub(crate) fn release(&mut self) -> bool {
        self.inner.release()
    }

    /// Remove the backing storage for a named shm segment.
    pub fn clear_storage(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn unique_name(tag: &str) -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("ut_shm_{tag}_{n}_{}", std::process::id())
    }

    #[test]
    fn release_reports_last_reference() {
        let name = unique_name("last");
        ShmHandle::clear_storage(&name);

        let mut a = ShmHandle::acquire(&name, 16, ShmOpenMode::CreateOrOpen).unwrap();
        let mut b = ShmHandle::acquire(&name, 16, ShmOpenMode::CreateOrOpen).unwrap();
        assert!(!a.release());
        assert!(!a.release(), "a second release is a no-op");
        assert_eq!(b.ref_count(), 1);
        assert!(b.release());
    }

    #[test]
    fn retired_segment_is_not_adopted() {
        let name = unique_name("retired");
        ShmHandle::clear_storage(&name);

        let mut old = ShmHandle::acquire(&name, 16, ShmOpenMode::CreateOrOpen).unwrap();
        unsafe { old.get().write(0x7f) };
        assert!(old.release());

        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let name2 = name.clone();
        let late = thread::spawn(move || {
            let shm = ShmHandle::acquire(&name2, 16, ShmOpenMode::CreateOrOpen).unwrap();
            done2.store(true, Ordering::SeqCst);
            (shm.is_first(), unsafe { shm.get().read() })
        });

        // The late opener backs off while the retired name still exists.
        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        drop(old);
        let (is_first, byte) = late.join().unwrap();
        assert!(is_first);
        assert_eq!(byte, 0);
    }
}
