// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Access-control data handed to object creation calls. Opaque to the
// synchronization logic; only the platform layer reads it.

/// Permissions applied when a named object is created.
///
/// POSIX: file mode bits given to `sem_open` / `shm_open` (default `0o666`).
/// Windows: an optional `SECURITY_ATTRIBUTES` pointer (default: none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    #[cfg(unix)]
    mode: u32,
    #[cfg(windows)]
    attrs: *mut windows_sys::Win32::Security::SECURITY_ATTRIBUTES,
}

// Safety: the security descriptor is only read by the OS during creation.
unsafe impl Send for Permissions {}
unsafe impl Sync for Permissions {}

impl Permissions {
    #[cfg(unix)]
    pub const fn with_mode(mode: u32) -> Self {
        Self { mode }
    }

    #[cfg(unix)]
    pub(crate) fn mode(&self) -> u32 {
        self.mode
    }

    /// # Safety
    /// `attrs` must stay valid for as long as this value is used in
    /// creation calls.
    #[cfg(windows)]
    pub unsafe fn from_security_attributes(
        attrs: *mut windows_sys::Win32::Security::SECURITY_ATTRIBUTES,
    ) -> Self {
        Self { attrs }
    }

    #[cfg(windows)]
    pub(crate) fn native(&self) -> *const windows_sys::Win32::Security::SECURITY_ATTRIBUTES {
        self.attrs
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            #[cfg(unix)]
            mode: 0o666, // S_IRUSR|S_IWUSR|S_IRGRP|S_IWGRP|S_IROTH|S_IWOTH
            #[cfg(windows)]
            attrs: std::ptr::null_mut(),
        }
    }
}
