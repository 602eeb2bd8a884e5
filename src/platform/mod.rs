// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named-object capability: create / open / create-or-open a named event or
// semaphore, blocking and abortable waits, zero-timeout probes, release.
// The synchronization logic above this layer never touches OS calls.

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use posix::{PlatformEvent, PlatformSemaphore, PlatformShm, ShmMode};

#[cfg(windows)]
pub use windows::{PlatformEvent, PlatformSemaphore, PlatformShm, ShmMode};
