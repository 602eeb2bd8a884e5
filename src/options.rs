// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::time::Duration;

use crate::Permissions;

/// How long a pooled semaphore may stay non-zero before the waiter that
/// should have consumed it is presumed dead.
pub const DEFAULT_NON_ZERO_TIMEOUT: Duration = Duration::from_secs(2);

/// Creation-time settings shared by all primitives.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub permissions: Permissions,
    /// Crash-detection timeout used by condition variables.
    pub non_zero_timeout: Duration,
}

impl SyncOptions {
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_non_zero_timeout(mut self, timeout: Duration) -> Self {
        self.non_zero_timeout = timeout;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            permissions: Permissions::default(),
            non_zero_timeout: DEFAULT_NON_ZERO_TIMEOUT,
        }
    }
}
