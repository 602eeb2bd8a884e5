// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy shared by all interprocess primitives.

use std::io;

use thiserror::Error;

/// Errors reported by the interprocess primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying OS call failed. Carries the native error code.
    #[error("{context}: {source}")]
    System {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// A fixed-size counter or the semaphore id space would overflow.
    #[error("{0}")]
    Limitation(&'static str),

    /// An object name could not be prepared for the OS.
    #[error("invalid object name: {0}")]
    Conversion(String),
}

impl Error {
    /// Build a `System` error from the calling thread's last OS error.
    pub(crate) fn last_os(context: &'static str) -> Self {
        Self::System {
            context,
            source: io::Error::last_os_error(),
        }
    }

    /// Build a `System` error from an explicit native error code.
    #[cfg(any(windows, test))]
    pub(crate) fn from_os(context: &'static str, code: i32) -> Self {
        Self::System {
            context,
            source: io::Error::from_raw_os_error(code),
        }
    }

    pub(crate) fn system(context: &'static str, source: io::Error) -> Self {
        Self::System { context, source }
    }

    /// Native error code for `System` errors (`errno` / `GetLastError()`).
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::System { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_limitation(&self) -> bool {
        matches!(self, Self::Limitation(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
