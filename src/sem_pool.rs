// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-local cache of the named semaphores a condition variable waits on.
// Entries live in a slab arena; `by_id` indexes them by semaphore id and
// `recency` orders them from least to most recently handed out.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, warn};
use slab::Slab;

use crate::object_name::semaphore_name;
use crate::{Error, InterprocessSemaphore, Permissions, Result};

/// Arena key of a cached semaphore.
pub(crate) type SemKey = usize;

/// `left < right` in the circular 32-bit id space.
pub(crate) fn is_overflow_less(left: u32, right: u32) -> bool {
    left.wrapping_sub(right) & 0x8000_0000 != 0
}

pub(crate) struct SemaphoreInfo {
    id: u32,
    semaphore: InterprocessSemaphore,
    last_check_for_zero: Instant,
    checked_for_zero: bool,
}

impl SemaphoreInfo {
    fn new(id: u32, semaphore: InterprocessSemaphore) -> Self {
        Self {
            id,
            semaphore,
            last_check_for_zero: Instant::now(),
            checked_for_zero: false,
        }
    }

    /// Called when the semaphore was found non-zero. The first call starts
    /// the clock; later calls report whether it has stayed non-zero for at
    /// least `timeout`.
    fn check_non_zero_timeout(&mut self, now: Instant, timeout: Duration) -> bool {
        if !self.checked_for_zero {
            self.checked_for_zero = true;
            self.last_check_for_zero = now;
            return false;
        }
        now.saturating_duration_since(self.last_check_for_zero) >= timeout
    }
}

pub(crate) struct SemaphorePool {
    prefix: String,
    perms: Permissions,
    non_zero_timeout: Duration,
    entries: Slab<SemaphoreInfo>,
    by_id: BTreeMap<u32, SemKey>,
    recency: VecDeque<SemKey>,
    current: Option<SemKey>,
    next_id: u32,
}

impl SemaphorePool {
    pub(crate) fn new(prefix: String, perms: Permissions, non_zero_timeout: Duration) -> Self {
        Self {
            prefix,
            perms,
            non_zero_timeout,
            entries: Slab::new(),
            by_id: BTreeMap::new(),
            recency: VecDeque::new(),
            current: None,
            next_id: 0,
        }
    }

    pub(crate) fn current(&self) -> Option<SemKey> {
        self.current
    }

    pub(crate) fn set_current(&mut self, key: SemKey) {
        self.current = Some(key);
    }

    pub(crate) fn id(&self, key: SemKey) -> u32 {
        self.entries[key].id
    }

    pub(crate) fn semaphore(&self, key: SemKey) -> &InterprocessSemaphore {
        &self.entries[key].semaphore
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn contains_id(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Object names of every cached semaphore.
    pub(crate) fn cached_names(&self) -> Vec<String> {
        self.by_id
            .keys()
            .map(|&id| semaphore_name(&self.prefix, id))
            .collect()
    }

    /// Ids in recency order, least recently handed out first.
    #[cfg(test)]
    pub(crate) fn ids_by_recency(&self) -> Vec<u32> {
        self.recency.iter().map(|&key| self.entries[key].id).collect()
    }

    fn touch(&mut self, key: SemKey) {
        if let Some(pos) = self.recency.iter().position(|&k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key);
    }

    fn insert(&mut self, id: u32, semaphore: InterprocessSemaphore) -> SemKey {
        let key = self.entries.insert(SemaphoreInfo::new(id, semaphore));
        self.by_id.insert(id, key);
        self.recency.push_back(key);
        key
    }

    /// Drop the entry at `pos` in the recency list, closing the local handle.
    fn evict(&mut self, pos: usize) {
        if let Some(key) = self.recency.remove(pos) {
            let info = self.entries.remove(key);
            self.by_id.remove(&info.id);
            if self.current == Some(key) {
                self.current = None;
            }
        }
    }

    /// Restart the crash-detection clock and consider this entry last.
    fn mark_unused(&mut self, key: SemKey) {
        self.entries[key].checked_for_zero = false;
        self.touch(key);
    }

    /// Find or open the semaphore with `id`.
    ///
    /// Every process that has the semaphore open may have exited, so the
    /// named object is created if it no longer exists.
    pub(crate) fn get_semaphore(&mut self, id: u32) -> Result<SemKey> {
        if let Some(&key) = self.by_id.get(&id) {
            self.touch(key);
            return Ok(key);
        }
        let semaphore =
            InterprocessSemaphore::create_or_open(&semaphore_name(&self.prefix, id), &self.perms)?;
        Ok(self.insert(id, semaphore))
    }

    /// Find or create a semaphore whose count is zero, reclaiming cached
    /// semaphores that have stayed non-zero past the crash-detection timeout.
    pub(crate) fn get_unused_semaphore(&mut self) -> Result<SemKey> {
        if let Some(key) = self.current {
            if self.entries[key].semaphore.is_zero_count()? {
                self.mark_unused(key);
                return Ok(key);
            }
        }

        let now = Instant::now();
        let mut pos = 0;
        while pos < self.recency.len() {
            let key = self.recency[pos];
            let id = self.entries[key].id;
            if is_overflow_less(self.next_id, id) || self.next_id == id {
                self.next_id = id.wrapping_add(1);
            }

            let info = &mut self.entries[key];
            if info.semaphore.is_zero_count()? {
                self.mark_unused(key);
                return Ok(key);
            }
            if info.check_non_zero_timeout(now, self.non_zero_timeout) {
                warn!(
                    "semaphore {} stayed non-zero for {:?}; a waiter must have crashed, closing it",
                    semaphore_name(&self.prefix, id),
                    self.non_zero_timeout
                );
                self.evict(pos);
            } else {
                pos += 1;
            }
        }

        let start = self.next_id;
        let end = start.wrapping_sub(1);
        let mut id = start;
        while id != end {
            let candidate = id;
            id = id.wrapping_add(1);

            let name = semaphore_name(&self.prefix, candidate);
            let semaphore = match InterprocessSemaphore::create_or_open(&name, &self.perms) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    debug!("skipping semaphore {name}: {e}");
                    continue;
                }
            };
            // Non-zero: another process is blocked on it, or reused the id first.
            match semaphore.is_zero_count() {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("skipping semaphore {name}: {e}");
                    continue;
                }
            }

            let key = match self.by_id.get(&candidate) {
                // Already cached and drained in the meantime.
                Some(&key) => {
                    self.mark_unused(key);
                    key
                }
                None => {
                    debug!(
                        "{} semaphore {name}",
                        if semaphore.is_creator() { "created" } else { "adopted" }
                    );
                    self.insert(candidate, semaphore)
                }
            };
            self.next_id = candidate.wrapping_add(1);
            return Ok(key);
        }

        Err(Error::Limitation(
            "too many semaphores are actively used for an interprocess condition variable",
        ))
    }
}
