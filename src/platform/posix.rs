// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of the named-object capability: shared memory
// segments, named semaphores, and events emulated on named semaphores.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use crate::object_name;
use crate::{AbortHandle, Error, Permissions, Result};

#[cfg(not(target_os = "macos"))]
/// Granularity at which abortable waits re-check their abort handle.
const WAIT_SLICE: Duration = Duration::from_millis(10);

fn c_name(name: &str) -> Result<CString> {
    let posix_name = object_name::make_object_name(name)?;
    CString::new(posix_name).map_err(|e| Error::Conversion(e.to_string()))
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Adaptive backoff: busy spin, then CPU pause hint, then thread yield,
/// then 1ms sleeps.
#[inline]
fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(Duration::from_millis(1));
        return;
    }
    *k += 1;
}

// ---------------------------------------------------------------------------
// Layout helpers: user block followed by an atomic reference counter
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// Returns the trailing `AtomicI32` ref-counter inside a mapped region of
/// `total_size` bytes starting at `mem`.
///
/// # Safety
/// `mem` must point to a valid mapped region of at least `total_size` bytes.
unsafe fn acc_of<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm: POSIX shared memory
// ---------------------------------------------------------------------------

/// Ref-count value of a segment whose last user is removing it. Openers
/// that map a retired segment back off until the name is gone.
const RETIRED: i32 = i32::MIN;

/// How long an opener waits for a creator to size a new segment, or for a
/// retired segment's name to be removed.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // total mapped size (including ref counter)
    user_size: usize, // user-requested size
    name: CString,    // POSIX name (with leading '/')
    prev_ref: i32,    // ref count before our increment (0 means we were first)
    released: Option<bool>, // Some(last) once our reference was dropped
}

// Safety: the shared memory region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

/// Block until the creator of `fd` has given it at least `total_size` bytes.
fn wait_until_sized(fd: libc::c_int, total_size: usize) -> Result<()> {
    let start = Instant::now();
    let mut k = 0u32;
    loop {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            return Err(Error::last_os("failed to inspect a shared memory segment"));
        }
        if st.st_size as usize >= total_size {
            return Ok(());
        }
        if start.elapsed() >= SETTLE_TIMEOUT {
            return Err(Error::system(
                "failed to open a shared memory segment",
                io::Error::new(io::ErrorKind::TimedOut, "segment was never sized by its creator"),
            ));
        }
        adaptive_yield(&mut k);
    }
}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode, perms: &Permissions) -> Result<Self> {
        let c_name = c_name(name)?;
        let start = Instant::now();
        let mut k = 0u32;
        loop {
            if let Some(shm) = Self::try_acquire(&c_name, user_size, mode, perms)? {
                return Ok(shm);
            }
            if start.elapsed() >= SETTLE_TIMEOUT {
                return Err(Error::system(
                    "failed to open a shared memory segment",
                    io::Error::new(io::ErrorKind::TimedOut, "retired segment was never removed"),
                ));
            }
            adaptive_yield(&mut k);
        }
    }

    /// One attempt to map the segment. `Ok(None)` means it was retired by
    /// its last user and the name is about to disappear.
    fn try_acquire(
        c_name: &CString,
        user_size: usize,
        mode: ShmMode,
        perms: &Permissions,
    ) -> Result<Option<Self>> {
        let mode_bits = perms.mode() as libc::mode_t;
        let total_size = calc_size(user_size);

        let open_excl = || unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                mode_bits as libc::c_uint,
            )
        };
        let open_existing =
            || unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, mode_bits as libc::c_uint) };

        // Only the creator truncates: resizing an existing object may clobber
        // its contents on some platforms.
        let (fd, need_truncate) = match mode {
            ShmMode::Create => {
                let f = open_excl();
                if f == -1 {
                    return Err(Error::last_os("failed to create a shared memory segment"));
                }
                (f, true)
            }
            ShmMode::Open => {
                let f = open_existing();
                if f == -1 {
                    return Err(Error::last_os("failed to open a shared memory segment"));
                }
                (f, false)
            }
            ShmMode::CreateOrOpen => {
                let f = open_excl();
                if f != -1 {
                    (f, true)
                } else {
                    if errno() != libc::EEXIST {
                        return Err(Error::last_os("failed to create a shared memory segment"));
                    }
                    let f2 = open_existing();
                    if f2 == -1 {
                        if errno() == libc::ENOENT {
                            // Removed between the two calls: race for creation again.
                            return Ok(None);
                        }
                        return Err(Error::last_os("failed to open a shared memory segment"));
                    }
                    (f2, false)
                }
            }
        };

        if need_truncate {
            unsafe { libc::fchmod(fd, mode_bits) };
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            if ret != 0 {
                let err = Error::last_os("failed to size a shared memory segment");
                unsafe { libc::close(fd) };
                return Err(err);
            }
        } else if let Err(e) = wait_until_sized(fd, total_size) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(Error::last_os("failed to map a shared memory segment"));
        }
        let mem = mem as *mut u8;

        let acc = unsafe { acc_of(mem, total_size) };
        let mut prev = acc.load(Ordering::Acquire);
        loop {
            if prev < 0 {
                unsafe { libc::munmap(mem as *mut libc::c_void, total_size) };
                return Ok(None);
            }
            match acc.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(cur) => prev = cur,
            }
        }

        Ok(Some(Self {
            mem,
            size: total_size,
            user_size,
            name: c_name.clone(),
            prev_ref: prev,
            released: None,
        }))
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    pub fn ref_count(&self) -> i32 {
        unsafe { acc_of(self.mem, self.size).load(Ordering::Acquire) }.max(0)
    }

    /// Give up this handle's reference. Returns `true` for the last one,
    /// which retires the segment: its name is removed when the handle drops
    /// and nobody adopts it in the meantime.
    pub fn release(&mut self) -> bool {
        if let Some(last) = self.released {
            return last;
        }
        let acc = unsafe { acc_of(self.mem, self.size) };
        let mut cur = acc.load(Ordering::Acquire);
        let last = loop {
            let next = if cur <= 1 { RETIRED } else { cur - 1 };
            match acc.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break next == RETIRED,
                Err(actual) => cur = actual,
            }
        };
        self.released = Some(last);
        last
    }

    pub fn unlink_by_name(name: &str) {
        if let Ok(c_name) = c_name(name) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        let last = self.release();
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if last {
            unsafe { libc::shm_unlink(self.name.as_ptr()) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphore: POSIX named semaphore
// ---------------------------------------------------------------------------

/// Absolute `CLOCK_REALTIME` deadline `after` from now, as `sem_timedwait`
/// expects.
#[cfg(not(target_os = "macos"))]
fn deadline_after(after: Duration) -> libc::timespec {
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    let ns_total = ts.tv_nsec as u64 + after.subsec_nanos() as u64;
    ts.tv_sec += after.as_secs() as libc::time_t + (ns_total / 1_000_000_000) as libc::time_t;
    ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;
    ts
}

pub struct PlatformSemaphore {
    sem: *mut libc::sem_t,
    created: bool,
}

// Safety: POSIX semaphore operations are thread-safe.
unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

impl PlatformSemaphore {
    fn open_raw(name: &CString, oflag: libc::c_int, perms: &Permissions) -> io::Result<*mut libc::sem_t> {
        let sem = unsafe {
            libc::sem_open(
                name.as_ptr(),
                oflag,
                perms.mode() as libc::c_uint,
                0 as libc::c_uint, // initial count
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(sem)
    }

    /// Create a new semaphore with a zero count. Fails if the name exists.
    pub fn create(name: &str, perms: &Permissions) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = Self::open_raw(&c_name, libc::O_CREAT | libc::O_EXCL, perms)
            .map_err(|e| Error::system("failed to create an interprocess semaphore", e))?;
        Ok(Self { sem, created: true })
    }

    pub fn open(name: &str) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = Self::open_raw(&c_name, 0, &Permissions::default())
            .map_err(|e| Error::system("failed to open an interprocess semaphore", e))?;
        Ok(Self { sem, created: false })
    }

    /// Create the semaphore, or adopt it if another process won the race.
    pub fn create_or_open(name: &str, perms: &Permissions) -> Result<Self> {
        let c_name = c_name(name)?;
        loop {
            match Self::open_raw(&c_name, libc::O_CREAT | libc::O_EXCL, perms) {
                Ok(sem) => return Ok(Self { sem, created: true }),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {}
                Err(e) => return Err(Error::system("failed to create an interprocess semaphore", e)),
            }
            match Self::open_raw(&c_name, 0, perms) {
                Ok(sem) => return Ok(Self { sem, created: false }),
                // Unlinked between our two calls: race for creation again.
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => continue,
                Err(e) => return Err(Error::system("failed to open an interprocess semaphore", e)),
            }
        }
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn wait(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            if errno() != libc::EINTR {
                return Err(Error::last_os("failed to wait on an interprocess object"));
            }
        }
    }

    /// Wait until the count can be decremented or `abort` fires.
    /// Returns `Ok(false)` when aborted.
    #[cfg(not(target_os = "macos"))]
    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        loop {
            if abort.is_aborted() {
                return Ok(false);
            }
            let ts = deadline_after(WAIT_SLICE);
            if unsafe { libc::sem_timedwait(self.sem, &ts) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::ETIMEDOUT | libc::EINTR => {}
                _ => return Err(Error::last_os("failed to wait on an interprocess object")),
            }
        }
    }

    /// macOS has no `sem_timedwait`: poll with adaptive backoff.
    #[cfg(target_os = "macos")]
    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        let mut k = 0u32;
        loop {
            if self.try_wait()? {
                return Ok(true);
            }
            if abort.is_aborted() {
                return Ok(false);
            }
            adaptive_yield(&mut k);
        }
    }

    /// Zero-timeout acquire. `Ok(false)` means the count was zero.
    pub fn try_wait(&self) -> Result<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EAGAIN => return Ok(false),
                libc::EINTR => {}
                _ => return Err(Error::last_os("failed to poll an interprocess object")),
            }
        }
    }

    pub fn post(&self, count: u32) -> Result<()> {
        for _ in 0..count {
            if unsafe { libc::sem_post(self.sem) } != 0 {
                return Err(Error::last_os("failed to release an interprocess semaphore"));
            }
        }
        Ok(())
    }

    /// Exact current count, or `None` when the host cannot report it.
    #[cfg(not(target_os = "macos"))]
    pub fn query_count(&self) -> Result<Option<u32>> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } != 0 {
            if errno() == libc::ENOSYS {
                return Ok(None);
            }
            return Err(Error::last_os("failed to test an interprocess semaphore for zero count"));
        }
        // Linux reports 0 (never negative) when there are blocked waiters.
        Ok(Some(value.max(0) as u32))
    }

    /// `sem_getvalue` is deprecated and always fails with `ENOSYS` on macOS.
    #[cfg(target_os = "macos")]
    pub fn query_count(&self) -> Result<Option<u32>> {
        Ok(None)
    }

    pub fn unlink(name: &str) {
        if let Ok(c_name) = c_name(name) {
            unsafe { libc::sem_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformSemaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
    }
}

// ---------------------------------------------------------------------------
// PlatformEvent: named event emulated on a semaphore holding at most one unit
// ---------------------------------------------------------------------------

pub struct PlatformEvent {
    sem: PlatformSemaphore,
    manual_reset: bool,
}

impl PlatformEvent {
    pub fn create(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let sem = PlatformSemaphore::create(name, perms).map_err(|e| match e {
            Error::System { source, .. } => Error::system("failed to create an interprocess event", source),
            other => other,
        })?;
        Ok(Self { sem, manual_reset })
    }

    pub fn create_or_open(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let sem = PlatformSemaphore::create_or_open(name, perms)?;
        Ok(Self { sem, manual_reset })
    }

    /// The reset mode is not recorded in a POSIX semaphore; events opened by
    /// name behave as auto-reset.
    pub fn open(name: &str) -> Result<Self> {
        let sem = PlatformSemaphore::open(name).map_err(|e| match e {
            Error::System { source, .. } => Error::system("failed to open an interprocess event", source),
            other => other,
        })?;
        Ok(Self {
            sem,
            manual_reset: false,
        })
    }

    pub fn created(&self) -> bool {
        self.sem.created()
    }

    /// Signal the event. Draining one unit first keeps the count at one.
    pub fn set(&self) -> Result<()> {
        self.sem.try_wait()?;
        self.sem.post(1)
    }

    pub fn reset(&self) -> Result<()> {
        while self.sem.try_wait()? {}
        Ok(())
    }

    pub fn wait(&self) -> Result<()> {
        self.sem.wait()?;
        if self.manual_reset {
            self.sem.post(1)?;
        }
        Ok(())
    }

    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        let signaled = self.sem.wait_abortable(abort)?;
        if signaled && self.manual_reset {
            self.sem.post(1)?;
        }
        Ok(signaled)
    }

    pub fn unlink(name: &str) {
        PlatformSemaphore::unlink(name);
    }
}
