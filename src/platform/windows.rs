// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows implementation of the named-object capability: file-mapping
// shared memory, kernel events and kernel semaphores.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, FALSE, HANDLE, INVALID_HANDLE_VALUE, TRUE,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, CreateSemaphoreW, OpenEventW, OpenSemaphoreW, ReleaseSemaphore, ResetEvent,
    SetEvent, WaitForMultipleObjects, WaitForSingleObject, EVENT_MODIFY_STATE, INFINITE,
    SEMAPHORE_MODIFY_STATE, SYNCHRONIZATION_SYNCHRONIZE,
};

use crate::object_name;
use crate::{AbortHandle, Error, Permissions, Result};

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

unsafe fn acc_of<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(name: &str) -> Result<Vec<u16>> {
    let name = object_name::make_object_name(name)?;
    Ok(name.encode_utf16().chain(std::iter::once(0)).collect())
}

// ---------------------------------------------------------------------------
// OwnedHandle: closes on drop
// ---------------------------------------------------------------------------

pub(crate) struct OwnedHandle(HANDLE);

// Safety: kernel handles may be used from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { CloseHandle(self.0) };
        }
    }
}

pub(crate) fn create_abort_event() -> Result<OwnedHandle> {
    let h = unsafe { CreateEventW(ptr::null(), TRUE, FALSE, ptr::null()) };
    if h.is_null() {
        return Err(Error::last_os("failed to create an abort event"));
    }
    Ok(OwnedHandle(h))
}

pub(crate) fn set_event(h: HANDLE) -> Result<()> {
    if unsafe { SetEvent(h) } == 0 {
        return Err(Error::last_os("failed to set an interprocess event"));
    }
    Ok(())
}

pub(crate) fn reset_event(h: HANDLE) -> Result<()> {
    if unsafe { ResetEvent(h) } == 0 {
        return Err(Error::last_os("failed to reset an interprocess event"));
    }
    Ok(())
}

pub(crate) fn is_signaled(h: HANDLE) -> bool {
    unsafe { WaitForSingleObject(h, 0) == WAIT_OBJECT_0 }
}

fn wait_one(h: HANDLE) -> Result<()> {
    match unsafe { WaitForSingleObject(h, INFINITE) } {
        WAIT_OBJECT_0 => Ok(()),
        _ => Err(Error::last_os("failed to wait on an interprocess object")),
    }
}

/// Returns `Ok(false)` if `abort` was signaled first.
fn wait_one_abortable(h: HANDLE, abort: &AbortHandle) -> Result<bool> {
    let handles = [h, abort.raw()];
    match unsafe { WaitForMultipleObjects(2, handles.as_ptr(), FALSE, INFINITE) } {
        WAIT_OBJECT_0 => Ok(true),
        r if r == WAIT_OBJECT_0 + 1 => Ok(false),
        _ => Err(Error::last_os("failed to wait on an interprocess object")),
    }
}

// ---------------------------------------------------------------------------
// PlatformShm: shared memory via file mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

pub struct PlatformShm {
    handle: OwnedHandle,
    mem: *mut u8,
    size: usize,
    user_size: usize,
    prev_ref: i32,
    released: Option<bool>,
}

unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode, perms: &Permissions) -> Result<Self> {
        use windows_sys::Win32::System::Memory::{
            CreateFileMappingW, MapViewOfFile, OpenFileMappingW, FILE_MAP_ALL_ACCESS, PAGE_READWRITE,
            SEC_COMMIT,
        };

        let wide_name = to_wide(name)?;
        let total_size = calc_size(user_size);

        let handle = if mode == ShmMode::Open {
            let h = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, FALSE, wide_name.as_ptr()) };
            if h.is_null() {
                return Err(Error::last_os("failed to open a shared memory segment"));
            }
            OwnedHandle(h)
        } else {
            let h = unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    perms.native(),
                    PAGE_READWRITE | SEC_COMMIT,
                    0,
                    total_size as u32,
                    wide_name.as_ptr(),
                )
            };
            let err = unsafe { GetLastError() };
            if h.is_null() {
                return Err(Error::from_os("failed to create a shared memory segment", err as i32));
            }
            let h = OwnedHandle(h);
            if mode == ShmMode::Create && err == ERROR_ALREADY_EXISTS {
                return Err(Error::from_os("failed to create a shared memory segment", err as i32));
            }
            h
        };

        let view = unsafe { MapViewOfFile(handle.raw(), FILE_MAP_ALL_ACCESS, 0, 0, total_size) };
        if view.Value.is_null() {
            return Err(Error::last_os("failed to map a shared memory segment"));
        }
        let mem = view.Value as *mut u8;
        let prev = unsafe { acc_of(mem, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            handle,
            mem,
            size: total_size,
            user_size,
            prev_ref: prev,
            released: None,
        })
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
        unsafe { acc_of(self.mem, self.size).load(Ordering::Acquire) }
    }

    /// Give up this handle's reference. Returns `true` for the last one.
    pub fn release(&mut self) -> bool {
        if let Some(last) = self.released {
            return last;
        }
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        let last = prev <= 1;
        self.released = Some(last);
        last
    }

    pub fn unlink_by_name(_name: &str) {
        // Backed by the pagefile: the mapping disappears with its last handle.
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        use windows_sys::Win32::System::Memory::{UnmapViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS};

        self.release();
        unsafe {
            UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.mem as *mut c_void,
            })
        };
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphore: kernel semaphore
// ---------------------------------------------------------------------------

type NtQuerySemaphoreFn =
    unsafe extern "system" fn(HANDLE, u32, *mut c_void, u32, *mut u32) -> i32;

#[repr(C)]
struct SemaphoreBasicInformation {
    current_count: u32,
    maximum_count: u32,
}

/// `NtQuerySemaphore` from ntdll.dll, if the host exports it.
fn nt_query_semaphore() -> Option<NtQuerySemaphoreFn> {
    use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};

    static NTQS: OnceLock<Option<NtQuerySemaphoreFn>> = OnceLock::new();
    *NTQS.get_or_init(|| {
        let module: Vec<u16> = "ntdll.dll".encode_utf16().chain(std::iter::once(0)).collect();
        let ntdll = unsafe { GetModuleHandleW(module.as_ptr()) };
        if ntdll.is_null() {
            return None;
        }
        let proc = unsafe { GetProcAddress(ntdll, b"NtQuerySemaphore\0".as_ptr()) }?;
        Some(unsafe { std::mem::transmute::<_, NtQuerySemaphoreFn>(proc) })
    })
}

pub struct PlatformSemaphore {
    handle: OwnedHandle,
    created: bool,
}

impl PlatformSemaphore {
    fn create_raw(name: &str, perms: &Permissions) -> Result<(HANDLE, u32)> {
        let wide_name = to_wide(name)?;
        let h = unsafe { CreateSemaphoreW(perms.native(), 0, i32::MAX, wide_name.as_ptr()) };
        Ok((h, unsafe { GetLastError() }))
    }

    pub fn create(name: &str, perms: &Permissions) -> Result<Self> {
        let (h, err) = Self::create_raw(name, perms)?;
        if h.is_null() {
            return Err(Error::from_os("failed to create an interprocess semaphore", err as i32));
        }
        let handle = OwnedHandle(h);
        if err == ERROR_ALREADY_EXISTS {
            return Err(Error::from_os("failed to create an interprocess semaphore", err as i32));
        }
        Ok(Self { handle, created: true })
    }

    pub fn open(name: &str) -> Result<Self> {
        let wide_name = to_wide(name)?;
        let h = unsafe {
            OpenSemaphoreW(
                SYNCHRONIZATION_SYNCHRONIZE | SEMAPHORE_MODIFY_STATE,
                FALSE,
                wide_name.as_ptr(),
            )
        };
        if h.is_null() {
            return Err(Error::last_os("failed to open an interprocess semaphore"));
        }
        Ok(Self {
            handle: OwnedHandle(h),
            created: false,
        })
    }

    pub fn create_or_open(name: &str, perms: &Permissions) -> Result<Self> {
        let (h, err) = Self::create_raw(name, perms)?;
        if h.is_null() {
            if err == ERROR_ALREADY_EXISTS {
                return Self::open(name);
            }
            return Err(Error::from_os("failed to create an interprocess semaphore", err as i32));
        }
        Ok(Self {
            handle: OwnedHandle(h),
            created: err != ERROR_ALREADY_EXISTS,
        })
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn wait(&self) -> Result<()> {
        wait_one(self.handle.raw())
    }

    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        wait_one_abortable(self.handle.raw(), abort)
    }

    pub fn try_wait(&self) -> Result<bool> {
        match unsafe { WaitForSingleObject(self.handle.raw(), 0) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            _ => Err(Error::last_os("failed to poll an interprocess object")),
        }
    }

    pub fn post(&self, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let count = i32::try_from(count)
            .map_err(|_| Error::Limitation("semaphore release count out of range"))?;
        if unsafe { ReleaseSemaphore(self.handle.raw(), count, ptr::null_mut()) } == 0 {
            return Err(Error::last_os("failed to release an interprocess semaphore"));
        }
        Ok(())
    }

    pub fn query_count(&self) -> Result<Option<u32>> {
        let Some(ntqs) = nt_query_semaphore() else {
            return Ok(None);
        };
        let mut info = SemaphoreBasicInformation {
            current_count: 0,
            maximum_count: 0,
        };
        let status = unsafe {
            ntqs(
                self.handle.raw(),
                0, // SemaphoreBasicInformation
                &mut info as *mut _ as *mut c_void,
                std::mem::size_of::<SemaphoreBasicInformation>() as u32,
                ptr::null_mut(),
            )
        };
        if status != 0 {
            return Err(Error::from_os(
                "failed to test an interprocess semaphore for zero count",
                windows_sys::Win32::Foundation::ERROR_INVALID_HANDLE as i32,
            ));
        }
        Ok(Some(info.current_count))
    }

    pub fn unlink(_name: &str) {}
}

// ---------------------------------------------------------------------------
// PlatformEvent: kernel event
// ---------------------------------------------------------------------------

pub struct PlatformEvent {
    handle: OwnedHandle,
    created: bool,
}

impl PlatformEvent {
    fn create_raw(name: &str, manual_reset: bool, perms: &Permissions) -> Result<(HANDLE, u32)> {
        let wide_name = to_wide(name)?;
        let manual = if manual_reset { TRUE } else { FALSE };
        let h = unsafe { CreateEventW(perms.native(), manual, FALSE, wide_name.as_ptr()) };
        Ok((h, unsafe { GetLastError() }))
    }

    pub fn create(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let (h, err) = Self::create_raw(name, manual_reset, perms)?;
        if h.is_null() {
            return Err(Error::from_os("failed to create an interprocess event", err as i32));
        }
        let handle = OwnedHandle(h);
        if err == ERROR_ALREADY_EXISTS {
            return Err(Error::from_os("failed to create an interprocess event", err as i32));
        }
        Ok(Self { handle, created: true })
    }

    pub fn create_or_open(name: &str, manual_reset: bool, perms: &Permissions) -> Result<Self> {
        let (h, err) = Self::create_raw(name, manual_reset, perms)?;
        if h.is_null() {
            if err == ERROR_ALREADY_EXISTS {
                return Self::open(name);
            }
            return Err(Error::from_os("failed to create an interprocess event", err as i32));
        }
        Ok(Self {
            handle: OwnedHandle(h),
            created: err != ERROR_ALREADY_EXISTS,
        })
    }

    pub fn open(name: &str) -> Result<Self> {
        let wide_name = to_wide(name)?;
        let h = unsafe {
            OpenEventW(
                SYNCHRONIZATION_SYNCHRONIZE | EVENT_MODIFY_STATE,
                FALSE,
                wide_name.as_ptr(),
            )
        };
        if h.is_null() {
            return Err(Error::last_os("failed to open an interprocess event"));
        }
        Ok(Self {
            handle: OwnedHandle(h),
            created: false,
        })
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn set(&self) -> Result<()> {
        set_event(self.handle.raw())
    }

    pub fn reset(&self) -> Result<()> {
        reset_event(self.handle.raw())
    }

    pub fn wait(&self) -> Result<()> {
        wait_one(self.handle.raw())
    }

    pub fn wait_abortable(&self, abort: &AbortHandle) -> Result<bool> {
        wait_one_abortable(self.handle.raw(), abort)
    }

    pub fn unlink(_name: &str) {}
}
