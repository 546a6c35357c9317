//! Thin wrappers over the libc file and mapping calls.
//!
//! Every wrapper reports failure as `std::io::Error::last_os_error()`,
//! so callers can fold errno into their partial-return accounting.

use std::ffi::CString;
use std::io::{Error, ErrorKind, Result};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

pub(crate) fn wrap_libc_call<T: PartialEq>(f: impl FnOnce() -> T, failure: T) -> Result<T> {
    let ret = f();
    if ret == failure {
        Err(Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cpath(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::from(ErrorKind::InvalidInput))
}

pub(crate) fn open(path: &Path, flags: i32, mode: libc::mode_t) -> Result<i32> {
    let path = cpath(path)?;
    wrap_libc_call(
        || unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint) },
        -1,
    )
}

pub(crate) fn close(fd: i32) -> Result<()> {
    wrap_libc_call(|| unsafe { libc::close(fd) }, -1).map(|_| ())
}

pub(crate) fn unlink(path: &Path) -> Result<()> {
    let path = cpath(path)?;
    wrap_libc_call(|| unsafe { libc::unlink(path.as_ptr()) }, -1).map(|_| ())
}

pub(crate) fn file_size(fd: i32) -> Result<usize> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    wrap_libc_call(|| unsafe { libc::fstat(fd, stat.as_mut_ptr()) }, -1)?;
    Ok(unsafe { stat.assume_init() }.st_size as usize)
}

pub(crate) fn truncate(fd: i32, len: usize) -> Result<()> {
    wrap_libc_call(|| unsafe { libc::ftruncate(fd, len as libc::off_t) }, -1).map(|_| ())
}

pub(crate) fn map(fd: i32, offset: usize, len: usize, writable: bool) -> Result<NonNull<u8>> {
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            prot,
            libc::MAP_SHARED,
            fd,
            offset as libc::off_t,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8).ok_or_else(Error::last_os_error)
}

/// # Safety
///
/// `[base, base + len)` must be exactly one live mapping established by
/// [`map`], with no remaining references into it.
pub(crate) unsafe fn unmap(base: NonNull<u8>, len: usize) -> Result<()> {
    wrap_libc_call(
        || libc::munmap(base.as_ptr() as *mut libc::c_void, len),
        -1,
    )
    .map(|_| ())
}

pub(crate) fn write(fd: i32, data: &[u8]) -> Result<usize> {
    let n = wrap_libc_call(
        || unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) },
        -1,
    )?;
    Ok(n as usize)
}

pub(crate) fn write_gather(fd: i32, ranges: &[libc::iovec]) -> Result<usize> {
    let n = wrap_libc_call(
        || unsafe { libc::writev(fd, ranges.as_ptr(), ranges.len() as libc::c_int) },
        -1,
    )?;
    Ok(n as usize)
}
