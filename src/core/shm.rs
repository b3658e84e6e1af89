use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::FromRawFd;
use std::sync::atomic::AtomicU8;

use memmap2::{MmapMut, MmapOptions};

use crate::core::naming::validate_segment_name;
use crate::core::{Error, Result};

/// A mapped POSIX shared-memory object.
///
/// Dropping the handle unmaps and closes it; the object itself lives on until
/// [`ShmSegment::unlink`] is called by whoever created it.
pub struct ShmSegment {
    name: String,
    _file: File,
    _map: MmapMut,
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the mapping is owned by the handle and all access through `ptr` goes
// through raw copies or atomics, never through long-lived references.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

impl ShmSegment {
    /// Creates a new object of `len` bytes. Returns `None` if the name is taken.
    pub fn create_exclusive(name: &str, len: usize) -> Result<Option<Self>> {
        if len == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "shared memory length must be non-zero",
            )));
        }
        let c_name = os_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string; flags are POSIX constants.
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            )
        };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Ok(None);
            }
            return Err(Error::Io(err));
        }
        // SAFETY: fd was just returned by shm_open and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };
        let mapped = file
            .set_len(len as u64)
            .map_err(Error::from)
            .and_then(|_| Self::map(name, file, len));
        match mapped {
            Ok(segment) => Ok(Some(segment)),
            Err(err) => {
                let _ = Self::unlink(name);
                Err(err)
            }
        }
    }

    /// Attaches to an existing object. Returns `None` if it does not exist.
    pub fn open(name: &str) -> Result<Option<Self>> {
        let c_name = os_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(None);
            }
            return Err(Error::Io(err));
        }
        // SAFETY: fd was just returned by shm_open and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("shared memory {name} has zero length"),
            )));
        }
        Self::map(name, file, len).map(Some)
    }

    /// Checks for existence without keeping a mapping.
    pub fn exists(name: &str) -> Result<bool> {
        let c_name = os_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(false);
            }
            return Err(Error::Io(err));
        }
        // SAFETY: fd is a valid descriptor we own.
        unsafe { libc::close(fd) };
        Ok(true)
    }

    /// Removes the name from the system. Returns `false` if it was already gone.
    pub fn unlink(name: &str) -> Result<bool> {
        let c_name = os_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        let res = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if res == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(false);
        }
        Err(Error::Io(err))
    }

    fn map(name: &str, file: File, len: usize) -> Result<Self> {
        // SAFETY: the object has been sized to `len` bytes and stays open for
        // the lifetime of the mapping.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let ptr = map.as_mut_ptr();
        Ok(Self {
            name: name.to_string(),
            _file: file,
            _map: map,
            ptr,
            len,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Views the first byte as an atomic shared with every other mapping.
    pub fn atomic_u8(&self) -> &AtomicU8 {
        // SAFETY: len >= 1 is enforced on create and open; AtomicU8 has the
        // alignment and size of u8.
        unsafe { &*(self.ptr as *const AtomicU8) }
    }

    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        // SAFETY: range checked above; source is a private buffer so the
        // regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
        Ok(())
    }

    pub fn fill_from(&self, offset: usize, byte: u8) -> Result<()> {
        let count = self.len.saturating_sub(offset);
        self.check_range(offset, count)?;
        // SAFETY: range checked above.
        unsafe { std::ptr::write_bytes(self.ptr.add(offset), byte, count) };
        Ok(())
    }

    /// Copies the whole segment out into a private buffer.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len];
        // SAFETY: buf has exactly `len` bytes and is private to this call.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr, buf.as_mut_ptr(), self.len) };
        buf
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset.checked_add(len).ok_or(Error::SizeExceeded {
            len: usize::MAX,
            capacity: self.len,
        })?;
        if end > self.len {
            return Err(Error::SizeExceeded {
                len: end,
                capacity: self.len,
            });
        }
        Ok(())
    }
}

fn os_name(name: &str) -> Result<CString> {
    validate_segment_name(name)?;
    CString::new(format!("/{name}")).map_err(|_| Error::InvalidName {
        name: name.to_string(),
        reason: "contains NUL byte",
    })
}
