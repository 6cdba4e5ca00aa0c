//! Executable memory for generated code.
//!
//! An [`ExecutableRegion`] is an anonymous, process-private mapping with
//! read, write and execute permission, sized exactly to the code it will
//! hold. The mapping is released when the region is dropped.

use std::ptr::NonNull;

use tracing::{trace, warn};

use crate::error::{Error, Result};

/// An anonymous RWX mapping owned by one execution.
///
/// Not `Send` or `Sync`: it is used on the thread that mapped it.
pub struct ExecutableRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl ExecutableRegion {
    /// Map `len` bytes of zeroed RWX memory.
    ///
    /// A zero-length request is rejected before any syscall; there would be
    /// nothing to jump to.
    pub fn map(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::MemoryMap("refusing to map an empty code buffer".into()));
        }
        let ptr = sys::map_rwx(len)?;
        trace!(len, addr = ?ptr, "mapped executable region");
        Ok(ExecutableRegion { ptr, len })
    }

    /// Map a region and copy `code` into it, byte for byte.
    pub fn with_code(code: &[u8]) -> Result<Self> {
        let mut region = Self::map(code.len())?;
        region.write(code)?;
        Ok(region)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address: the entry point of the code.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Copy `code` to the start of the region. Its length must match.
    pub fn write(&mut self, code: &[u8]) -> Result<()> {
        if code.len() != self.len {
            return Err(Error::MemoryMap(format!(
                "code is {} bytes but the region is {}",
                code.len(),
                self.len
            )));
        }
        self.as_mut_slice().copy_from_slice(code);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of `len` readable bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        if let Err(e) = sys::unmap(self.ptr, self.len) {
            warn!(len = self.len, error = %e, "failed to unmap executable region");
        }
    }
}

impl std::fmt::Debug for ExecutableRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::ptr::{self, NonNull};

    use crate::error::{Error, Result};

    pub(super) fn map_rwx(len: usize) -> Result<NonNull<u8>> {
        // SAFETY: anonymous private mapping at a kernel-chosen address; no
        // existing memory is affected.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::MemoryMap(io::Error::last_os_error().to_string()));
        }
        NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| Error::MemoryMap("mmap returned a null address".into()))
    }

    pub(super) fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        // SAFETY: `ptr`/`len` describe a mapping created by `map_rwx` that
        // nothing references any more.
        let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;
    use std::ptr::NonNull;

    use crate::error::{Error, Result};

    pub(super) fn map_rwx(_len: usize) -> Result<NonNull<u8>> {
        Err(Error::MemoryMap(
            "executable mappings are only implemented for unix targets".into(),
        ))
    }

    pub(super) fn unmap(_ptr: NonNull<u8>, _len: usize) -> io::Result<()> {
        Ok(())
    }
}
