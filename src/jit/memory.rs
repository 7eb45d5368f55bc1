//! Page-aligned executable memory with a strict RW -> RX lifecycle.
//!
//! The region is mapped read/write, filled, and only then flipped to
//! read/execute; it is never writable and executable at the same time.
//! x86-64 keeps instruction and data caches coherent, so no explicit
//! flush is needed after the protection change. The mapping is released
//! unconditionally on drop.

use std::io;
use std::ptr;

/// Anonymous private mapping that ends its life read+execute.
#[derive(Debug)]
pub struct ExecutableMemory {
    ptr: *mut u8,
    len: usize,
    executable: bool,
}

impl ExecutableMemory {
    /// Maps at least `len` bytes (rounded up to whole pages) read/write.
    pub fn new(len: usize) -> io::Result<Self> {
        let page_size = page_size()?;
        let len = len
            .max(1)
            .checked_next_multiple_of(page_size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "mapping too large"))?;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            len,
            executable: false,
        })
    }

    /// Copies `bytes` into the region at `offset`. Fails once the region
    /// has been sealed executable or when the write would run past the end.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        if self.executable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "region is already executable",
            ));
        }
        let in_bounds = offset
            .checked_add(bytes.len())
            .is_some_and(|end| end <= self.len);
        if !in_bounds {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "write out of bounds"));
        }
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Transitions the whole region from read/write to read/execute.
    pub fn make_executable(&mut self) -> io::Result<()> {
        let rc = unsafe { libc::mprotect(self.ptr as *mut _, self.len, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        self.executable = true;
        Ok(())
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut _, self.len);
        }
    }
}

fn page_size() -> io::Result<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size as usize)
}
