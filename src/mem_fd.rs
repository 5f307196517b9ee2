/*
 * A named POSIX shared memory object mapped into this process.
 * The writer creates (and later unlinks) the object, readers only open and
 * map it read only.
 */
use crate::error::Error;
use log::{info, warn};
use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::IntoRawFd;
use std::os::fd::OwnedFd;
use std::sync::atomic::AtomicU32;

#[derive(Debug)]
pub struct MemFd {
    name: String,
    // None once teardown closed it
    file_fd: Option<OwnedFd>,
    addr: *mut u8,
    n_bytes: usize,
    // only the creator unlinks the name
    owner: bool,
}

// The mapping is plain shared memory, all synchronization between threads is
// done by the callers (region locks, atomics in the header).
unsafe impl Send for MemFd {}
unsafe impl Sync for MemFd {}

/// Turns a user supplied name into a valid shm name, "capture" -> "/capture".
pub fn shm_name(name: &str) -> Result<String, Error> {
    let trimmed = name.strip_prefix('/').unwrap_or(name);
    // leave room for the semaphore suffix, NAME_MAX is 255 including the slash
    if trimmed.is_empty()
        || trimmed.len() > 250
        || trimmed.contains('/')
        || trimmed.contains('\0')
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    return Ok(format!("/{}", trimmed));
}

fn c_name(name: &str) -> Result<CString, Error> {
    return CString::new(name).map_err(|_| Error::InvalidName(name.to_string()));
}

/// Best effort removal of a stale object left behind by a previous run.
pub fn unlink_stale(name: &str) {
    if let Ok(c_str) = c_name(name) {
        if unsafe { libc::shm_unlink(c_str.as_ptr()) } == 0 {
            info!("Removed stale shared memory {}", name);
        }
    }
}

impl MemFd {
    pub fn read_u32_at(&self, start: usize) -> u32 {
        let mut data = [0u8; 4];
        self.read_into(start, &mut data);
        return u32::from_ne_bytes(data);
    }

    /// Copies `out.len()` bytes starting at `start` out of the mapping.
    pub fn read_into(&self, start: usize, out: &mut [u8]) {
        assert!(start + out.len() <= self.n_bytes);
        unsafe {
            std::ptr::copy_nonoverlapping(self.addr.add(start), out.as_mut_ptr(), out.len());
        }
    }

    /// Returns a mutable view of `[start, start + len)`.
    ///
    /// # Safety
    /// The caller must be the only one writing this range for the lifetime of
    /// the returned slice and the mapping must be writable.
    pub unsafe fn slice_mut_at(&self, start: usize, len: usize) -> &mut [u8] {
        assert!(self.owner, "read only mapping");
        assert!(start + len <= self.n_bytes);
        return std::slice::from_raw_parts_mut(self.addr.add(start), len);
    }

    /// Header field shared with other processes, must be 4 byte aligned.
    pub fn atomic_u32_at(&self, start: usize) -> &AtomicU32 {
        assert!(start + 4 <= self.n_bytes);
        assert!(start % std::mem::align_of::<AtomicU32>() == 0);
        // mmap returns page aligned memory so an aligned offset is aligned
        return unsafe { &*(self.addr.add(start) as *const AtomicU32) };
    }

    pub fn zero(&self, start: usize, len: usize) {
        assert!(self.owner, "read only mapping");
        assert!(start + len <= self.n_bytes);
        unsafe {
            std::ptr::write_bytes(self.addr.add(start), 0, len);
        }
    }

    /// Creates `name` exclusively, resizes it to `n_bytes` and maps it
    /// read/write.
    pub fn create(name: &str, n_bytes: usize) -> Result<MemFd, Error> {
        let c_str = c_name(name)?;
        unsafe {
            let raw_file_fd = libc::shm_open(
                c_str.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                libc::S_IRUSR | libc::S_IWUSR,
            );
            if raw_file_fd < 0 {
                return Err(Error::Create {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }
            // from here on Drop cleans up, including the unlink
            let mut mem_fd = MemFd {
                name: name.to_string(),
                file_fd: Some(OwnedFd::from_raw_fd(raw_file_fd)),
                addr: std::ptr::null_mut(),
                n_bytes: 0,
                owner: true,
            };

            if libc::ftruncate(raw_file_fd, n_bytes as libc::off_t) < 0 {
                return Err(Error::Truncate {
                    name: name.to_string(),
                    n_bytes: n_bytes,
                    source: std::io::Error::last_os_error(),
                });
            }

            let hint: *mut libc::c_void = std::ptr::null_mut();
            let addr = libc::mmap(
                hint,
                n_bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                raw_file_fd,
                0,
            );
            if addr == libc::MAP_FAILED {
                return Err(Error::Map {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }

            mem_fd.addr = addr as *mut u8;
            mem_fd.n_bytes = n_bytes;
            return Ok(mem_fd);
        }
    }

    /// Opens an existing object and maps the whole of it read only.
    pub fn open_read_only(name: &str) -> Result<MemFd, Error> {
        let c_str = c_name(name)?;
        unsafe {
            let raw_file_fd = libc::shm_open(c_str.as_ptr(), libc::O_RDONLY, 0);
            if raw_file_fd < 0 {
                return Err(Error::Open {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }
            let file_fd = OwnedFd::from_raw_fd(raw_file_fd);

            // seek to end, find length
            let n_bytes = libc::lseek(file_fd.as_raw_fd(), 0, libc::SEEK_END);
            if n_bytes <= 0 {
                return Err(Error::Open {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }

            let hint: *mut libc::c_void = std::ptr::null_mut();
            let addr = libc::mmap(
                hint,
                n_bytes as usize,
                libc::PROT_READ,
                libc::MAP_SHARED,
                file_fd.as_raw_fd(),
                0,
            );
            if addr == libc::MAP_FAILED {
                return Err(Error::Map {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }

            return Ok(MemFd {
                name: name.to_string(),
                file_fd: Some(file_fd),
                addr: addr as *mut u8,
                n_bytes: n_bytes as usize,
                owner: false,
            });
        }
    }

    pub fn name(&self) -> &str {
        return &self.name;
    }

    pub fn len(&self) -> usize {
        return self.n_bytes;
    }
}

impl Drop for MemFd {
    /// Unmap, close, then unlink. A failing step is logged and the remaining
    /// ones still run so the name is released for the next start.
    fn drop(&mut self) {
        if !self.addr.is_null() {
            let ret = unsafe { libc::munmap(self.addr as *mut libc::c_void, self.n_bytes) };
            if ret == -1 {
                warn!(
                    "Failed to unmap shared memory {}: {}",
                    self.name,
                    std::io::Error::last_os_error()
                );
            }
            self.addr = std::ptr::null_mut();
        }

        if let Some(file_fd) = self.file_fd.take() {
            if unsafe { libc::close(file_fd.into_raw_fd()) } == -1 {
                warn!(
                    "Failed to close shared memory descriptor of {}: {}",
                    self.name,
                    std::io::Error::last_os_error()
                );
            }
        }

        if self.owner {
            match c_name(&self.name) {
                Ok(c_str) => {
                    if unsafe { libc::shm_unlink(c_str.as_ptr()) } == -1 {
                        warn!(
                            "Failed to delete shared memory {}: {}",
                            self.name,
                            std::io::Error::last_os_error()
                        );
                    }
                }
                Err(err) => warn!("Failed to delete shared memory: {}", err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::unique_name;

    #[test]
    fn names() {
        assert_eq!(shm_name("capture").expect("Should be valid"), "/capture");
        assert_eq!(shm_name("/capture").expect("Should be valid"), "/capture");
        shm_name("").expect_err("Empty");
        shm_name("/").expect_err("Only a slash");
        shm_name("a/b").expect_err("Interior slash");
        shm_name("a\0b").expect_err("Interior nul");
        shm_name(&"x".repeat(251)).expect_err("Too long");
    }

    #[test]
    fn create_write_and_reopen() {
        let name = unique_name("memfd");
        let writer = MemFd::create(&name, 4096).expect("Should create");
        assert_eq!(writer.len(), 4096);

        // fresh objects are zero filled
        assert_eq!(writer.read_u32_at(4092), 0);

        unsafe {
            writer
                .slice_mut_at(100, 4)
                .copy_from_slice(&0xdeadbeef_u32.to_ne_bytes());
        }
        writer
            .atomic_u32_at(8)
            .store(17, std::sync::atomic::Ordering::Release);

        let reader = MemFd::open_read_only(&name).expect("Should open");
        assert_eq!(reader.len(), 4096);
        assert_eq!(reader.read_u32_at(100), 0xdeadbeef);
        assert_eq!(reader.read_u32_at(8), 17);

        // exclusive create fails while the name is held
        MemFd::create(&name, 4096).expect_err("Name is taken");

        drop(reader);
        drop(writer);

        // owner drop unlinks
        MemFd::open_read_only(&name).expect_err("Should be unlinked");
    }

    #[test]
    fn stale_unlink_frees_name() {
        let name = unique_name("stale");
        let first = MemFd::create(&name, 4096).expect("Should create");
        unlink_stale(&name);
        let second = MemFd::create(&name, 8192).expect("Name was released");
        assert_eq!(second.len(), 8192);
        drop(second);
        // the name is already gone, first only logs its failed unlink
        drop(first);
        MemFd::open_read_only(&name).expect_err("Should be unlinked");
    }
}
