/*
 * Named POSIX semaphore with a count of one, used as a cross process mutex
 * in SyncMode::Semaphore. Acquisition hands out a guard that posts the
 * semaphore again when it goes out of scope, on every path.
 */
use crate::constants::SEMAPHORE_SUFFIX;
use crate::error::Error;
use log::{info, warn};
use std::ffi::CString;

#[derive(Debug)]
pub struct NamedSemaphore {
    name: String,
    sem: *mut libc::sem_t,
    // only the creator unlinks the name
    owner: bool,
}

// sem_wait/sem_post are thread safe, the handle itself is never mutated
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

/// Semaphore name derived from the segment name, "/capture" -> "/capture_sem".
pub fn semaphore_name(segment_name: &str) -> String {
    return format!("{}{}", segment_name, SEMAPHORE_SUFFIX);
}

fn c_name(name: &str) -> Result<CString, Error> {
    return CString::new(name).map_err(|_| Error::InvalidName(name.to_string()));
}

impl NamedSemaphore {
    /// Removes any stale semaphore under `name` and creates a fresh one with a
    /// count of one.
    pub fn create(name: &str) -> Result<NamedSemaphore, Error> {
        let c_str = c_name(name)?;
        unsafe {
            if libc::sem_unlink(c_str.as_ptr()) == 0 {
                info!("Removed stale semaphore {}", name);
            }

            let mode = (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint;
            let initial: libc::c_uint = 1;
            let sem = libc::sem_open(
                c_str.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                mode,
                initial,
            );
            if sem == libc::SEM_FAILED {
                return Err(Error::Semaphore {
                    name: name.to_string(),
                    source: std::io::Error::last_os_error(),
                });
            }
            return Ok(NamedSemaphore {
                name: name.to_string(),
                sem: sem,
                owner: true,
            });
        }
    }

    /// Opens a semaphore created by another process.
    pub fn open(name: &str) -> Result<NamedSemaphore, Error> {
        let c_str = c_name(name)?;
        let sem = unsafe { libc::sem_open(c_str.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(Error::Semaphore {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        return Ok(NamedSemaphore {
            name: name.to_string(),
            sem: sem,
            owner: false,
        });
    }

    pub fn name(&self) -> &str {
        return &self.name;
    }

    /// Blocks until the semaphore is available.
    pub fn acquire(&self) -> Result<SemaphoreGuard<'_>, Error> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(SemaphoreGuard { semaphore: self });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Acquire {
                name: self.name.clone(),
                source: err,
            });
        }
    }

    fn release(&self) {
        if unsafe { libc::sem_post(self.sem) } == -1 {
            warn!(
                "Failed to release semaphore {}: {}",
                self.name,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(test)]
    fn value(&self) -> i32 {
        let mut value: libc::c_int = -1;
        let ret = unsafe { libc::sem_getvalue(self.sem, &mut value) };
        assert_eq!(ret, 0, "sem_getvalue: {}", std::io::Error::last_os_error());
        return value;
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        if unsafe { libc::sem_close(self.sem) } == -1 {
            warn!(
                "Failed to close semaphore {}: {}",
                self.name,
                std::io::Error::last_os_error()
            );
        }

        if self.owner {
            match c_name(&self.name) {
                Ok(c_str) => {
                    if unsafe { libc::sem_unlink(c_str.as_ptr()) } == -1 {
                        warn!(
                            "Failed to delete semaphore {}: {}",
                            self.name,
                            std::io::Error::last_os_error()
                        );
                    }
                }
                Err(err) => warn!("Failed to delete semaphore: {}", err),
            }
        }
    }
}

/// Holds the semaphore until dropped.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a NamedSemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
