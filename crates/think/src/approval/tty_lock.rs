//! Inter-process prompt serialization.
//!
//! Concurrent interpreter invocations sharing a terminal must never
//! interleave approval prompts. Before prompting, each process takes an
//! exclusive advisory lock on `<locks_dir>/prompt-<tty-id>.lock`, where the
//! tty id is derived from stderr's device number. Different terminals get
//! different lock files and proceed independently.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// An exclusive per-terminal prompt lock, released on drop.
#[derive(Debug)]
pub struct PromptLock {
    file: File,
}

impl PromptLock {
    /// Block until this process holds the prompt lock for the current
    /// terminal.
    pub fn acquire(locks_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(locks_dir)?;

        let path = locks_dir.join(format!("prompt-{}.lock", tty_id()));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Self { file })
    }
}

impl Drop for PromptLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// A stable identifier for the controlling terminal, from stderr's device
/// number.
fn tty_id() -> String {
    #[cfg(unix)]
    {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(libc::STDERR_FILENO, &mut stat) } == 0 {
            return stat.st_rdev.to_string();
        }
    }
    "default".to_string()
}
