//! # Platform Hosts
//!
//! Host collaborators backed by a real operating system.
//!
//! - **Linux**: procfs (`/proc/<pid>/mem`)
//!   - See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)
//!
//! Other platforms only get the in-memory host in [`crate::host::memory`].

#[cfg(target_os = "linux")]
pub mod linux;
