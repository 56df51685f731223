//! # Unix Platform Implementation
//!
//! POSIX implementation for Linux and macOS, used for Linux and macOS hosts.
//!
//! ## Unix APIs Used
//!
//! - `sysconf(_SC_PAGESIZE)` / `sysconf(_SC_NPROCESSORS_ONLN)` via `libc`
//! - `geteuid()` via `libc` for privilege checking
//! - `/proc/<pid>/status` (`VmRSS`) for process RSS sampling, with a
//!   `sysinfo`-based fallback on platforms without a `/proc` filesystem
//!   (macOS)
//! - File APIs via tokio (cross-platform)

use super::{Platform, PlatformError};
use async_trait::async_trait;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Unix platform implementation (Linux, macOS)
pub struct UnixPlatform;

impl UnixPlatform {
    /// Create a new Unix platform instance
    pub fn new() -> Self {
        Self
    }

    fn total_memory_impl() -> Result<u64, PlatformError> {
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

        if pages < 0 || page_size < 0 {
            return Err(PlatformError::Other("sysconf query failed".to_string()));
        }

        Ok((pages as u64) * (page_size as u64))
    }

    fn available_memory_impl() -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            let contents = fs::read_to_string("/proc/meminfo").map_err(PlatformError::Io)?;

            for line in contents.lines() {
                if let Some(rest) = line.strip_prefix("MemAvailable:") {
                    return parse_kib_field(rest).ok_or_else(|| {
                        PlatformError::Other("malformed /proc/meminfo MemAvailable".to_string())
                    });
                }
            }

            Err(PlatformError::Other("MemAvailable not found in /proc/meminfo".to_string()))
        }

        #[cfg(not(target_os = "linux"))]
        {
            // macOS has no /proc; fall back to sysconf's free-page count, which
            // under-reports reclaimable cache but is the best POSIX-portable figure.
            let pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

            if pages < 0 || page_size < 0 {
                return Err(PlatformError::Other("sysconf query failed".to_string()));
            }

            Ok((pages as u64) * (page_size as u64))
        }
    }
}

#[cfg(target_os = "linux")]
fn parse_kib_field(rest: &str) -> Option<u64> {
    // "   12345 kB"
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(|kib| kib * 1024)
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for UnixPlatform {
    fn page_size(&self) -> usize {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }

    fn cpu_count(&self) -> usize {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            count as usize
        } else {
            1
        }
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        Self::total_memory_impl()
    }

    fn available_memory(&self) -> Result<u64, PlatformError> {
        Self::available_memory_impl()
    }

    fn line_separator(&self) -> &'static str {
        "\n"
    }

    fn path_separator(&self) -> char {
        ':'
    }

    fn platform_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "macos"
        }
        #[cfg(not(target_os = "macos"))]
        {
            "linux"
        }
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), PlatformError> {
        let permissions = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, permissions).map_err(PlatformError::Io)
    }

    fn is_executable(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) => meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }

    async fn sync_file(&self, file: &tokio::fs::File) -> Result<(), PlatformError> {
        file.sync_all().await?;
        Ok(())
    }

    fn process_rss(&self, pid: u32) -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            let path = format!("/proc/{pid}/status");
            let contents = fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PlatformError::NotSupported(format!("process {pid} has no /proc entry"))
                } else {
                    PlatformError::Io(e)
                }
            })?;

            for line in contents.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    return parse_kib_field(rest).ok_or_else(|| {
                        PlatformError::Other(format!("malformed VmRSS line for pid {pid}"))
                    });
                }
            }

            Err(PlatformError::Other(format!("VmRSS not present for pid {pid}")))
        }

        #[cfg(not(target_os = "linux"))]
        {
            use sysinfo::{Pid, System};

            let mut sys = System::new();
            sys.refresh_process(Pid::from_u32(pid));
            sys.process(Pid::from_u32(pid))
                .map(|p| p.memory())
                .ok_or_else(|| PlatformError::NotSupported(format!("no such process: {pid}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_platform_basics() {
        let platform = UnixPlatform::new();

        assert!(platform.cpu_count() >= 1);

        let page_size = platform.page_size();
        assert!(page_size >= 512);
        assert!(page_size <= 65536);
    }

    #[test]
    fn test_unix_platform_constants() {
        let platform = UnixPlatform::new();

        assert_eq!(platform.line_separator(), "\n");
        assert_eq!(platform.path_separator(), ':');
        assert!(!platform.platform_name().is_empty());
    }

    #[test]
    fn test_is_executable() {
        let platform = UnixPlatform::new();

        assert!(platform.is_executable(Path::new("/bin/sh")));
        assert!(!platform.is_executable(Path::new("/does/not/exist")));
    }

    #[test]
    fn test_process_rss_for_self() {
        let platform = UnixPlatform::new();
        let pid = std::process::id();

        let rss = platform.process_rss(pid).expect("current process must report RSS");
        assert!(rss > 0);
    }

    #[test]
    fn test_process_rss_unknown_pid() {
        let platform = UnixPlatform::new();
        // PID 0 is never a real user process on Linux/macOS.
        assert!(platform.process_rss(0).is_err());
    }

    #[test]
    fn test_total_memory_is_positive() {
        let platform = UnixPlatform::new();
        assert!(platform.total_memory().unwrap() > 0);
    }
}
