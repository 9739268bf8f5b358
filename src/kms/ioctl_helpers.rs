//! Safe wrappers for DRM ioctl system calls
//!
//! Mode-setting ioctls may be interrupted by signals or return EAGAIN while
//! the driver is busy; both are retried, as libdrm does.

use log::trace;
use std::io;
use std::os::unix::io::RawFd;

/// Execute an ioctl command with a mutable argument, retrying on EINTR/EAGAIN.
///
/// The kernel error is returned unchanged so its errno stays available.
///
/// # Arguments
/// * `fd` - DRM device file descriptor
/// * `cmd` - ioctl request code
/// * `arg` - Mutable reference to the request struct
/// * `cmd_name` - Human-readable name for logging
pub fn ioctl_with_mut_arg<T>(
    fd: RawFd,
    cmd: libc::c_ulong,
    arg: &mut T,
    cmd_name: &str,
) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::ioctl(fd, cmd, arg as *mut T) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => {
                trace!("{} failed on fd {}: {}", cmd_name, fd, err);
                return Err(err);
            }
        }
    }
}
