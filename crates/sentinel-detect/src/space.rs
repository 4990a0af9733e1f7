//! Filesystem capacity for an arbitrary path

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Total and available bytes of the filesystem holding `path`
///
/// # Errors
///
/// Returns the OS error if `statvfs` fails.
#[allow(clippy::unnecessary_cast, clippy::useless_conversion)]
pub(crate) fn space_of(path: &Path) -> io::Result<(u64, u64)> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // SAFETY: statvfs is a plain C struct for which all-zero bytes is a valid value.
    #[allow(unsafe_code)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };

    // SAFETY: c_path is a valid NUL-terminated string and stat is a valid,
    // properly aligned out-parameter that lives for the duration of the call.
    #[allow(unsafe_code)]
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    let fragment = stat.f_frsize as u64;
    let total = (stat.f_blocks as u64).saturating_mul(fragment);
    let available = (stat.f_bavail as u64).saturating_mul(fragment);
    Ok((total, available))
}
