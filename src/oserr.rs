//! OS error string formatting via `strerror_r`, used when an `IoError`
//! needs a human-readable cause attached.

use core::ffi;

fn errno() -> i32 {
    // SAFETY: __errno_location always returns a valid pointer for the
    // calling thread.
    unsafe { *libc::__errno_location() }
}

pub fn last_os_error_str() -> String {
    let mut buf: [u8; 512] = [0; 512];

    // SAFETY: buf is a valid, zero-initialized buffer of the given length;
    // the POSIX form writes the message into it on success.
    let rc = unsafe { libc::strerror_r(errno(), buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "<strerror_r returned an error>".to_owned();
    }
    let cstr = unsafe { ffi::CStr::from_ptr(buf.as_ptr().cast()) };
    cstr.to_str()
        .unwrap_or("<error message contained invalid utf8>")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_non_empty_message() {
        assert!(!last_os_error_str().is_empty());
    }
}
