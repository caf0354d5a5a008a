//! Error reporting across the C boundary
//!
//! A failing call stores its message in a thread-local slot and returns a
//! null pointer or `-1`. The slot keeps the message until the next failure on
//! the same thread.

use std::cell::RefCell;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum FfiError {
    #[error("null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid permission code {0}")]
    InvalidPermission(u8),

    #[error(transparent)]
    Core(#[from] lofi_core::Error),

    #[error("panic: {0}")]
    Panic(String),
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn set_last_error(err: &FfiError) {
    warn!(error = %err, "FFI call failed");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
}

pub(crate) fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, recording any error or panic and returning `fallback` instead
pub(crate) fn guard<T>(fallback: T, f: impl FnOnce() -> Result<T, FfiError>) -> T {
    let result = catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(FfiError::Panic(panic_message(payload))));
    match result {
        Ok(value) => value,
        Err(err) => {
            set_last_error(&err);
            fallback
        }
    }
}

/// Length in bytes of the pending error message including its NUL
/// terminator, or 0 if there is none
#[no_mangle]
pub extern "C" fn last_error_length() -> c_int {
    last_error().map_or(0, |msg| msg.len() as c_int + 1)
}

/// Copy the pending error message into `buf` as a NUL-terminated string.
///
/// Returns the number of bytes written excluding the terminator, 0 if there
/// is no error, or -1 if `buf` is null or too small.
#[no_mangle]
pub extern "C" fn error_message_utf8(buf: *mut c_char, length: c_int) -> c_int {
    let Some(msg) = last_error() else {
        return 0;
    };
    if buf.is_null() || length <= 0 || msg.len() >= length as usize {
        return -1;
    }
    // SAFETY: the caller provides `length` writable bytes at `buf`.
    let out = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, length as usize) };
    out[..msg.len()].copy_from_slice(msg.as_bytes());
    out[msg.len()] = 0;
    msg.len() as c_int
}
