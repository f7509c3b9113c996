//! C-FFI layer for sqlprint — used by Go (cgo) and other FFI consumers.
//!
//! ZERO logic here. All calls delegate to `sqlprint-core`.
//!
//! # Memory Contract
//!
//! All functions that return `*mut c_char` allocate via `CString`.
//! The caller MUST free the returned string by calling `sqlprint_free_string()`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Result from a sqlprint FFI call.
/// If `error` is null, the call succeeded and `result` contains the output.
/// If `error` is non-null, the call failed and `error` contains the error message.
/// The caller MUST free both `result` and `error` with `sqlprint_free_string()`.
#[repr(C)]
pub struct SqlprintResult {
    pub result: *mut c_char,
    pub error: *mut c_char,
}

impl SqlprintResult {
    fn ok(value: String) -> Self {
        SqlprintResult {
            result: into_c_string(value),
            error: std::ptr::null_mut(),
        }
    }

    fn err(msg: String) -> Self {
        SqlprintResult {
            result: std::ptr::null_mut(),
            error: into_c_string(msg),
        }
    }
}

/// Interior NULs cannot cross the C boundary; they are dropped.
fn into_c_string(value: String) -> *mut c_char {
    let bytes: Vec<u8> = value.into_bytes().into_iter().filter(|&b| b != 0).collect();
    CString::new(bytes).unwrap_or_default().into_raw()
}

/// Helper: convert a C string pointer to a Rust &str.
/// Returns None if the pointer is null or not valid UTF-8.
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Fingerprint a SQL query.
///
/// # Safety
/// `query` must be a valid null-terminated UTF-8 C string.
/// The caller must free the returned strings with `sqlprint_free_string()`.
#[no_mangle]
pub unsafe extern "C" fn sqlprint_fingerprint(query: *const c_char) -> SqlprintResult {
    let query = match cstr_to_str(query) {
        Some(s) => s,
        None => return SqlprintResult::err("null or invalid UTF-8 input".into()),
    };

    match sqlprint_core::fingerprint(query) {
        Ok(fp) => SqlprintResult::ok(fp),
        Err(e) => SqlprintResult::err(e.to_string()),
    }
}

/// Classify a SQL query.
/// Returns JSON: { "origin": "...", "text": "...", "hash": "..." }
///
/// # Safety
/// `query` must be a valid null-terminated UTF-8 C string.
/// The caller must free the returned strings with `sqlprint_free_string()`.
#[no_mangle]
pub unsafe extern "C" fn sqlprint_classify(query: *const c_char) -> SqlprintResult {
    let query = match cstr_to_str(query) {
        Some(s) => s,
        None => return SqlprintResult::err("null or invalid UTF-8 input".into()),
    };

    let fp = match sqlprint_core::classify(query, &sqlprint_core::Options::default()) {
        Ok(fp) => fp,
        Err(e) => return SqlprintResult::err(e.to_string()),
    };

    match serde_json::to_string(&fp) {
        Ok(json) => SqlprintResult::ok(json),
        Err(e) => SqlprintResult::err(format!("Serialization error: {}", e)),
    }
}

/// SHA-256 hash of a query's fingerprint.
///
/// # Safety
/// `query` must be a valid null-terminated UTF-8 C string.
/// The caller must free the returned strings with `sqlprint_free_string()`.
#[no_mangle]
pub unsafe extern "C" fn sqlprint_hash(query: *const c_char) -> SqlprintResult {
    let query = match cstr_to_str(query) {
        Some(s) => s,
        None => return SqlprintResult::err("null or invalid UTF-8 input".into()),
    };

    match sqlprint_core::fingerprint(query) {
        Ok(fp) => SqlprintResult::ok(sqlprint_core::fingerprint_hash(&fp)),
        Err(e) => SqlprintResult::err(e.to_string()),
    }
}

/// Free a string previously returned by a sqlprint FFI function.
///
/// # Safety
/// `ptr` must be a pointer previously returned by a sqlprint FFI function,
/// or null (in which case this is a no-op).
#[no_mangle]
pub unsafe extern "C" fn sqlprint_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
