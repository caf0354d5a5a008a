//! C ABI for lofi workspaces
//!
//! Every object crosses the boundary as an opaque boxed handle with a matching
//! `*_destroy` call. Failing calls return null or `-1` and leave a message in
//! the thread-local error slot (see [`last_error_length`] and
//! [`error_message_utf8`]). Strings are returned in a [`Buffer`] that the
//! caller releases with [`buffer_destroy`].
//!
//! Navigation calls (`cursor_struct_field`, `cursor_map_key_*`,
//! `cursor_array_index`, `cursor_array_insert`) move the cursor handle in
//! place; use [`cursor_clone`] to keep the previous position.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

mod error;

pub use error::{error_message_utf8, last_error_length};

use error::{guard, FfiError};
use lofi_core::{Actor, DocId, PeerId, Permission, RegisterValues};
use std::path::Path;

pub struct Sdk(lofi_sdk::Sdk);
pub struct DocIter(lofi_sdk::DocIter);
pub struct Doc(lofi_sdk::Doc);
pub struct Cursor(lofi_core::Cursor);
pub struct Causal(lofi_core::Causal);
pub struct BoolIter(RegisterValues<bool>);
pub struct U64Iter(RegisterValues<u64>);
pub struct I64Iter(RegisterValues<i64>);
pub struct StrIter(RegisterValues<String>);

/// Bytes owned by the library until passed to [`buffer_destroy`]
#[repr(C)]
pub struct Buffer {
    pub data: *mut u8,
    pub len: usize,
    pub cap: usize,
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        let mut bytes = std::mem::ManuallyDrop::new(bytes);
        Buffer {
            data: bytes.as_mut_ptr(),
            len: bytes.len(),
            cap: bytes.capacity(),
        }
    }
}

fn handle<'a, T>(ptr: *mut T, what: &'static str) -> Result<&'a mut T, FfiError> {
    // SAFETY: non-null handles were produced by `into_handle` and are still
    // alive; the caller serialises access to each handle.
    unsafe { ptr.as_mut() }.ok_or(FfiError::NullPointer(what))
}

fn take<T>(ptr: *mut T, what: &'static str) -> Result<Box<T>, FfiError> {
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    // SAFETY: see `handle`; ownership returns to Rust here.
    Ok(unsafe { Box::from_raw(ptr) })
}

fn into_handle<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

fn bytes<'a>(ptr: *const u8, len: usize, what: &'static str) -> Result<&'a [u8], FfiError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    // SAFETY: the caller provides `len` readable bytes at `ptr`.
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn utf8<'a>(ptr: *const u8, len: usize, what: &'static str) -> Result<&'a str, FfiError> {
    std::str::from_utf8(bytes(ptr, len, what)?).map_err(|_| FfiError::InvalidUtf8(what))
}

fn id_bytes<'a>(ptr: *const [u8; 32], what: &'static str) -> Result<&'a [u8; 32], FfiError> {
    // SAFETY: the caller provides 32 readable bytes at `ptr`.
    unsafe { ptr.as_ref() }.ok_or(FfiError::NullPointer(what))
}

fn write_id(out: *mut [u8; 32], bytes: &[u8; 32], what: &'static str) -> Result<(), FfiError> {
    // SAFETY: the caller provides 32 writable bytes at `out`.
    let out = unsafe { out.as_mut() }.ok_or(FfiError::NullPointer(what))?;
    out.copy_from_slice(bytes);
    Ok(())
}

fn write<T>(out: *mut T, value: T, what: &'static str) -> Result<(), FfiError> {
    // SAFETY: the caller provides a writable `T` at `out`.
    let out = unsafe { out.as_mut() }.ok_or(FfiError::NullPointer(what))?;
    *out = value;
    Ok(())
}

fn destroy<T>(ptr: *mut T, what: &'static str) -> i32 {
    guard(-1, || {
        drop(take(ptr, what)?);
        Ok(0)
    })
}

// Workspace

#[no_mangle]
pub extern "C" fn sdk_create_persistent(
    db_path_ptr: *const u8,
    db_path_len: usize,
    package_ptr: *const u8,
    package_len: usize,
) -> *mut Sdk {
    guard(std::ptr::null_mut(), || {
        let path = Path::new(utf8(db_path_ptr, db_path_len, "db_path")?);
        let package = bytes(package_ptr, package_len, "package")?;
        let sdk = lofi_sdk::Sdk::create_persistent(path, package)?;
        Ok(into_handle(Sdk(sdk)))
    })
}

#[no_mangle]
pub extern "C" fn sdk_create_memory(package_ptr: *const u8, package_len: usize) -> *mut Sdk {
    guard(std::ptr::null_mut(), || {
        let package = bytes(package_ptr, package_len, "package")?;
        Ok(into_handle(Sdk(lofi_sdk::Sdk::create_memory(package)?)))
    })
}

#[no_mangle]
pub extern "C" fn sdk_destroy(sdk: *mut Sdk) -> i32 {
    destroy(sdk, "sdk")
}

#[no_mangle]
pub extern "C" fn sdk_get_peerid(sdk: *mut Sdk, peer: *mut [u8; 32]) -> i32 {
    guard(-1, || {
        let sdk = handle(sdk, "sdk")?;
        write_id(peer, sdk.0.peer_id().as_bytes(), "peer")?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn sdk_add_address(
    sdk: *mut Sdk,
    peer: *const [u8; 32],
    addr: *const u8,
    addr_length: usize,
) -> i32 {
    guard(-1, || {
        let sdk = handle(sdk, "sdk")?;
        let peer = PeerId::new(*id_bytes(peer, "peer")?);
        sdk.0.add_address(&peer, utf8(addr, addr_length, "addr")?)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn sdk_remove_address(
    sdk: *mut Sdk,
    peer: *const [u8; 32],
    addr: *const u8,
    addr_length: usize,
) -> i32 {
    guard(-1, || {
        let sdk = handle(sdk, "sdk")?;
        let peer = PeerId::new(*id_bytes(peer, "peer")?);
        sdk.0.remove_address(&peer, utf8(addr, addr_length, "addr")?)?;
        Ok(0)
    })
}

/// Iterate stored documents; an empty schema name lists every document
#[no_mangle]
pub extern "C" fn sdk_create_doc_iter(
    sdk: *mut Sdk,
    schema: *const u8,
    schema_len: usize,
) -> *mut DocIter {
    guard(std::ptr::null_mut(), || {
        let sdk = handle(sdk, "sdk")?;
        let schema = utf8(schema, schema_len, "schema")?;
        let filter = (!schema.is_empty()).then_some(schema);
        Ok(into_handle(DocIter(sdk.0.list_documents(filter)?)))
    })
}

#[no_mangle]
pub extern "C" fn doc_iter_next(iter: *mut DocIter, doc: *mut [u8; 32]) -> i32 {
    guard(-1, || {
        let iter = handle(iter, "iter")?;
        match iter.0.next() {
            Some(id) => {
                write_id(doc, id.as_bytes(), "doc")?;
                Ok(1)
            }
            None => Ok(0),
        }
    })
}

#[no_mangle]
pub extern "C" fn doc_iter_destroy(iter: *mut DocIter) -> i32 {
    destroy(iter, "iter")
}

#[no_mangle]
pub extern "C" fn sdk_create_doc(
    sdk: *mut Sdk,
    schema_ptr: *const u8,
    schema_len: usize,
) -> *mut Doc {
    guard(std::ptr::null_mut(), || {
        let sdk = handle(sdk, "sdk")?;
        let schema = utf8(schema_ptr, schema_len, "schema")?;
        Ok(into_handle(Doc(sdk.0.create_document(schema)?)))
    })
}

#[no_mangle]
pub extern "C" fn sdk_open_doc(sdk: *mut Sdk, doc: *const [u8; 32]) -> *mut Doc {
    guard(std::ptr::null_mut(), || {
        let sdk = handle(sdk, "sdk")?;
        let id = DocId::new(*id_bytes(doc, "doc")?);
        Ok(into_handle(Doc(sdk.0.open_document(&id)?)))
    })
}

#[no_mangle]
pub extern "C" fn sdk_add_doc(
    sdk: *mut Sdk,
    doc: *const [u8; 32],
    schema_ptr: *const u8,
    schema_len: usize,
) -> *mut Doc {
    guard(std::ptr::null_mut(), || {
        let sdk = handle(sdk, "sdk")?;
        let id = DocId::new(*id_bytes(doc, "doc")?);
        let schema = utf8(schema_ptr, schema_len, "schema")?;
        Ok(into_handle(Doc(sdk.0.add_document(id, schema)?)))
    })
}

#[no_mangle]
pub extern "C" fn sdk_remove_doc(sdk: *mut Sdk, doc: *const [u8; 32]) -> i32 {
    guard(-1, || {
        let sdk = handle(sdk, "sdk")?;
        let id = DocId::new(*id_bytes(doc, "doc")?);
        sdk.0.remove_document(&id)?;
        Ok(0)
    })
}

// Documents

#[no_mangle]
pub extern "C" fn doc_get_id(doc: *mut Doc, id: *mut [u8; 32]) -> i32 {
    guard(-1, || {
        let doc = handle(doc, "doc")?;
        write_id(id, doc.0.id().as_bytes(), "id")?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn doc_create_cursor(doc: *mut Doc) -> *mut Cursor {
    guard(std::ptr::null_mut(), || {
        let doc = handle(doc, "doc")?;
        Ok(into_handle(Cursor(doc.0.cursor())))
    })
}

/// Apply a delta to the document. The causal handle is consumed, also on
/// failure.
#[no_mangle]
pub extern "C" fn doc_apply_causal(doc: *mut Doc, causal: *mut Causal) -> i32 {
    guard(-1, || {
        let causal = take(causal, "causal")?;
        let doc = handle(doc, "doc")?;
        doc.0.apply(causal.0)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn doc_destroy(doc: *mut Doc) -> i32 {
    destroy(doc, "doc")
}

// Deltas

/// Join `other` into `causal`, consuming `other`
#[no_mangle]
pub extern "C" fn causal_join(causal: *mut Causal, other: *mut Causal) -> i32 {
    guard(-1, || {
        let other = take(other, "other")?;
        let causal = handle(causal, "causal")?;
        causal.0.join(&other.0);
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn causal_destroy(causal: *mut Causal) -> i32 {
    destroy(causal, "causal")
}

// Cursors

#[no_mangle]
pub extern "C" fn cursor_clone(cursor: *mut Cursor) -> *mut Cursor {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(Cursor(cursor.0.clone())))
    })
}

fn mutate(
    cursor: *mut Cursor,
    f: impl FnOnce(&lofi_core::Cursor) -> lofi_core::Result<lofi_core::Causal>,
) -> *mut Causal {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(Causal(f(&cursor.0)?)))
    })
}

fn navigate(
    cursor: *mut Cursor,
    f: impl FnOnce(&lofi_core::Cursor) -> lofi_core::Result<lofi_core::Cursor>,
) -> i32 {
    guard(-1, || {
        let cursor = handle(cursor, "cursor")?;
        cursor.0 = f(&cursor.0)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn cursor_flag_enabled(cursor: *mut Cursor) -> i32 {
    guard(-1, || {
        let cursor = handle(cursor, "cursor")?;
        Ok(cursor.0.flag_enabled()? as i32)
    })
}

#[no_mangle]
pub extern "C" fn cursor_flag_enable(cursor: *mut Cursor) -> *mut Causal {
    mutate(cursor, |c| c.flag_enable())
}

#[no_mangle]
pub extern "C" fn cursor_flag_disable(cursor: *mut Cursor) -> *mut Causal {
    mutate(cursor, |c| c.flag_disable())
}

#[no_mangle]
pub extern "C" fn cursor_reg_bools(cursor: *mut Cursor) -> *mut BoolIter {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(BoolIter(cursor.0.reg_bools()?)))
    })
}

#[no_mangle]
pub extern "C" fn bool_iter_next(iter: *mut BoolIter, value: *mut bool) -> i32 {
    guard(-1, || match handle(iter, "iter")?.0.next() {
        Some(v) => write(value, v, "value").map(|_| 1),
        None => Ok(0),
    })
}

#[no_mangle]
pub extern "C" fn bool_iter_destroy(iter: *mut BoolIter) -> i32 {
    destroy(iter, "iter")
}

#[no_mangle]
pub extern "C" fn cursor_reg_u64s(cursor: *mut Cursor) -> *mut U64Iter {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(U64Iter(cursor.0.reg_u64s()?)))
    })
}

#[no_mangle]
pub extern "C" fn u64_iter_next(iter: *mut U64Iter, value: *mut u64) -> i32 {
    guard(-1, || match handle(iter, "iter")?.0.next() {
        Some(v) => write(value, v, "value").map(|_| 1),
        None => Ok(0),
    })
}

#[no_mangle]
pub extern "C" fn u64_iter_destroy(iter: *mut U64Iter) -> i32 {
    destroy(iter, "iter")
}

#[no_mangle]
pub extern "C" fn cursor_reg_i64s(cursor: *mut Cursor) -> *mut I64Iter {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(I64Iter(cursor.0.reg_i64s()?)))
    })
}

#[no_mangle]
pub extern "C" fn i64_iter_next(iter: *mut I64Iter, value: *mut i64) -> i32 {
    guard(-1, || match handle(iter, "iter")?.0.next() {
        Some(v) => write(value, v, "value").map(|_| 1),
        None => Ok(0),
    })
}

#[no_mangle]
pub extern "C" fn i64_iter_destroy(iter: *mut I64Iter) -> i32 {
    destroy(iter, "iter")
}

#[no_mangle]
pub extern "C" fn cursor_reg_strs(cursor: *mut Cursor) -> *mut StrIter {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(StrIter(cursor.0.reg_strs()?)))
    })
}

/// Yield the next string into `buffer`, which the caller must release with
/// `buffer_destroy`
#[no_mangle]
pub extern "C" fn str_iter_next(iter: *mut StrIter, buffer: *mut Buffer) -> i32 {
    guard(-1, || match handle(iter, "iter")?.0.next() {
        Some(v) => write(buffer, Buffer::from(v.into_bytes()), "buffer").map(|_| 1),
        None => Ok(0),
    })
}

#[no_mangle]
pub extern "C" fn buffer_destroy(buf: Buffer) -> i32 {
    guard(-1, || {
        if !buf.data.is_null() {
            // SAFETY: the buffer was built from a Vec by `Buffer::from`.
            drop(unsafe { Vec::from_raw_parts(buf.data, buf.len, buf.cap) });
        }
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn str_iter_destroy(iter: *mut StrIter) -> i32 {
    destroy(iter, "iter")
}

#[no_mangle]
pub extern "C" fn cursor_reg_assign_bool(cursor: *mut Cursor, value: bool) -> *mut Causal {
    mutate(cursor, |c| c.reg_assign_bool(value))
}

#[no_mangle]
pub extern "C" fn cursor_reg_assign_u64(cursor: *mut Cursor, value: u64) -> *mut Causal {
    mutate(cursor, |c| c.reg_assign_u64(value))
}

#[no_mangle]
pub extern "C" fn cursor_reg_assign_i64(cursor: *mut Cursor, value: i64) -> *mut Causal {
    mutate(cursor, |c| c.reg_assign_i64(value))
}

#[no_mangle]
pub extern "C" fn cursor_reg_assign_str(
    cursor: *mut Cursor,
    value: *const u8,
    value_length: usize,
) -> *mut Causal {
    guard(std::ptr::null_mut(), || {
        let value = utf8(value, value_length, "value")?;
        let cursor = handle(cursor, "cursor")?;
        Ok(into_handle(Causal(cursor.0.reg_assign_str(value)?)))
    })
}

#[no_mangle]
pub extern "C" fn cursor_struct_field(
    cursor: *mut Cursor,
    field: *const u8,
    field_length: usize,
) -> i32 {
    guard(-1, || {
        let field = utf8(field, field_length, "field")?;
        let cursor = handle(cursor, "cursor")?;
        cursor.0 = cursor.0.field(field)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn cursor_map_key_bool(cursor: *mut Cursor, key: bool) -> i32 {
    navigate(cursor, |c| c.map_key_bool(key))
}

#[no_mangle]
pub extern "C" fn cursor_map_key_u64(cursor: *mut Cursor, key: u64) -> i32 {
    navigate(cursor, |c| c.map_key_u64(key))
}

#[no_mangle]
pub extern "C" fn cursor_map_key_i64(cursor: *mut Cursor, key: i64) -> i32 {
    navigate(cursor, |c| c.map_key_i64(key))
}

#[no_mangle]
pub extern "C" fn cursor_map_key_str(
    cursor: *mut Cursor,
    key: *const u8,
    key_length: usize,
) -> i32 {
    guard(-1, || {
        let key = utf8(key, key_length, "key")?;
        let cursor = handle(cursor, "cursor")?;
        cursor.0 = cursor.0.map_key_str(key)?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn cursor_map_remove(cursor: *mut Cursor) -> *mut Causal {
    mutate(cursor, |c| c.map_remove())
}

#[no_mangle]
pub extern "C" fn cursor_array_length(cursor: *mut Cursor) -> i64 {
    guard(-1, || {
        let cursor = handle(cursor, "cursor")?;
        Ok(cursor.0.array_length()? as i64)
    })
}

#[no_mangle]
pub extern "C" fn cursor_array_index(cursor: *mut Cursor, index: u32) -> i32 {
    navigate(cursor, |c| c.array_index(index as usize))
}

/// Move the cursor to a new element at `index`; the element is created by
/// the first delta written through the cursor
#[no_mangle]
pub extern "C" fn cursor_array_insert(cursor: *mut Cursor, index: u32) -> i32 {
    navigate(cursor, |c| c.array_insert(index as usize))
}

#[no_mangle]
pub extern "C" fn cursor_array_move(cursor: *mut Cursor, index: u32) -> *mut Causal {
    mutate(cursor, |c| c.array_move(index as usize))
}

#[no_mangle]
pub extern "C" fn cursor_array_delete(cursor: *mut Cursor) -> *mut Causal {
    mutate(cursor, |c| c.array_delete())
}

/// 1 if `peer` holds `perm` (0 read, 1 write, 2 control, 3 own) at the
/// cursor, 0 if not
#[no_mangle]
pub extern "C" fn cursor_acl_can(cursor: *mut Cursor, peer: *const [u8; 32], perm: u8) -> i32 {
    guard(-1, || {
        let cursor = handle(cursor, "cursor")?;
        let peer = PeerId::new(*id_bytes(peer, "peer")?);
        let perm = Permission::try_from(perm).map_err(|_| FfiError::InvalidPermission(perm))?;
        Ok(cursor.0.acl_can(&peer, perm) as i32)
    })
}

/// Grant `perm` at the cursor to `peer`, or to anyone if `peer` is null
#[no_mangle]
pub extern "C" fn cursor_acl_grant(
    cursor: *mut Cursor,
    peer: *const [u8; 32],
    perm: u8,
) -> *mut Causal {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        let perm = Permission::try_from(perm).map_err(|_| FfiError::InvalidPermission(perm))?;
        Ok(into_handle(Causal(cursor.0.acl_grant(actor(peer), perm)?)))
    })
}

/// Revoke the grants of `perm` (or stronger) to `peer` at the cursor
#[no_mangle]
pub extern "C" fn cursor_acl_revoke(
    cursor: *mut Cursor,
    peer: *const [u8; 32],
    perm: u8,
) -> *mut Causal {
    guard(std::ptr::null_mut(), || {
        let cursor = handle(cursor, "cursor")?;
        let perm = Permission::try_from(perm).map_err(|_| FfiError::InvalidPermission(perm))?;
        Ok(into_handle(Causal(cursor.0.acl_revoke(actor(peer), perm)?)))
    })
}

fn actor(peer: *const [u8; 32]) -> Actor {
    // SAFETY: a non-null `peer` points at 32 readable bytes.
    match unsafe { peer.as_ref() } {
        Some(bytes) => Actor::Peer(PeerId::new(*bytes)),
        None => Actor::Anyone,
    }
}

#[no_mangle]
pub extern "C" fn cursor_destroy(cursor: *mut Cursor) -> i32 {
    destroy(cursor, "cursor")
}
