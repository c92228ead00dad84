//! Win32 enumeration of alternate data streams and remote disk shares.
use super::StreamInfo;
use std::ffi::{c_void, OsStr, OsString};
use std::io;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::Path;
use std::ptr::null_mut;
use windows_sys::Win32::Foundation::{ERROR_HANDLE_EOF, ERROR_MORE_DATA, INVALID_HANDLE_VALUE};
use windows_sys::Win32::NetworkManagement::NetManagement::{NetApiBufferFree, MAX_PREFERRED_LENGTH};
use windows_sys::Win32::Storage::FileSystem::{
    FindClose, FindFirstStreamW, FindNextStreamW, FindStreamInfoStandard, NetShareEnum,
    SHARE_INFO_1, STYPE_DISKTREE, STYPE_SPECIAL, WIN32_FIND_STREAM_DATA,
};

/// Low byte of `shi1_type`; the high bits carry the special and temporary flags
const SHARE_TYPE_MASK: u32 = 0xFF;

fn wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    OsString::from_wide(&buf[..len]).to_string_lossy().into_owned()
}

/// Reads a NUL-terminated UTF-16 string owned by the API
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer that outlives the call.
unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    from_wide(std::slice::from_raw_parts(ptr, len))
}

/// Turns a raw `:name:$DATA` entry into the bare stream name. The default
/// stream (`::$DATA`) yields `None`.
fn stream_name(raw: &str) -> Option<String> {
    let name = raw.strip_prefix(':').unwrap_or(raw);
    let name = match name.rfind(':') {
        Some(pos) => &name[..pos],
        None => name,
    };
    (!name.is_empty()).then(|| name.to_string())
}

fn push_stream(data: &WIN32_FIND_STREAM_DATA, streams: &mut Vec<StreamInfo>) {
    if let Some(name) = stream_name(&from_wide(&data.cStreamName)) {
        streams.push(StreamInfo {
            name,
            size: data.StreamSize.max(0) as u64,
        });
    }
}

pub(super) fn list_streams(path: &Path) -> io::Result<Vec<StreamInfo>> {
    let path = wide(path.as_os_str());
    let mut data: WIN32_FIND_STREAM_DATA = unsafe { std::mem::zeroed() };
    let mut streams = Vec::new();

    // Safety: `path` is NUL-terminated and `data` is the structure
    // FindStreamInfoStandard fills in.
    unsafe {
        let handle = FindFirstStreamW(
            path.as_ptr(),
            FindStreamInfoStandard,
            &mut data as *mut _ as *mut c_void,
            0,
        );
        if handle == INVALID_HANDLE_VALUE {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if code as u32 == ERROR_HANDLE_EOF => Ok(streams),
                _ => Err(err),
            };
        }

        push_stream(&data, &mut streams);
        while FindNextStreamW(handle, &mut data as *mut _ as *mut c_void) != 0 {
            push_stream(&data, &mut streams);
        }
        let err = io::Error::last_os_error();
        FindClose(handle);

        match err.raw_os_error() {
            Some(code) if code as u32 == ERROR_HANDLE_EOF => Ok(streams),
            _ => Err(err),
        }
    }
}

pub(super) fn list_shares(machine: &str) -> io::Result<Vec<String>> {
    let server = wide(OsStr::new(&format!("\\\\{}", machine.trim_start_matches('\\'))));
    let mut shares = Vec::new();
    let mut resume: u32 = 0;

    loop {
        let mut buf: *mut u8 = null_mut();
        let mut read: u32 = 0;
        let mut total: u32 = 0;

        // Safety: NetShareEnum allocates `buf`, which holds `read` SHARE_INFO_1
        // entries until NetApiBufferFree releases it.
        let status = unsafe {
            let status = NetShareEnum(
                server.as_ptr(),
                1,
                &mut buf,
                MAX_PREFERRED_LENGTH,
                &mut read,
                &mut total,
                &mut resume,
            );
            if status == 0 || status == ERROR_MORE_DATA {
                if !buf.is_null() {
                    let entries =
                        std::slice::from_raw_parts(buf as *const SHARE_INFO_1, read as usize);
                    for entry in entries {
                        // Administrative shares (C$, ADMIN$) alias whole volumes
                        if entry.shi1_type & STYPE_SPECIAL != 0 {
                            continue;
                        }
                        if entry.shi1_type & SHARE_TYPE_MASK == STYPE_DISKTREE {
                            shares.push(from_wide_ptr(entry.shi1_netname));
                        }
                    }
                }
            }
            if !buf.is_null() {
                NetApiBufferFree(buf as *const c_void);
            }
            status
        };

        match status {
            0 => return Ok(shares),
            ERROR_MORE_DATA => continue,
            code => return Err(io::Error::from_raw_os_error(code as i32)),
        }
    }
}
