//! Native Windows registry backend (read-only)

use std::ptr;
use windows_sys::Win32::Foundation::{ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegEnumValueW, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_CLASSES_ROOT,
    HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_READ,
    REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ, REG_QWORD, REG_SZ,
};

use super::{split_key_path, KeyValueStore, RegValue, RegistryError, RootKey};

/// Longest value name the registry allows, in UTF-16 units
const MAX_VALUE_NAME: usize = 16_384;

pub struct NativeRegistry;

impl KeyValueStore for NativeRegistry {
    fn backend(&self) -> &'static str {
        "native"
    }

    fn query(&self, key_path: &str, value_name: Option<&str>) -> Result<String, RegistryError> {
        let parts = split_key_path(key_path);
        let root = RootKey::from_name(parts.root)
            .ok_or_else(|| RegistryError::UnknownRoot(parts.root.to_string()))?;
        let key = OpenKey::open(root, parts.sub_path, key_path)?;

        match value_name {
            Some(name) => {
                let value = key.value(name)?;
                Ok(format!("Registry {key_path} {name} = {value}"))
            }
            None => {
                let pairs: Vec<String> = key
                    .values()?
                    .into_iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                Ok(format!("Registry {key_path} values: {}", pairs.join(";")))
            }
        }
    }
}

fn root_handle(root: RootKey) -> HKEY {
    match root {
        RootKey::ClassesRoot => HKEY_CLASSES_ROOT,
        RootKey::CurrentUser => HKEY_CURRENT_USER,
        RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
        RootKey::Users => HKEY_USERS,
        RootKey::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn decode(kind: u32, data: &[u8]) -> RegValue {
    match kind {
        REG_SZ | REG_EXPAND_SZ => RegValue::Text(RegValue::text_from_utf16le(data)),
        REG_MULTI_SZ => RegValue::MultiText(RegValue::multi_from_utf16le(data)),
        REG_DWORD if data.len() >= 4 => {
            RegValue::Dword(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }
        REG_QWORD if data.len() >= 8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[..8]);
            RegValue::Qword(u64::from_le_bytes(raw))
        }
        _ => RegValue::Binary(data.to_vec()),
    }
}

/// Key handle closed on drop
struct OpenKey {
    handle: HKEY,
    path: String,
}

impl OpenKey {
    fn open(root: RootKey, sub_path: &str, display: &str) -> Result<Self, RegistryError> {
        let sub = wide(sub_path);
        let mut handle: HKEY = ptr::null_mut();
        // SAFETY: `sub` is NUL-terminated and outlives the call; `handle` is a valid out pointer.
        let status =
            unsafe { RegOpenKeyExW(root_handle(root), sub.as_ptr(), 0, KEY_READ, &mut handle) };
        if status != ERROR_SUCCESS {
            return Err(RegistryError::Os {
                op: "RegOpenKeyEx",
                path: display.to_string(),
                code: status,
            });
        }
        Ok(Self {
            handle,
            path: display.to_string(),
        })
    }

    fn value(&self, name: &str) -> Result<RegValue, RegistryError> {
        let wide_name = wide(name);
        let mut data: Vec<u8> = vec![0; 256];
        loop {
            let mut kind = 0u32;
            let mut len = data.len() as u32;
            // SAFETY: buffers are valid for the lengths passed; the key handle is open.
            let status = unsafe {
                RegQueryValueExW(
                    self.handle,
                    wide_name.as_ptr(),
                    ptr::null(),
                    &mut kind,
                    data.as_mut_ptr(),
                    &mut len,
                )
            };
            match status {
                ERROR_SUCCESS => {
                    data.truncate(len as usize);
                    return Ok(decode(kind, &data));
                }
                ERROR_MORE_DATA => data.resize(len as usize, 0),
                code => {
                    return Err(RegistryError::Os {
                        op: "RegQueryValueEx",
                        path: format!("{}\\{name}", self.path),
                        code,
                    })
                }
            }
        }
    }

    fn values(&self) -> Result<Vec<(String, RegValue)>, RegistryError> {
        let mut out = Vec::new();
        let mut name_buf = vec![0u16; MAX_VALUE_NAME];
        let mut data: Vec<u8> = vec![0; 1024];
        let mut index = 0u32;

        loop {
            let mut name_len = name_buf.len() as u32;
            let mut kind = 0u32;
            let mut len = data.len() as u32;
            // SAFETY: buffers are valid for the lengths passed; the key handle is open.
            let status = unsafe {
                RegEnumValueW(
                    self.handle,
                    index,
                    name_buf.as_mut_ptr(),
                    &mut name_len,
                    ptr::null(),
                    &mut kind,
                    data.as_mut_ptr(),
                    &mut len,
                )
            };
            match status {
                ERROR_SUCCESS => {
                    let name = String::from_utf16_lossy(&name_buf[..name_len as usize]);
                    out.push((name, decode(kind, &data[..len as usize])));
                    index += 1;
                }
                // retry the same index with room for the data
                ERROR_MORE_DATA => data.resize((len as usize).max(data.len() * 2), 0),
                // end of values is normal termination
                ERROR_NO_MORE_ITEMS => return Ok(out),
                code => {
                    return Err(RegistryError::Os {
                        op: "RegEnumValue",
                        path: self.path.clone(),
                        code,
                    })
                }
            }
        }
    }
}

impl Drop for OpenKey {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful RegOpenKeyExW and is closed once.
        unsafe {
            RegCloseKey(self.handle);
        }
    }
}
