//! Named kernel mutex backend

use std::ptr;
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE};
use windows_sys::Win32::System::Threading::CreateMutexW;

use super::{HeldLock, LockError, NamedLock};

pub struct NativeMutexBackend;

impl NamedLock for NativeMutexBackend {
    fn backend(&self) -> &'static str {
        "native"
    }

    /// Opening an existing mutex of the same name is a successful create.
    fn acquire(&self, name: &str) -> Result<Box<dyn HeldLock>, LockError> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is NUL-terminated and outlives the call; null attributes are allowed.
        let handle = unsafe { CreateMutexW(ptr::null(), 0, wide.as_ptr()) };
        if handle.is_null() {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            return Err(LockError::Os {
                op: "CreateMutex",
                code,
            });
        }
        Ok(Box::new(NativeMutex {
            name: name.to_string(),
            handle,
        }))
    }
}

/// Open mutex handle; not closed on drop, release is explicit
struct NativeMutex {
    name: String,
    handle: HANDLE,
}

impl HeldLock for NativeMutex {
    fn name(&self) -> &str {
        &self.name
    }

    fn created_message(&self) -> String {
        format!("Created Windows mutex '{}'", self.name)
    }

    fn release(&self) -> Result<String, LockError> {
        // SAFETY: handle came from a successful CreateMutexW; the adapter
        // stops tracking it after a successful close.
        let ok = unsafe { CloseHandle(self.handle) };
        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            return Err(LockError::Os {
                op: "CloseHandle",
                code,
            });
        }
        Ok("Released Windows mutex".to_string())
    }
}
