//! Fletcher platform libraries loaded at runtime.
//!
//! A Fletcher platform (`aws`, `aws_sim`, `snap`, `echo`, ...) ships as a
//! shared library `libfletcher_<name>.so` exporting a fixed set of C
//! functions. They are resolved with `dlopen`/`dlsym` when the platform is
//! created, so the harness builds and runs without any of them installed.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FletcherError, Result};
use crate::platform::{DeviceAddress, Platform};

/// `fstatus_t` value of a successful call.
const FLETCHER_STATUS_OK: u64 = 0;

const RTLD_NOW: c_int = 2;
const RTLD_GLOBAL: c_int = 0x100;

extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

type GetNameFn = unsafe extern "C" fn(*mut c_char, usize) -> u64;
type InitFn = unsafe extern "C" fn(*mut c_void) -> u64;
type WriteMmioFn = unsafe extern "C" fn(u64, u32) -> u64;
type ReadMmioFn = unsafe extern "C" fn(u64, *mut u32) -> u64;
type DeviceMallocFn = unsafe extern "C" fn(*mut u64, i64) -> u64;
type DeviceFreeFn = unsafe extern "C" fn(u64) -> u64;
type CopyHostToDeviceFn = unsafe extern "C" fn(*const u8, u64, i64) -> u64;
type CopyDeviceToHostFn = unsafe extern "C" fn(u64, *mut u8, i64) -> u64;
type TerminateFn = unsafe extern "C" fn(*mut c_void) -> u64;

struct Symbols {
    get_name: GetNameFn,
    init: InitFn,
    write_mmio: WriteMmioFn,
    read_mmio: ReadMmioFn,
    device_malloc: DeviceMallocFn,
    device_free: DeviceFreeFn,
    copy_host_to_device: CopyHostToDeviceFn,
    copy_device_to_host: CopyDeviceToHostFn,
    terminate: TerminateFn,
}

/// Init argument of the `aws_sim` platform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwsSimInitOptions {
    /// Nonzero skips DDR initialization, required for single-DDR builds.
    pub no_ddr_init: c_int,
}

/// Platform-specific data passed to `platformInit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitData {
    None,
    AwsSim(AwsSimInitOptions),
}

/// A platform backed by a dynamically loaded Fletcher platform library.
pub struct DylibPlatform {
    name: String,
    /// `dlopen` handle, kept as an integer so the struct stays `Send + Sync`.
    handle: usize,
    symbols: Symbols,
    init_data: Mutex<InitData>,
    /// Platform libraries keep global state; calls are serialized.
    lock: Mutex<()>,
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a pointer to a NUL-terminated string
    // owned by the loader, valid until the next dl* call on this thread.
    unsafe {
        let err = dlerror();
        if err.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

fn resolve(handle: *mut c_void, library: &str, symbol: &str) -> Result<*mut c_void> {
    let c_symbol = CString::new(symbol).map_err(|e| FletcherError::Load {
        library: library.to_string(),
        reason: e.to_string(),
    })?;
    // SAFETY: handle came from a successful dlopen and is still open.
    let ptr = unsafe { dlsym(handle, c_symbol.as_ptr()) };
    if ptr.is_null() {
        return Err(FletcherError::Load {
            library: library.to_string(),
            reason: format!("missing symbol {}: {}", symbol, last_dl_error()),
        });
    }
    Ok(ptr)
}

impl DylibPlatform {
    /// Shared library name for platform `name`.
    pub fn library_name(name: &str) -> String {
        format!("libfletcher_{}.so", name)
    }

    /// Load `libfletcher_<name>.so` and resolve the platform interface.
    pub fn load(name: &str) -> Result<Self> {
        let library = Self::library_name(name);
        let c_library = CString::new(library.clone()).map_err(|e| FletcherError::Load {
            library: library.clone(),
            reason: e.to_string(),
        })?;

        // SAFETY: c_library is a valid NUL-terminated path.
        let handle = unsafe { dlopen(c_library.as_ptr(), RTLD_NOW | RTLD_GLOBAL) };
        if handle.is_null() {
            return Err(FletcherError::Load {
                library,
                reason: last_dl_error(),
            });
        }

        let symbols = match Self::resolve_all(handle, &library) {
            Ok(symbols) => symbols,
            Err(e) => {
                // SAFETY: handle is open and nothing resolved from it escapes.
                unsafe { dlclose(handle) };
                return Err(e);
            }
        };

        let mut platform = Self {
            name: name.to_string(),
            handle: handle as usize,
            symbols,
            init_data: Mutex::new(InitData::None),
            lock: Mutex::new(()),
        };
        if let Some(reported) = platform.query_name() {
            platform.name = reported;
        }
        info!("Loaded Fletcher platform '{}' from {}", platform.name, library);
        Ok(platform)
    }

    fn resolve_all(handle: *mut c_void, library: &str) -> Result<Symbols> {
        // SAFETY: each symbol is declared by the Fletcher platform interface
        // with exactly the signature it is transmuted to.
        unsafe {
            Ok(Symbols {
                get_name: std::mem::transmute::<*mut c_void, GetNameFn>(resolve(
                    handle,
                    library,
                    "platformGetName",
                )?),
                init: std::mem::transmute::<*mut c_void, InitFn>(resolve(
                    handle,
                    library,
                    "platformInit",
                )?),
                write_mmio: std::mem::transmute::<*mut c_void, WriteMmioFn>(resolve(
                    handle,
                    library,
                    "platformWriteMMIO",
                )?),
                read_mmio: std::mem::transmute::<*mut c_void, ReadMmioFn>(resolve(
                    handle,
                    library,
                    "platformReadMMIO",
                )?),
                device_malloc: std::mem::transmute::<*mut c_void, DeviceMallocFn>(resolve(
                    handle,
                    library,
                    "platformDeviceMalloc",
                )?),
                device_free: std::mem::transmute::<*mut c_void, DeviceFreeFn>(resolve(
                    handle,
                    library,
                    "platformDeviceFree",
                )?),
                copy_host_to_device: std::mem::transmute::<*mut c_void, CopyHostToDeviceFn>(
                    resolve(handle, library, "platformCopyHostToDevice")?,
                ),
                copy_device_to_host: std::mem::transmute::<*mut c_void, CopyDeviceToHostFn>(
                    resolve(handle, library, "platformCopyDeviceToHost")?,
                ),
                terminate: std::mem::transmute::<*mut c_void, TerminateFn>(resolve(
                    handle,
                    library,
                    "platformTerminate",
                )?),
            })
        }
    }

    fn query_name(&self) -> Option<String> {
        let mut buf = [0 as c_char; 64];
        let _guard = self.lock.lock();
        // SAFETY: buf is writable for buf.len() bytes.
        let status = unsafe { (self.symbols.get_name)(buf.as_mut_ptr(), buf.len()) };
        if status != FLETCHER_STATUS_OK {
            return None;
        }
        buf[buf.len() - 1] = 0;
        // SAFETY: buf is NUL-terminated.
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Some(name.to_string_lossy().into_owned())
    }

    /// Set the argument passed to `platformInit`.
    pub fn set_init_data(&self, data: InitData) {
        *self.init_data.lock() = data;
    }

    fn check(&self, operation: &'static str, status: u64) -> Result<()> {
        if status == FLETCHER_STATUS_OK {
            Ok(())
        } else {
            Err(FletcherError::Status {
                platform: self.name.clone(),
                operation,
                status,
            })
        }
    }
}

fn size_arg(len: usize) -> Result<i64> {
    i64::try_from(len).map_err(|_| FletcherError::SizeMismatch(format!("{} bytes", len)))
}

impl Platform for DylibPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        let mut data = *self.init_data.lock();
        let arg: *mut c_void = match &mut data {
            InitData::None => std::ptr::null_mut(),
            InitData::AwsSim(options) => options as *mut AwsSimInitOptions as *mut c_void,
        };
        let _guard = self.lock.lock();
        // SAFETY: arg is null or points at `data`, alive for the call.
        let status = unsafe { (self.symbols.init)(arg) };
        self.check("init", status)
    }

    fn write_mmio(&self, offset: u64, value: u32) -> Result<()> {
        debug!("{}: MMIO write [{}] = {:#010x}", self.name, offset, value);
        let _guard = self.lock.lock();
        // SAFETY: plain value arguments.
        let status = unsafe { (self.symbols.write_mmio)(offset, value) };
        self.check("write MMIO", status)
    }

    fn read_mmio(&self, offset: u64) -> Result<u32> {
        let mut value = 0u32;
        let _guard = self.lock.lock();
        // SAFETY: value is a valid u32 out-pointer.
        let status = unsafe { (self.symbols.read_mmio)(offset, &mut value) };
        self.check("read MMIO", status)?;
        Ok(value)
    }

    fn device_malloc(&self, size: u64) -> Result<DeviceAddress> {
        let size = i64::try_from(size)
            .map_err(|_| FletcherError::SizeMismatch(format!("{} bytes", size)))?;
        let mut address = 0u64;
        let _guard = self.lock.lock();
        // SAFETY: address is a valid out-pointer.
        let status = unsafe { (self.symbols.device_malloc)(&mut address, size) };
        self.check("device malloc", status)?;
        debug!("{}: device malloc {} bytes at {:#x}", self.name, size, address);
        Ok(address)
    }

    fn device_free(&self, address: DeviceAddress) -> Result<()> {
        let _guard = self.lock.lock();
        // SAFETY: plain value argument.
        let status = unsafe { (self.symbols.device_free)(address) };
        self.check("device free", status)
    }

    fn copy_host_to_device(&self, host: &[u8], device: DeviceAddress) -> Result<()> {
        let size = size_arg(host.len())?;
        let _guard = self.lock.lock();
        // SAFETY: host is readable for `size` bytes.
        let status = unsafe { (self.symbols.copy_host_to_device)(host.as_ptr(), device, size) };
        self.check("copy host to device", status)
    }

    fn copy_device_to_host(&self, device: DeviceAddress, host: &mut [u8]) -> Result<()> {
        let size = size_arg(host.len())?;
        let _guard = self.lock.lock();
        // SAFETY: host is writable for `size` bytes.
        let status =
            unsafe { (self.symbols.copy_device_to_host)(device, host.as_mut_ptr(), size) };
        self.check("copy device to host", status)
    }

    fn terminate(&self) -> Result<()> {
        let _guard = self.lock.lock();
        // SAFETY: the interface accepts a null argument.
        let status = unsafe { (self.symbols.terminate)(std::ptr::null_mut()) };
        self.check("terminate", status)
    }
}

impl Drop for DylibPlatform {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("{}", e);
        }
        // SAFETY: handle came from dlopen and no symbol outlives self.
        unsafe { dlclose(self.handle as *mut c_void) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_naming() {
        assert_eq!(DylibPlatform::library_name("aws"), "libfletcher_aws.so");
        assert_eq!(DylibPlatform::library_name("aws_sim"), "libfletcher_aws_sim.so");
    }

    #[test]
    fn missing_library_is_a_load_error() {
        let err = match DylibPlatform::load("definitely_not_installed") {
            Ok(_) => panic!("loaded a platform that does not exist"),
            Err(e) => e,
        };
        match err {
            FletcherError::Load { library, .. } => {
                assert_eq!(library, "libfletcher_definitely_not_installed.so")
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
