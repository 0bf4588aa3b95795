use std::ffi::OsString;
use std::io;
use std::path::Path;

/// Environment variable the dynamic loader searches for libraries
pub const SEARCH_PATH_VAR: &str = "PATH";

/// The process-wide state the bootstrap writes to
#[cfg_attr(test, mockall::automock)]
pub trait LoaderEnvironment {
    /// Current executable search path
    fn search_path(&self) -> Option<OsString>;

    fn set_search_path(&mut self, value: OsString);

    /// Whether explicit directory registration exists on this system
    fn supports_directory_registration(&self) -> bool;

    fn register_directory(&mut self, dir: &Path) -> io::Result<()>;
}

/// The real process environment
#[derive(Debug, Default)]
pub struct ProcessLoaderEnvironment;

impl LoaderEnvironment for ProcessLoaderEnvironment {
    fn search_path(&self) -> Option<OsString> {
        std::env::var_os(SEARCH_PATH_VAR)
    }

    fn set_search_path(&mut self, value: OsString) {
        // SAFETY: the bootstrap runs during single-threaded startup, before
        // any runtime thread that could read the environment exists.
        unsafe { std::env::set_var(SEARCH_PATH_VAR, value) }
    }

    fn supports_directory_registration(&self) -> bool {
        #[cfg(windows)]
        {
            win::add_dll_directory().is_some()
        }
        #[cfg(not(windows))]
        {
            false
        }
    }

    fn register_directory(&mut self, dir: &Path) -> io::Result<()> {
        #[cfg(windows)]
        {
            win::register(dir)
        }
        #[cfg(not(windows))]
        {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot register {}: no directory registration on this platform", dir.display()),
            ))
        }
    }
}

#[cfg(windows)]
mod win {
    use std::ffi::c_void;
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    type AddDllDirectoryFn = unsafe extern "system" fn(*const u16) -> *mut c_void;

    #[link(name = "kernel32")]
    unsafe extern "system" {
        fn GetModuleHandleW(module_name: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, proc_name: *const u8) -> *mut c_void;
    }

    fn wide(s: &std::ffi::OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    /// `AddDllDirectory`, looked up at runtime since it is missing on
    /// Windows 7 without KB2533623
    pub fn add_dll_directory() -> Option<AddDllDirectoryFn> {
        let kernel32 = wide(std::ffi::OsStr::new("kernel32.dll"));
        // SAFETY: both arguments are valid NUL-terminated strings.
        unsafe {
            let module = GetModuleHandleW(kernel32.as_ptr());
            if module.is_null() {
                return None;
            }
            let proc = GetProcAddress(module, c"AddDllDirectory".as_ptr().cast());
            if proc.is_null() {
                None
            } else {
                Some(std::mem::transmute::<*mut c_void, AddDllDirectoryFn>(proc))
            }
        }
    }

    pub fn register(dir: &Path) -> io::Result<()> {
        let add = add_dll_directory().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "AddDllDirectory is not available")
        })?;
        let path = wide(dir.as_os_str());
        // SAFETY: `path` is NUL-terminated and outlives the call. The returned
        // cookie is never released.
        let cookie = unsafe { add(path.as_ptr()) };
        if cookie.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
