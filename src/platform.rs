use std::path::PathBuf;

use crate::{
    config::{ConfigError, ShortcutDirs},
    registry::RegistryScope,
};

/// Scope used when nothing was requested: machine wide when running elevated.
pub fn default_scope() -> RegistryScope {
    match elevated() {
        Ok(true) => RegistryScope::Machine,
        Ok(false) => RegistryScope::User,
        Err(err) => {
            log::warn!("Error checking admin privileges: {}", err);
            RegistryScope::User
        }
    }
}

/// `{autopf}\<name>`: Program Files for machine installs, the per-user
/// Programs folder otherwise.
pub fn default_install_dir(
    scope: RegistryScope,
    friendly_name: &str,
) -> Result<PathBuf, ConfigError> {
    let root = match scope {
        RegistryScope::Machine => env_dir("ProgramFiles")?,
        RegistryScope::User => env_dir("LOCALAPPDATA")?.join("Programs"),
    };
    Ok(root.join(friendly_name))
}

pub fn shortcut_dirs(
    scope: RegistryScope,
    friendly_name: &str,
) -> Result<ShortcutDirs, ConfigError> {
    let (programs, desktop) = match scope {
        RegistryScope::Machine => (env_dir("ProgramData")?, env_dir("PUBLIC")?.join("Desktop")),
        RegistryScope::User => (env_dir("APPDATA")?, env_dir("USERPROFILE")?.join("Desktop")),
    };
    Ok(ShortcutDirs {
        start_menu: programs
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs")
            .join(friendly_name),
        desktop,
    })
}

fn env_dir(name: &'static str) -> Result<PathBuf, ConfigError> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingEnvironment(name))
}

#[cfg(windows)]
pub use self::windows_impl::{attach_console, elevated};

#[cfg(windows)]
mod windows_impl {
    use windows::Win32::{
        Foundation::{CloseHandle, HANDLE},
        Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation},
        System::Console::{ATTACH_PARENT_PROCESS, AttachConsole},
        System::Threading::{GetCurrentProcess, OpenProcessToken},
    };

    /// Lets log output reach the console the setup was started from.
    pub fn attach_console() -> Result<(), windows_result::Error> {
        unsafe { AttachConsole(ATTACH_PARENT_PROCESS) }
    }

    pub fn elevated() -> Result<bool, windows_result::Error> {
        Ok(get_elevated_info()?.TokenIsElevated != 0)
    }

    fn get_elevated_info() -> Result<TOKEN_ELEVATION, windows_result::Error> {
        let token = get_process_token()?;
        let mut info: TOKEN_ELEVATION = TOKEN_ELEVATION::default();
        let mut n = 0;
        let result = unsafe {
            GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut info as *mut _ as *mut std::ffi::c_void),
                size_of::<TOKEN_ELEVATION>() as u32,
                &mut n,
            )
        };
        let _ = unsafe { CloseHandle(token) };
        result?;
        Ok(info)
    }

    fn get_process_token() -> Result<HANDLE, windows_result::Error> {
        let current_process = unsafe { GetCurrentProcess() };
        let mut token = HANDLE::default();
        unsafe { OpenProcessToken(current_process, TOKEN_QUERY, &mut token) }?;
        Ok(token)
    }
}

#[cfg(not(windows))]
pub fn attach_console() -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(not(windows))]
pub fn elevated() -> Result<bool, std::io::Error> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_are_named() {
        let err = env_dir("GAMA_SETUP_SURELY_UNSET_VARIABLE").expect_err("must be unset");
        assert!(matches!(
            err,
            ConfigError::MissingEnvironment("GAMA_SETUP_SURELY_UNSET_VARIABLE")
        ));
    }
}
