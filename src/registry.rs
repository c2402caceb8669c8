use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNINSTALL_ROOT: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall";
pub const UNINSTALL_STRING: &str = "UninstallString";

const SOFTWARE: &str = "Software\\";
const WOW64_NODE: &str = "WOW6432Node\\";

/// Registry hive an installation is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistryScope {
    /// `HKEY_CURRENT_USER`
    #[default]
    User,
    /// `HKEY_LOCAL_MACHINE`
    Machine,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[cfg(windows)]
    #[error("Registry error: {0}")]
    Windows(#[from] windows_result::Error),
    #[error("The registry is only available on Windows")]
    Unsupported,
}

/// Uninstall key for a product identifier.
///
/// The `_is1` suffix matches the key Inno Setup registers, so copies installed
/// by earlier Inno based setups are found under the same identifier.
pub fn uninstall_key(product_id: &str) -> String {
    format!(r"{UNINSTALL_ROOT}\{product_id}_is1")
}

/// Path of `key` in the 32-bit registry view of a 64-bit system.
///
/// Only keys below `Software` are redirected, everything else has no 32-bit
/// view and yields `None`.
pub fn wow64_key(key: &str) -> Option<String> {
    let prefix = key.get(..SOFTWARE.len())?;
    if !prefix.eq_ignore_ascii_case(SOFTWARE) {
        return None;
    }
    let rest = &key[SOFTWARE.len()..];
    if rest
        .get(..WOW64_NODE.len())
        .is_some_and(|node| node.eq_ignore_ascii_case(WOW64_NODE))
    {
        return None;
    }
    Some(format!("{prefix}{WOW64_NODE}{rest}"))
}

/// Read access to the OS package registry.
pub trait RegistryReader {
    fn read_user_scope(&self, key: &str, value: &str) -> Option<String>;
    fn read_machine_scope(&self, key: &str, value: &str) -> Option<String>;

    /// Machine scope in the native view, then in the 32-bit `WOW6432Node`
    /// view where 32-bit setups register on 64-bit Windows.
    fn read_machine_scope_any_view(&self, key: &str, value: &str) -> Option<String> {
        self.read_machine_scope(key, value).or_else(|| {
            let key = wow64_key(key)?;
            self.read_machine_scope(&key, value)
        })
    }

    fn read_scope(&self, scope: RegistryScope, key: &str, value: &str) -> Option<String> {
        match scope {
            RegistryScope::User => self.read_user_scope(key, value),
            RegistryScope::Machine => self.read_machine_scope(key, value),
        }
    }
}

/// Write access to the OS package registry.
pub trait RegistryWriter {
    fn write_strings(
        &mut self,
        scope: RegistryScope,
        key: &str,
        values: &[(&str, String)],
    ) -> Result<(), RegistryError>;

    /// Removes `key` and everything below it. A missing key is not an error.
    fn delete_key(&mut self, scope: RegistryScope, key: &str) -> Result<(), RegistryError>;
}

impl<T: RegistryReader + ?Sized> RegistryReader for &T {
    fn read_user_scope(&self, key: &str, value: &str) -> Option<String> {
        (**self).read_user_scope(key, value)
    }

    fn read_machine_scope(&self, key: &str, value: &str) -> Option<String> {
        (**self).read_machine_scope(key, value)
    }
}

impl<T: RegistryWriter + ?Sized> RegistryWriter for &mut T {
    fn write_strings(
        &mut self,
        scope: RegistryScope,
        key: &str,
        values: &[(&str, String)],
    ) -> Result<(), RegistryError> {
        (**self).write_strings(scope, key, values)
    }

    fn delete_key(&mut self, scope: RegistryScope, key: &str) -> Result<(), RegistryError> {
        (**self).delete_key(scope, key)
    }
}

/// The registry of the machine we are running on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRegistry;

#[cfg(windows)]
mod system {
    use windows_registry::{CURRENT_USER, Key, LOCAL_MACHINE};
    use windows_result::HRESULT;

    use super::{RegistryError, RegistryReader, RegistryScope, RegistryWriter, SystemRegistry};

    const ERROR_FILE_NOT_FOUND: u32 = 2;

    fn hive(scope: RegistryScope) -> &'static Key {
        match scope {
            RegistryScope::User => CURRENT_USER,
            RegistryScope::Machine => LOCAL_MACHINE,
        }
    }

    fn read(scope: RegistryScope, key: &str, value: &str) -> Option<String> {
        match hive(scope).open(key).and_then(|key| key.get_string(value)) {
            Ok(value) => Some(value),
            Err(err) => {
                log::debug!("No {value} under {scope:?}\\{key}: {err}");
                None
            }
        }
    }

    impl RegistryReader for SystemRegistry {
        fn read_user_scope(&self, key: &str, value: &str) -> Option<String> {
            read(RegistryScope::User, key, value)
        }

        fn read_machine_scope(&self, key: &str, value: &str) -> Option<String> {
            read(RegistryScope::Machine, key, value)
        }
    }

    impl RegistryWriter for SystemRegistry {
        fn write_strings(
            &mut self,
            scope: RegistryScope,
            key: &str,
            values: &[(&str, String)],
        ) -> Result<(), RegistryError> {
            let key = hive(scope).create(key)?;
            for (name, value) in values {
                key.set_string(*name, value.as_str())?;
            }
            Ok(())
        }

        fn delete_key(&mut self, scope: RegistryScope, key: &str) -> Result<(), RegistryError> {
            match hive(scope).remove_tree(key) {
                Ok(()) => Ok(()),
                Err(err) if err.code() == HRESULT::from_win32(ERROR_FILE_NOT_FOUND) => Ok(()),
                Err(err) => Err(err.into()),
            }
        }
    }
}

#[cfg(not(windows))]
impl RegistryReader for SystemRegistry {
    fn read_user_scope(&self, _key: &str, _value: &str) -> Option<String> {
        None
    }

    fn read_machine_scope(&self, _key: &str, _value: &str) -> Option<String> {
        None
    }
}

#[cfg(not(windows))]
impl RegistryWriter for SystemRegistry {
    fn write_strings(
        &mut self,
        _scope: RegistryScope,
        _key: &str,
        _values: &[(&str, String)],
    ) -> Result<(), RegistryError> {
        Err(RegistryError::Unsupported)
    }

    fn delete_key(&mut self, _scope: RegistryScope, _key: &str) -> Result<(), RegistryError> {
        Err(RegistryError::Unsupported)
    }
}

/// In-memory registry used by the tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryRegistry {
    keys: std::collections::HashMap<
        (RegistryScope, String),
        std::collections::BTreeMap<String, String>,
    >,
}

#[cfg(test)]
impl MemoryRegistry {
    pub(crate) fn with_value(
        mut self,
        scope: RegistryScope,
        key: &str,
        value: &str,
        data: &str,
    ) -> Self {
        self.keys
            .entry((scope, key.to_string()))
            .or_default()
            .insert(value.to_string(), data.to_string());
        self
    }

    pub(crate) fn contains_key(&self, scope: RegistryScope, key: &str) -> bool {
        self.keys.contains_key(&(scope, key.to_string()))
    }
}

#[cfg(test)]
impl RegistryReader for MemoryRegistry {
    fn read_user_scope(&self, key: &str, value: &str) -> Option<String> {
        self.keys
            .get(&(RegistryScope::User, key.to_string()))?
            .get(value)
            .cloned()
    }

    fn read_machine_scope(&self, key: &str, value: &str) -> Option<String> {
        self.keys
            .get(&(RegistryScope::Machine, key.to_string()))?
            .get(value)
            .cloned()
    }
}

#[cfg(test)]
impl RegistryWriter for MemoryRegistry {
    fn write_strings(
        &mut self,
        scope: RegistryScope,
        key: &str,
        values: &[(&str, String)],
    ) -> Result<(), RegistryError> {
        let entry = self.keys.entry((scope, key.to_string())).or_default();
        for (name, value) in values {
            entry.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    fn delete_key(&mut self, scope: RegistryScope, key: &str) -> Result<(), RegistryError> {
        self.keys.remove(&(scope, key.to_string()));
        Ok(())
    }
}
