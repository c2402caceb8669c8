use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{config::AppManifest, installer::InstallError, registry::RegistryScope};

pub const INSTALL_LOG_NAME: &str = "uninstall.dat";

/// What an installation created, so the uninstaller can take it away again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallLog {
    pub product_id: String,
    pub version: String,
    pub scope: RegistryScope,
    pub installed_at: String,
    /// Relative to the install directory.
    pub files: Vec<PathBuf>,
    /// Relative to the install directory.
    pub directories: Vec<PathBuf>,
    pub shortcuts: Vec<PathBuf>,
    /// Start menu folders created for the shortcuts.
    pub shortcut_folders: Vec<PathBuf>,
}

impl InstallLog {
    pub fn new(app: &AppManifest, scope: RegistryScope) -> Self {
        Self {
            product_id: app.product_id_str().to_string(),
            version: app.version_str().to_string(),
            scope,
            installed_at: chrono::Local::now().to_rfc3339(),
            files: Vec::new(),
            directories: Vec::new(),
            shortcuts: Vec::new(),
            shortcut_folders: Vec::new(),
        }
    }

    /// Records a file together with every directory above it.
    pub fn record_file(&mut self, relative: &Path) {
        for ancestor in relative.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.record_directory(ancestor);
        }
        if !self.files.iter().any(|file| file == relative) {
            self.files.push(relative.to_path_buf());
        }
    }

    pub fn record_directory(&mut self, relative: &Path) {
        if !self.directories.iter().any(|dir| dir == relative) {
            self.directories.push(relative.to_path_buf());
        }
    }

    pub fn save(&self, install_dir: &Path) -> Result<(), InstallError> {
        let path = install_dir.join(INSTALL_LOG_NAME);
        let bytes = postcard::to_stdvec(self)?;
        fs::write(&path, bytes).map_err(|source| InstallError::io(&path, source))
    }

    pub fn load(install_dir: &Path) -> Result<Self, InstallError> {
        let path = install_dir.join(INSTALL_LOG_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(InstallError::MissingInstallLog(install_dir.to_path_buf()));
            }
            Err(source) => return Err(InstallError::io(&path, source)),
        };
        Ok(postcard::from_bytes(&bytes)?)
    }
}
