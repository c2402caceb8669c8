use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type AppManifest = AppManifestBuilder<String, String>;

impl AppManifest {
    pub fn build() -> AppManifestBuilder<(), ()> {
        AppManifestBuilder {
            product_id: (),
            version: (),
            friendly_name: String::new(),
            publisher: None,
            executable: PathBuf::new(),
            icon: None,
        }
    }
}

/// Identity of the product being installed.
///
/// `product_id` must stay the same across versions, it is how upgrades are
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManifestBuilder<A, B> {
    pub(crate) product_id: A,
    pub(crate) version: B,
    pub(crate) friendly_name: String,
    pub(crate) publisher: Option<String>,
    /// Main executable, relative to the install directory.
    pub(crate) executable: PathBuf,
    /// Icon file, relative to the install directory.
    pub(crate) icon: Option<PathBuf>,
}

impl<A, B> AppManifestBuilder<A, B> {
    pub fn product_id(self, product_id: impl Into<String>) -> AppManifestBuilder<String, B> {
        AppManifestBuilder {
            product_id: product_id.into(),
            version: self.version,
            friendly_name: self.friendly_name,
            publisher: self.publisher,
            executable: self.executable,
            icon: self.icon,
        }
    }

    pub fn version(self, version: impl Into<String>) -> AppManifestBuilder<A, String> {
        AppManifestBuilder {
            product_id: self.product_id,
            version: version.into(),
            friendly_name: self.friendly_name,
            publisher: self.publisher,
            executable: self.executable,
            icon: self.icon,
        }
    }

    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

impl AppManifest {
    pub fn product_id_str(&self) -> &str {
        &self.product_id
    }

    pub fn version_str(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.friendly_name
    }

    pub fn publisher_name(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn executable_path(&self) -> &std::path::Path {
        &self.executable
    }

    pub fn icon_path(&self) -> Option<&std::path::Path> {
        self.icon.as_deref()
    }
}

/// A single file copied into the install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative to the source directory.
    pub source: PathBuf,
    /// Relative to the install directory. Defaults to the source file name.
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Skip without error when the source is missing.
    #[serde(default)]
    pub optional: bool,
}

/// A directory tree copied recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub source: PathBuf,
    /// Defaults to the source directory name.
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutLocation {
    #[default]
    StartMenu,
    /// Only written when the desktop icon task is selected.
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutEntry {
    pub name: String,
    /// Relative to the install directory.
    pub target: PathBuf,
    #[serde(default)]
    pub location: ShortcutLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub directories: Vec<DirectoryEntry>,
    #[serde(default)]
    pub shortcuts: Vec<ShortcutEntry>,
}

impl FileEntry {
    pub fn destination(&self) -> PathBuf {
        self.destination
            .clone()
            .or_else(|| self.source.file_name().map(PathBuf::from))
            .unwrap_or_else(|| self.source.clone())
    }
}

impl DirectoryEntry {
    pub fn destination(&self) -> PathBuf {
        self.destination
            .clone()
            .or_else(|| self.source.file_name().map(PathBuf::from))
            .unwrap_or_else(|| self.source.clone())
    }
}
