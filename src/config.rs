use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::registry::RegistryScope;

mod manifest;
pub use manifest::{
    AppManifest, AppManifestBuilder, DirectoryEntry, FileEntry, PackageManifest, ShortcutEntry,
    ShortcutLocation,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cargo.toml error: {0}")]
    CargoTomlError(#[from] cargo_toml::Error),
    #[error("Cargo.toml has no [package] section")]
    MissingPackage,
    #[error("Cargo.toml has no [package.metadata.gama_setup] table")]
    MissingMetadata,
    #[error("Invalid product id {0:?}")]
    InvalidProductId(String),
    #[error("Missing {0} for the default install location")]
    MissingEnvironment(&'static str),
}

#[derive(Deserialize, Clone, Debug)]
struct Metadata {
    gama_setup: Option<SetupMetadata>,
}

#[derive(Deserialize, Clone, Debug)]
struct SetupMetadata {
    product_id: String,
    friendly_name: Option<String>,
    publisher: Option<String>,
    executable: PathBuf,
    icon: Option<PathBuf>,
    #[serde(flatten)]
    package: PackageManifest,
}

/// Everything read from `[package.metadata.gama_setup]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfig {
    pub app: AppManifest,
    pub package: PackageManifest,
}

/// Choices made for a single installation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub install_dir: PathBuf,
    pub source_dir: PathBuf,
    pub scope: RegistryScope,
    pub shortcut_dirs: ShortcutDirs,
    pub desktop_icon: bool,
    pub launch_after_install: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutDirs {
    pub start_menu: PathBuf,
    pub desktop: PathBuf,
}

pub fn load_setup_config(cargo_manifest_path: &Path) -> Result<SetupConfig, ConfigError> {
    let cargo_manifest =
        cargo_toml::Manifest::<Metadata>::from_path_with_metadata(cargo_manifest_path)?;
    setup_config_from_manifest(cargo_manifest)
}

pub fn parse_setup_config(cargo_toml: &str) -> Result<SetupConfig, ConfigError> {
    let cargo_manifest =
        cargo_toml::Manifest::<Metadata>::from_slice_with_metadata(cargo_toml.as_bytes())?;
    setup_config_from_manifest(cargo_manifest)
}

fn setup_config_from_manifest(
    cargo_manifest: cargo_toml::Manifest<Metadata>,
) -> Result<SetupConfig, ConfigError> {
    let package = cargo_manifest
        .package
        .as_ref()
        .ok_or(ConfigError::MissingPackage)?;
    let version = package.version.get()?.clone();
    let metadata = package
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.gama_setup.clone())
        .ok_or(ConfigError::MissingMetadata)?;

    validate_product_id(&metadata.product_id)?;

    let mut app = AppManifest::build()
        .product_id(metadata.product_id)
        .version(version)
        .friendly_name(metadata.friendly_name.unwrap_or_else(|| package.name.clone()))
        .executable(metadata.executable);
    if let Some(publisher) = metadata.publisher {
        app = app.publisher(publisher);
    }
    if let Some(icon) = metadata.icon {
        app = app.icon(icon);
    }

    Ok(SetupConfig {
        app,
        package: metadata.package,
    })
}

/// The id becomes part of a registry key path, so separators are rejected.
fn validate_product_id(product_id: &str) -> Result<(), ConfigError> {
    if product_id.trim().is_empty() || product_id.contains(['\\', '/']) {
        return Err(ConfigError::InvalidProductId(product_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARGO_TOML: &str = r#"
[package]
name = "gama-launcher"
version = "2.1.0"

[package.metadata.gama_setup]
product_id = "{8F3A2C1B-5D4E-4F6A-9B7C-1E2D3F4A5B6C}"
friendly_name = "Gama Launcher"
publisher = "Gama"
executable = "GamaLauncher.exe"
icon = "icon.ico"

[[package.metadata.gama_setup.files]]
source = "dist/GamaLauncher.exe"

[[package.metadata.gama_setup.files]]
source = "server_list.json"
optional = true

[[package.metadata.gama_setup.directories]]
source = "mods"

[[package.metadata.gama_setup.shortcuts]]
name = "Gama Launcher"
target = "GamaLauncher.exe"

[[package.metadata.gama_setup.shortcuts]]
name = "Gama Launcher"
target = "GamaLauncher.exe"
location = "desktop"
"#;

    #[test]
    fn parses_setup_metadata() {
        let config = parse_setup_config(CARGO_TOML).expect("must parse");

        assert_eq!(
            config.app.product_id_str(),
            "{8F3A2C1B-5D4E-4F6A-9B7C-1E2D3F4A5B6C}"
        );
        assert_eq!(config.app.version_str(), "2.1.0");
        assert_eq!(config.app.name(), "Gama Launcher");
        assert_eq!(config.app.publisher_name(), Some("Gama"));
        assert_eq!(config.app.icon_path(), Some(Path::new("icon.ico")));

        assert_eq!(config.package.files.len(), 2);
        assert!(!config.package.files[0].optional);
        assert!(config.package.files[1].optional);
        assert_eq!(config.package.directories[0].source, PathBuf::from("mods"));
        assert_eq!(
            config.package.shortcuts[0].location,
            ShortcutLocation::StartMenu
        );
        assert_eq!(config.package.shortcuts[1].location, ShortcutLocation::Desktop);
    }

    #[test]
    fn friendly_name_defaults_to_package_name() {
        let raw = r#"
[package]
name = "gama-launcher"
version = "2.1.0"

[package.metadata.gama_setup]
product_id = "{GAMA}"
executable = "GamaLauncher.exe"
"#;
        let config = parse_setup_config(raw).expect("must parse");
        assert_eq!(config.app.name(), "gama-launcher");
        assert!(config.package.files.is_empty());
    }

    #[test]
    fn missing_metadata_is_reported() {
        let raw = "[package]\nname = \"plain\"\nversion = \"0.1.0\"\n";
        let err = parse_setup_config(raw).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingMetadata));
    }

    #[test]
    fn product_id_with_separator_is_rejected() {
        let raw = r#"
[package]
name = "gama-launcher"
version = "2.1.0"

[package.metadata.gama_setup]
product_id = "Gama\\Launcher"
executable = "GamaLauncher.exe"
"#;
        let err = parse_setup_config(raw).expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidProductId(_)));
    }
}
