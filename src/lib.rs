pub mod cli;
pub mod config;
pub mod guard;
pub mod installer;
pub mod link_file;
pub mod platform;
pub mod post_embed;
pub mod process;
pub mod registry;
pub mod sequence;
pub mod setup_creator;
pub mod uninstall;

pub use config::{AppManifest, InstallOptions, PackageManifest, SetupConfig};
pub use guard::{UninstallOutcome, UpgradeGuard};
pub use installer::{InstallError, ManifestInstaller};
pub use sequence::{FileInstaller, InstallReport, InstallState, run_install_sequence};
pub use setup_creator::{EmbeddedConfig, create_setup, read_embedded_payload};
