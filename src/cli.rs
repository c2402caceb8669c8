use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::{
    config::{ConfigError, InstallOptions, SetupConfig, load_setup_config},
    guard::UpgradeGuard,
    installer::{InstallError, ManifestInstaller, UNINSTALLER_NAME},
    platform,
    post_embed::copy_executable,
    process::{SystemProcessRunner, spawn_detached},
    registry::{RegistryScope, SystemRegistry},
    sequence::run_install_sequence,
    setup_creator::{EmbedError, create_setup, read_embedded_payload},
    uninstall::uninstall,
};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error(transparent)]
    InstallError(#[from] InstallError),
    #[error(transparent)]
    EmbedError(#[from] EmbedError),
    #[error("Machine wide installation requires admin access!")]
    AdminRequired,
    #[error("Couldn't locate the running executable: {0}")]
    CurrentExe(std::io::Error),
    #[error("Couldn't prepare the staging directory: {0}")]
    Staging(std::io::Error),
    #[error("This executable carries no setup payload, use `create` or pass --manifest")]
    MissingPayload,
}

#[derive(Debug, clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Build a self contained setup executable from a Cargo.toml
    Create {
        /// Filename of the resulting setup
        #[arg(short = 'o', long = "out")]
        setup_name: Option<PathBuf>,
        /// Path to the Cargo.toml carrying [package.metadata.gama_setup]
        #[arg(short = 'm', long = "manifest", default_value = "./Cargo.toml")]
        cargo_manifest_path: PathBuf,
        /// Directory the manifest's source paths are relative to.
        /// Defaults to the Cargo.toml directory.
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
    /// Install the application packed into this executable
    Install {
        /// Install from a Cargo.toml instead of the packed payload
        #[arg(short = 'm', long = "manifest")]
        cargo_manifest_path: Option<PathBuf>,
        /// Directory the manifest's source paths are relative to.
        /// Defaults to the Cargo.toml directory.
        #[arg(short, long, requires = "cargo_manifest_path")]
        source: Option<PathBuf>,
        /// Install location
        #[arg(short = 'd', long = "dir")]
        install_dir: Option<PathBuf>,
        /// Create a desktop shortcut
        #[arg(long)]
        desktop_icon: bool,
        /// Start the application once installation finished
        #[arg(long)]
        launch: bool,
        /// Install for all users
        #[arg(long, conflicts_with = "user")]
        machine: bool,
        /// Install for the current user only
        #[arg(long)]
        user: bool,
        /// Don't show progress
        #[arg(long)]
        silent: bool,
        #[arg(long, hide = true)]
        no_restart: bool,
        #[arg(long, hide = true)]
        suppress_msg_boxes: bool,
    },
    /// Remove an installation
    Uninstall {
        /// Installation to remove. Defaults to the directory of this executable.
        #[arg(short = 'd', long = "dir")]
        install_dir: Option<PathBuf>,
        #[arg(long)]
        silent: bool,
        #[arg(long)]
        no_restart: bool,
        #[arg(long)]
        suppress_msg_boxes: bool,
    },
}

/// Translates Inno style switches into long flags.
///
/// Without a subcommand, a setup runs `install` and an uninstaller (any
/// `unins*` executable, started as `unins000.exe /SILENT ...` by the next
/// version) runs `uninstall`.
pub fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args = args.into_iter();
    let Some(program) = args.next() else {
        return Vec::new();
    };

    let mut normalized = vec![program.clone()];
    let mut starts_with_switch = None;
    for arg in args {
        let translated = translate_switch(&arg);
        starts_with_switch.get_or_insert(translated.is_some());
        normalized.push(translated.map(OsString::from).unwrap_or(arg));
    }

    if starts_with_switch.unwrap_or(true) {
        let command = if is_uninstaller(&program) {
            "uninstall"
        } else {
            "install"
        };
        normalized.insert(1, OsString::from(command));
    }
    normalized
}

fn is_uninstaller(program: &OsString) -> bool {
    Path::new(program)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.to_ascii_lowercase().starts_with("unins"))
}

fn translate_switch(arg: &OsString) -> Option<&'static str> {
    let arg = arg.to_str()?;
    if !arg.starts_with('/') {
        return None;
    }
    match arg.to_ascii_uppercase().as_str() {
        "/SILENT" | "/VERYSILENT" => Some("--silent"),
        "/NORESTART" => Some("--no-restart"),
        "/SUPPRESSMSGBOXES" => Some("--suppress-msg-boxes"),
        _ => None,
    }
}

pub fn run(args: Args) -> Result<(), SetupError> {
    match args.command {
        Command::Create {
            setup_name,
            cargo_manifest_path,
            source,
        } => {
            let config = load_setup_config(&cargo_manifest_path)?;
            let source_dir = source.unwrap_or_else(|| manifest_dir(&cargo_manifest_path));
            let setup_name = setup_name.unwrap_or_else(|| default_setup_name(&config));
            let template = std::env::current_exe().map_err(SetupError::CurrentExe)?;

            println!(
                "Building setup for:\n{}\n{}",
                config.app.name(),
                config.app.version_str()
            );
            let embedded = create_setup(&template, &setup_name, &config, &source_dir)?;
            println!(
                "Setup with {} bytes of payload saved to {}",
                embedded.unpacked_size,
                setup_name.display()
            );
            Ok(())
        }
        Command::Install {
            cargo_manifest_path,
            source,
            install_dir,
            desktop_icon,
            launch,
            machine,
            user,
            silent,
            ..
        } => {
            let current_exe = std::env::current_exe().map_err(SetupError::CurrentExe)?;
            let staging = StagingDir::new().map_err(SetupError::Staging)?;

            let (config, source_dir) = match cargo_manifest_path {
                Some(path) => {
                    let config = load_setup_config(&path)?;
                    (config, source.unwrap_or_else(|| manifest_dir(&path)))
                }
                None => {
                    let mut payload =
                        read_embedded_payload(&current_exe)?.ok_or(SetupError::MissingPayload)?;
                    let payload_dir = staging.path().join("payload");
                    payload.extract(&payload_dir)?;
                    (SetupConfig::from(payload.config), payload_dir)
                }
            };

            let scope = if machine {
                RegistryScope::Machine
            } else if user {
                RegistryScope::User
            } else {
                platform::default_scope()
            };
            if scope == RegistryScope::Machine && !platform::elevated().unwrap_or(false) {
                return Err(SetupError::AdminRequired);
            }

            let install_dir = match install_dir {
                Some(dir) => dir,
                None => platform::default_install_dir(scope, config.app.name())?,
            };

            let options = InstallOptions {
                shortcut_dirs: platform::shortcut_dirs(scope, config.app.name())?,
                install_dir,
                source_dir,
                scope,
                desktop_icon,
                launch_after_install: launch,
            };

            println!(
                "Installing {} {}",
                config.app.name(),
                config.app.version_str()
            );

            // The installed uninstaller is this executable without its payload.
            let uninstaller = staging.path().join(UNINSTALLER_NAME);
            copy_executable(&current_exe, &uninstaller).map_err(SetupError::Staging)?;

            let executable = options.install_dir.join(config.app.executable_path());
            let mut guard = UpgradeGuard::new(
                config.app.product_id_str(),
                SystemRegistry,
                SystemProcessRunner,
            );
            let mut installer = ManifestInstaller::new(config, options, SystemRegistry)
                .with_progress(progress_bar(silent))
                .with_uninstaller(uninstaller);

            let report = run_install_sequence(&mut guard, &mut installer)?;
            log::debug!("Install sequence: {:?}", report.states);

            let options = installer.options();
            println!("Installed to {}", options.install_dir.display());

            if options.launch_after_install {
                if let Err(err) = spawn_detached(&executable, &options.install_dir) {
                    log::warn!("{err}");
                }
            }
            Ok(())
        }
        Command::Uninstall {
            install_dir,
            silent,
            no_restart,
            suppress_msg_boxes,
        } => {
            log::debug!(
                "Uninstall switches: silent={silent} no_restart={no_restart} \
                 suppress_msg_boxes={suppress_msg_boxes}"
            );
            let install_dir = match install_dir {
                Some(dir) => dir,
                None => {
                    let exe = std::env::current_exe().map_err(SetupError::CurrentExe)?;
                    exe.parent().map(Path::to_path_buf).unwrap_or_default()
                }
            };

            let report = uninstall(&install_dir, &mut SystemRegistry)?;
            log::info!(
                "Removed {} files, {} left behind",
                report.removed_files,
                report.leftover.len()
            );
            Ok(())
        }
    }
}

fn manifest_dir(cargo_manifest_path: &Path) -> PathBuf {
    match cargo_manifest_path.parent() {
        Some(parent) if parent != Path::new("") => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn default_setup_name(config: &SetupConfig) -> PathBuf {
    let name: String = config
        .app
        .name()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    PathBuf::from(format!(
        "{name}-Setup-v{}{}",
        config.app.version_str(),
        std::env::consts::EXE_SUFFIX
    ))
}

/// Scratch directory for the unpacked payload, removed again on drop.
struct StagingDir(PathBuf);

impl StagingDir {
    fn new() -> Result<Self, std::io::Error> {
        let path = std::env::temp_dir().join(format!("gama-setup-{}", std::process::id()));
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.0) {
            log::debug!("Couldn't remove {}: {}", self.0.display(), err);
        }
    }
}

fn progress_bar(silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(0).with_style(style)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::installer::tests::setup_config;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn inno_switches_select_uninstall() {
        let normalized = normalize_args(args(&[
            r"C:\Gama\unins000.exe",
            "/SILENT",
            "/NORESTART",
            "/SUPPRESSMSGBOXES",
        ]));
        assert_eq!(
            normalized,
            args(&[
                r"C:\Gama\unins000.exe",
                "uninstall",
                "--silent",
                "--no-restart",
                "--suppress-msg-boxes",
            ])
        );

        let parsed = Args::try_parse_from(normalized).expect("must parse");
        assert!(matches!(
            parsed.command,
            Command::Uninstall {
                silent: true,
                no_restart: true,
                suppress_msg_boxes: true,
                install_dir: None,
            }
        ));
    }

    #[test]
    fn inno_switches_on_a_setup_select_install() {
        let normalized = normalize_args(args(&["GamaLauncher-Setup-v2.1.0.exe", "/VERYSILENT"]));
        assert_eq!(
            normalized,
            args(&["GamaLauncher-Setup-v2.1.0.exe", "install", "--silent"])
        );

        let parsed = Args::try_parse_from(normalized).expect("must parse");
        assert!(matches!(
            parsed.command,
            Command::Install {
                silent: true,
                cargo_manifest_path: None,
                ..
            }
        ));
    }

    #[test]
    fn bare_executable_picks_a_command_from_its_name() {
        assert_eq!(
            normalize_args(args(&["unins000"])),
            args(&["unins000", "uninstall"])
        );
        assert_eq!(
            normalize_args(args(&["GamaLauncher-Setup.exe"])),
            args(&["GamaLauncher-Setup.exe", "install"])
        );
        assert_eq!(
            normalize_args(args(&["gama_setup", "--help"])),
            args(&["gama_setup", "--help"])
        );
    }

    #[test]
    fn install_keeps_its_subcommand() {
        let normalized = normalize_args(args(&[
            "gama_setup",
            "install",
            "/verysilent",
            "--desktop-icon",
        ]));
        assert_eq!(
            normalized,
            args(&["gama_setup", "install", "--silent", "--desktop-icon"])
        );

        let parsed = Args::try_parse_from(normalized).expect("must parse");
        let Command::Install {
            silent,
            desktop_icon,
            launch,
            cargo_manifest_path,
            ..
        } = parsed.command
        else {
            panic!("expected install");
        };
        assert!(silent && desktop_icon && !launch);
        assert_eq!(cargo_manifest_path, None);
    }

    #[test]
    fn unknown_slash_arguments_pass_through() {
        assert_eq!(
            normalize_args(args(&["gama_setup", "install", "--dir", "/opt/gama"])),
            args(&["gama_setup", "install", "--dir", "/opt/gama"])
        );
    }

    #[test]
    fn machine_and_user_conflict() {
        let result = Args::try_parse_from(["gama_setup", "install", "--machine", "--user"]);
        assert!(result.is_err());
    }

    #[test]
    fn source_needs_a_manifest_when_installing() {
        let result = Args::try_parse_from(["gama_setup", "install", "--source", "dist"]);
        assert!(result.is_err());

        let parsed = Args::try_parse_from([
            "gama_setup",
            "install",
            "--manifest",
            "launcher/Cargo.toml",
            "--source",
            "dist",
        ])
        .expect("must parse");
        assert!(matches!(
            parsed.command,
            Command::Install {
                cargo_manifest_path: Some(_),
                source: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn create_defaults() {
        let parsed = Args::try_parse_from(["gama_setup", "create"]).expect("must parse");
        let Command::Create {
            setup_name,
            cargo_manifest_path,
            source,
        } = parsed.command
        else {
            panic!("expected create");
        };
        assert_eq!(setup_name, None);
        assert_eq!(cargo_manifest_path, PathBuf::from("./Cargo.toml"));
        assert_eq!(source, None);
        assert_eq!(manifest_dir(&cargo_manifest_path), PathBuf::from("."));
        assert_eq!(
            manifest_dir(Path::new("launcher/Cargo.toml")),
            PathBuf::from("launcher")
        );
    }

    #[test]
    fn setup_name_follows_product_and_version() {
        assert_eq!(
            default_setup_name(&setup_config()),
            PathBuf::from(format!(
                "GamaLauncher-Setup-v2.1.0{}",
                std::env::consts::EXE_SUFFIX
            ))
        );
    }
}
