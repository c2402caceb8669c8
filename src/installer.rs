use std::{
    fs, io,
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use thiserror::Error;

use crate::{
    config::{AppManifest, InstallOptions, PackageManifest, SetupConfig, ShortcutLocation},
    link_file::{ShellLink, save_link},
    registry::{RegistryError, RegistryWriter, UNINSTALL_STRING, uninstall_key},
    sequence::FileInstaller,
};

pub(crate) mod files;
pub mod install_log;

pub use install_log::{INSTALL_LOG_NAME, InstallLog};

/// File name of the uninstaller placed next to the installed files.
pub const UNINSTALLER_NAME: &str = "unins000.exe";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("IO error at {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Missing source {}", .0.display())]
    MissingSource(PathBuf),
    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),
    #[error("Install log error: Postcard error: {0}")]
    PostcardError(#[from] postcard::Error),
    #[error("No installation found in {}", .0.display())]
    MissingInstallLog(PathBuf),
}

impl InstallError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        InstallError::IoError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Installs the contents of a [`PackageManifest`] and registers the result
/// with the OS package registry.
pub struct ManifestInstaller<Registry> {
    app: AppManifest,
    package: PackageManifest,
    options: InstallOptions,
    registry: Registry,
    uninstaller: Option<PathBuf>,
    progress: ProgressBar,
    log: InstallLog,
}

impl<Registry> ManifestInstaller<Registry>
where
    Registry: RegistryWriter,
{
    pub fn new(config: SetupConfig, options: InstallOptions, registry: Registry) -> Self {
        Self {
            log: InstallLog::new(&config.app, options.scope),
            app: config.app,
            package: config.package,
            options,
            registry,
            uninstaller: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Binary copied to [`UNINSTALLER_NAME`] inside the install directory.
    pub fn with_uninstaller(mut self, uninstaller: impl Into<PathBuf>) -> Self {
        self.uninstaller = Some(uninstaller.into());
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    pub fn install_log(&self) -> &InstallLog {
        &self.log
    }

    pub fn into_registry(self) -> Registry {
        self.registry
    }

    fn register_uninstall_entry(&mut self) -> Result<(), InstallError> {
        let install_dir = &self.options.install_dir;
        let uninstaller = install_dir.join(UNINSTALLER_NAME);
        if !uninstaller.is_file() {
            log::warn!(
                "{} does not exist, the registered uninstaller will not start",
                uninstaller.display()
            );
        }

        let mut values = vec![
            ("DisplayName", self.app.name().to_string()),
            ("DisplayVersion", self.app.version_str().to_string()),
            ("InstallLocation", install_dir.display().to_string()),
            (UNINSTALL_STRING, format!("\"{}\"", uninstaller.display())),
            (
                "QuietUninstallString",
                format!("\"{}\" /SILENT", uninstaller.display()),
            ),
            (
                "InstallDate",
                chrono::Local::now().format("%Y%m%d").to_string(),
            ),
        ];
        if let Some(publisher) = self.app.publisher_name() {
            values.push(("Publisher", publisher.to_string()));
        }
        if let Some(icon) = self.app.icon_path() {
            values.push(("DisplayIcon", install_dir.join(icon).display().to_string()));
        }

        let key = uninstall_key(self.app.product_id_str());
        log::info!("Registering {:?}\\{}", self.options.scope, key);
        self.registry
            .write_strings(self.options.scope, &key, &values)?;
        Ok(())
    }
}

impl<Registry> FileInstaller for ManifestInstaller<Registry>
where
    Registry: RegistryWriter,
{
    fn install_files(&mut self) -> Result<(), InstallError> {
        let install_dir = self.options.install_dir.clone();
        let source_dir = self.options.source_dir.clone();
        fs::create_dir_all(&install_dir).map_err(|err| InstallError::io(&install_dir, err))?;

        log::info!("Installing {} into {}", self.app.name(), install_dir.display());
        self.progress
            .set_length((self.package.files.len() + self.package.directories.len()) as u64);

        for entry in &self.package.files {
            self.progress.set_message(entry.source.display().to_string());
            files::copy_file_entry(&source_dir, &install_dir, entry, &mut self.log)?;
            self.progress.inc(1);
        }
        for entry in &self.package.directories {
            self.progress.set_message(entry.source.display().to_string());
            files::copy_directory_entry(&source_dir, &install_dir, entry, &mut self.log)?;
            self.progress.inc(1);
        }

        if let Some(uninstaller) = &self.uninstaller {
            let destination = install_dir.join(UNINSTALLER_NAME);
            if same_file(uninstaller, &destination) {
                self.log.record_file(Path::new(UNINSTALLER_NAME));
            } else {
                files::copy_file(
                    uninstaller,
                    &install_dir,
                    Path::new(UNINSTALLER_NAME),
                    &mut self.log,
                )?;
            }
        }

        self.progress.finish_and_clear();
        self.log.save(&install_dir)?;
        self.register_uninstall_entry()
    }

    fn register_shortcuts(&mut self) -> Result<(), InstallError> {
        let install_dir = &self.options.install_dir;
        let dirs = &self.options.shortcut_dirs;

        for shortcut in &self.package.shortcuts {
            let folder = match shortcut.location {
                ShortcutLocation::StartMenu => &dirs.start_menu,
                ShortcutLocation::Desktop if self.options.desktop_icon => &dirs.desktop,
                ShortcutLocation::Desktop => continue,
            };
            if !folder.exists() {
                fs::create_dir_all(folder).map_err(|err| InstallError::io(folder, err))?;
                if shortcut.location == ShortcutLocation::StartMenu {
                    self.log.shortcut_folders.push(folder.clone());
                }
            }

            let mut link = ShellLink::new(install_dir.join(&shortcut.target))
                .working_dir(install_dir.clone());
            if let Some(icon) = self.app.icon_path() {
                link = link.icon(install_dir.join(icon));
            }

            let link_path = folder.join(format!("{}.lnk", shortcut.name));
            log::debug!("Writing shortcut {}", link_path.display());
            save_link(&link_path, &link).map_err(|err| InstallError::io(&link_path, err))?;
            if !self.log.shortcuts.contains(&link_path) {
                self.log.shortcuts.push(link_path);
            }
        }

        self.log.save(install_dir)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::{
        config::{DirectoryEntry, FileEntry, ShortcutDirs, ShortcutEntry},
        registry::{MemoryRegistry, RegistryReader, RegistryScope},
    };

    static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Unique scratch directory, removed again on drop.
    pub(crate) struct TestDir(PathBuf);

    impl TestDir {
        pub(crate) fn new(label: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "gama-setup-tests-{}-{}-{}",
                label,
                std::process::id(),
                TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).expect("must create test dir");
            Self(path)
        }

        pub(crate) fn path(&self) -> &Path {
            &self.0
        }

        pub(crate) fn write(&self, relative: &str, contents: &[u8]) {
            let path = self.0.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("must create parent");
            }
            fs::write(path, contents).expect("must write file");
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    pub(crate) const PRODUCT: &str = "{8F3A2C1B-5D4E-4F6A-9B7C-1E2D3F4A5B6C}";

    pub(crate) fn setup_config() -> SetupConfig {
        SetupConfig {
            app: AppManifest::build()
                .product_id(PRODUCT)
                .version("2.1.0")
                .friendly_name("Gama Launcher")
                .publisher("Gama")
                .executable("GamaLauncher.exe")
                .icon("icon.ico"),
            package: PackageManifest {
                files: vec![
                    FileEntry {
                        source: PathBuf::from("dist/GamaLauncher.exe"),
                        destination: None,
                        optional: false,
                    },
                    FileEntry {
                        source: PathBuf::from("icon.ico"),
                        destination: None,
                        optional: false,
                    },
                    FileEntry {
                        source: PathBuf::from("server_list.json"),
                        destination: None,
                        optional: true,
                    },
                ],
                directories: vec![DirectoryEntry {
                    source: PathBuf::from("mods"),
                    destination: None,
                    optional: false,
                }],
                shortcuts: vec![
                    ShortcutEntry {
                        name: "Gama Launcher".to_string(),
                        target: PathBuf::from("GamaLauncher.exe"),
                        location: ShortcutLocation::StartMenu,
                    },
                    ShortcutEntry {
                        name: "Gama Launcher".to_string(),
                        target: PathBuf::from("GamaLauncher.exe"),
                        location: ShortcutLocation::Desktop,
                    },
                ],
            },
        }
    }

    /// Source tree with everything but the optional server list.
    pub(crate) fn source_tree() -> TestDir {
        let source = TestDir::new("source");
        source.write("dist/GamaLauncher.exe", b"MZ launcher");
        source.write("icon.ico", b"icon");
        source.write("mods/base/sodium.jar", b"jar");
        source.write("setup.exe", b"MZ setup");
        source
    }

    pub(crate) fn options(source: &TestDir, root: &TestDir, desktop_icon: bool) -> InstallOptions {
        InstallOptions {
            install_dir: root.path().join("Gama Launcher"),
            source_dir: source.path().to_path_buf(),
            scope: RegistryScope::User,
            shortcut_dirs: ShortcutDirs {
                start_menu: root.path().join("Start Menu").join("Gama Launcher"),
                desktop: root.path().join("Desktop"),
            },
            desktop_icon,
            launch_after_install: false,
        }
    }

    #[test]
    fn installs_files_and_registers_uninstaller() {
        let source = source_tree();
        let root = TestDir::new("install");
        let options = options(&source, &root, false);
        let install_dir = options.install_dir.clone();
        let mut installer =
            ManifestInstaller::new(setup_config(), options, MemoryRegistry::default())
                .with_uninstaller(source.path().join("setup.exe"));

        installer.install_files().expect("must install");

        assert!(install_dir.join("GamaLauncher.exe").is_file());
        assert!(install_dir.join("mods/base/sodium.jar").is_file());
        assert!(!install_dir.join("server_list.json").exists());
        assert_eq!(
            fs::read(install_dir.join(UNINSTALLER_NAME)).expect("uninstaller copied"),
            b"MZ setup"
        );
        assert!(install_dir.join(INSTALL_LOG_NAME).is_file());

        let registry = installer.into_registry();
        let key = uninstall_key(PRODUCT);
        assert_eq!(
            registry.read_user_scope(&key, UNINSTALL_STRING),
            Some(format!("\"{}\"", install_dir.join(UNINSTALLER_NAME).display()))
        );
        assert_eq!(
            registry.read_user_scope(&key, "DisplayVersion").as_deref(),
            Some("2.1.0")
        );
        assert_eq!(registry.read_machine_scope(&key, UNINSTALL_STRING), None);
    }

    #[test]
    fn desktop_shortcut_needs_the_task() {
        let source = source_tree();
        let root = TestDir::new("install");
        let options = options(&source, &root, false);
        let mut installer =
            ManifestInstaller::new(setup_config(), options, MemoryRegistry::default());

        installer.install_files().expect("must install");
        installer.register_shortcuts().expect("must write shortcuts");

        assert!(
            root.path()
                .join("Start Menu/Gama Launcher/Gama Launcher.lnk")
                .is_file()
        );
        assert!(!root.path().join("Desktop/Gama Launcher.lnk").exists());
        assert_eq!(installer.install_log().shortcuts.len(), 1);
        assert_eq!(installer.install_log().shortcut_folders.len(), 1);
    }

    #[test]
    fn desktop_shortcut_with_the_task() {
        let source = source_tree();
        let root = TestDir::new("install");
        let options = options(&source, &root, true);
        let install_dir = options.install_dir.clone();
        let mut installer =
            ManifestInstaller::new(setup_config(), options, MemoryRegistry::default());

        installer.install_files().expect("must install");
        installer.register_shortcuts().expect("must write shortcuts");

        assert!(root.path().join("Desktop/Gama Launcher.lnk").is_file());
        let log = InstallLog::load(&install_dir).expect("log saved");
        assert_eq!(log.shortcuts.len(), 2);
    }

    #[test]
    fn missing_required_file_fails_install() {
        let source = TestDir::new("source");
        let root = TestDir::new("install");
        let mut installer = ManifestInstaller::new(
            setup_config(),
            options(&source, &root, false),
            MemoryRegistry::default(),
        );

        let err = installer.install_files().expect_err("must fail");
        assert!(matches!(err, InstallError::MissingSource(_)));
    }
}
