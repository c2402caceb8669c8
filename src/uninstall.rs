use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    installer::{INSTALL_LOG_NAME, InstallError, InstallLog},
    registry::{RegistryWriter, uninstall_key},
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub removed_files: usize,
    /// Files that could not be removed, including the running uninstaller.
    pub leftover: Vec<PathBuf>,
}

/// Removes the installation in `install_dir` that was recorded by its install
/// log, then drops its registry entry.
///
/// Removal is best effort: files that can't be deleted are reported in
/// [`UninstallReport::leftover`] instead of failing the uninstall.
pub fn uninstall<Registry>(
    install_dir: &Path,
    registry: &mut Registry,
) -> Result<UninstallReport, InstallError>
where
    Registry: RegistryWriter,
{
    let log = InstallLog::load(install_dir)?;
    let running = std::env::current_exe()
        .and_then(|exe| exe.canonicalize())
        .ok();
    let mut report = UninstallReport::default();

    log::info!(
        "Uninstalling {} {} from {}",
        log.product_id,
        log.version,
        install_dir.display()
    );

    for relative in &log.files {
        let path = install_dir.join(relative);
        if running.is_some() && path.canonicalize().ok() == running {
            // Windows can't delete a running image, the next install overwrites it.
            report.leftover.push(path);
            continue;
        }
        remove_file(&path, &mut report);
    }
    for shortcut in &log.shortcuts {
        remove_file(shortcut, &mut report);
    }
    remove_file(&install_dir.join(INSTALL_LOG_NAME), &mut report);

    let mut directories: Vec<PathBuf> = log
        .directories
        .iter()
        .map(|relative| install_dir.join(relative))
        .chain(log.shortcut_folders.iter().cloned())
        .collect();
    directories.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    directories.push(install_dir.to_path_buf());
    for dir in directories {
        // Only empty directories go away, anything the user added stays.
        if let Err(err) = fs::remove_dir(&dir) {
            log::debug!("Keeping {}: {}", dir.display(), err);
        }
    }

    registry.delete_key(log.scope, &uninstall_key(&log.product_id))?;

    if !report.leftover.is_empty() {
        log::warn!("{} files were left behind", report.leftover.len());
    }
    Ok(report)
}

fn remove_file(path: &Path, report: &mut UninstallReport) {
    match fs::remove_file(path) {
        Ok(()) => report.removed_files += 1,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            log::warn!("Failed to remove {}: {}", path.display(), err);
            report.leftover.push(path.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        installer::{
            ManifestInstaller, UNINSTALLER_NAME,
            tests::{PRODUCT, TestDir, options, setup_config, source_tree},
        },
        registry::{MemoryRegistry, RegistryScope},
        sequence::FileInstaller,
    };

    #[test]
    fn removes_everything_that_was_installed() {
        let source = source_tree();
        let root = TestDir::new("uninstall");
        let options = options(&source, &root, true);
        let install_dir = options.install_dir.clone();
        let mut installer =
            ManifestInstaller::new(setup_config(), options, MemoryRegistry::default())
                .with_uninstaller(source.path().join("setup.exe"));
        installer.install_files().expect("must install");
        installer.register_shortcuts().expect("must write shortcuts");
        let mut registry = installer.into_registry();
        assert!(registry.contains_key(RegistryScope::User, &uninstall_key(PRODUCT)));

        let report = uninstall(&install_dir, &mut registry).expect("must uninstall");

        assert!(report.leftover.is_empty());
        assert!(!install_dir.exists());
        assert!(!root.path().join("Desktop/Gama Launcher.lnk").exists());
        assert!(!root.path().join("Start Menu/Gama Launcher").exists());
        assert!(root.path().join("Desktop").exists());
        assert!(!registry.contains_key(RegistryScope::User, &uninstall_key(PRODUCT)));
    }

    #[test]
    fn user_files_keep_their_directory() {
        let source = source_tree();
        let root = TestDir::new("uninstall");
        let options = options(&source, &root, false);
        let install_dir = options.install_dir.clone();
        let mut installer =
            ManifestInstaller::new(setup_config(), options, MemoryRegistry::default());
        installer.install_files().expect("must install");
        fs::write(install_dir.join("mods/base/custom.jar"), b"mine").expect("write");
        let mut registry = installer.into_registry();

        uninstall(&install_dir, &mut registry).expect("must uninstall");

        assert!(install_dir.join("mods/base/custom.jar").is_file());
        assert!(!install_dir.join("GamaLauncher.exe").exists());
        assert!(!install_dir.join(UNINSTALLER_NAME).exists());
    }

    #[test]
    fn without_log_nothing_is_touched() {
        let root = TestDir::new("uninstall");
        root.write("GamaLauncher.exe", b"MZ");
        let mut registry = MemoryRegistry::default();

        let err = uninstall(root.path(), &mut registry).expect_err("must fail");

        assert!(matches!(err, InstallError::MissingInstallLog(_)));
        assert!(root.path().join("GamaLauncher.exe").is_file());
    }
}
