use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::{DirectoryEntry, FileEntry},
    installer::{InstallError, install_log::InstallLog},
};

pub(crate) fn copy_file_entry(
    source_dir: &Path,
    install_dir: &Path,
    entry: &FileEntry,
    log: &mut InstallLog,
) -> Result<(), InstallError> {
    let source = source_dir.join(&entry.source);
    if !source.is_file() {
        if entry.optional {
            log::info!("Skipping missing optional file {}", source.display());
            return Ok(());
        }
        return Err(InstallError::MissingSource(source));
    }

    copy_file(&source, install_dir, &entry.destination(), log)
}

pub(crate) fn copy_directory_entry(
    source_dir: &Path,
    install_dir: &Path,
    entry: &DirectoryEntry,
    log: &mut InstallLog,
) -> Result<(), InstallError> {
    let source = source_dir.join(&entry.source);
    if !source.is_dir() {
        if entry.optional {
            log::info!("Skipping missing optional directory {}", source.display());
            return Ok(());
        }
        return Err(InstallError::MissingSource(source));
    }

    let destination = entry.destination();
    let mut files = Vec::new();
    let mut directories = Vec::new();
    collect_tree(&source, &mut files, &mut directories)?;

    create_dir(install_dir, &destination, log)?;
    for dir in directories {
        let relative = destination.join(strip(&dir, &source));
        create_dir(install_dir, &relative, log)?;
    }
    for file in files {
        let relative = destination.join(strip(&file, &source));
        copy_file(&file, install_dir, &relative, log)?;
    }
    Ok(())
}

/// Copies `source` to `install_dir/relative`, overwriting what is there.
pub(crate) fn copy_file(
    source: &Path,
    install_dir: &Path,
    relative: &Path,
    log: &mut InstallLog,
) -> Result<(), InstallError> {
    let destination = install_dir.join(relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| InstallError::io(parent, err))?;
    }
    log::debug!("{} -> {}", source.display(), destination.display());
    fs::copy(source, &destination).map_err(|err| InstallError::io(&destination, err))?;
    log.record_file(relative);
    Ok(())
}

fn create_dir(
    install_dir: &Path,
    relative: &Path,
    log: &mut InstallLog,
) -> Result<(), InstallError> {
    let path = install_dir.join(relative);
    fs::create_dir_all(&path).map_err(|err| InstallError::io(&path, err))?;
    for ancestor in relative.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        log.record_directory(ancestor);
    }
    Ok(())
}

/// Recursively collect all files and directories below `dir`.
pub(crate) fn collect_tree(
    dir: &Path,
    files: &mut Vec<PathBuf>,
    directories: &mut Vec<PathBuf>,
) -> Result<(), InstallError> {
    let entries = fs::read_dir(dir).map_err(|err| InstallError::io(dir, err))?;
    for entry in entries {
        let path = entry.map_err(|err| InstallError::io(dir, err))?.path();
        if path.is_dir() {
            directories.push(path.clone());
            collect_tree(&path, files, directories)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn strip<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
