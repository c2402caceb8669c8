use std::{
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::{Component, Path, PathBuf},
};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    config::{AppManifest, PackageManifest, SetupConfig},
    installer::{InstallError, files::collect_tree},
    post_embed::{Section, append_data, search_for_embedded_data},
};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),
    #[error("Config encode error: Postcard error: {0}")]
    PostcardError(#[from] postcard::Error),
    #[error(transparent)]
    SourceError(#[from] InstallError),
    #[error("Source path {} must be relative and stay inside the source directory", .0.display())]
    InvalidSourcePath(PathBuf),
    #[error("Embedded config is larger than the data section")]
    Truncated,
}

/// Stored in front of the zipped payload of a setup binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    pub app: AppManifest,
    pub package: PackageManifest,
    pub unpacked_size: u64,
}

impl From<EmbeddedConfig> for SetupConfig {
    fn from(config: EmbeddedConfig) -> Self {
        SetupConfig {
            app: config.app,
            package: config.package,
        }
    }
}

#[derive(Debug, Default)]
struct PayloadContents {
    /// Path on disk and name inside the archive.
    files: Vec<(PathBuf, String)>,
    directories: Vec<String>,
    unpacked_size: u64,
}

impl PayloadContents {
    fn add_file(&mut self, path: PathBuf, name: String) -> Result<(), EmbedError> {
        self.unpacked_size += fs::metadata(&path)?.len();
        self.files.push((path, name));
        Ok(())
    }
}

/// Writes `template` followed by the manifest and the zipped payload read
/// from `source_dir` to `output`.
///
/// Missing optional entries are left out of the payload. The installer skips
/// them the same way it does when installing straight from `source_dir`.
pub fn create_setup(
    template: &Path,
    output: &Path,
    config: &SetupConfig,
    source_dir: &Path,
) -> Result<EmbeddedConfig, EmbedError> {
    let contents = collect_payload(source_dir, &config.package)?;
    let embedded = EmbeddedConfig {
        app: config.app.clone(),
        package: config.package.clone(),
        unpacked_size: contents.unpacked_size,
    };
    let config_bytes = postcard::to_stdvec(&embedded)?;

    log::info!("Embedding config");
    let mut writer = append_data(template, output)?;
    writer.write_u64::<LE>(config_bytes.len() as u64)?;
    writer.write_all(&config_bytes)?;
    writer.move_start_to_current()?;

    log::info!("Zipping and embedding {} files", contents.files.len());
    let mut zip = ZipWriter::new(writer);
    for name in &contents.directories {
        zip.add_directory(name.as_str(), SimpleFileOptions::default())?;
    }
    for (path, name) in &contents.files {
        zip.start_file(name.as_str(), file_options())?;
        let mut reader = BufReader::new(File::open(path)?);
        io::copy(&mut reader, &mut zip)?;
    }

    let writer = zip.finish()?;
    writer.finish()?;
    Ok(embedded)
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Xz)
        .compression_level(Some(6i64))
}

fn collect_payload(
    source_dir: &Path,
    package: &PackageManifest,
) -> Result<PayloadContents, EmbedError> {
    let mut contents = PayloadContents::default();

    for entry in &package.files {
        let source = source_dir.join(&entry.source);
        if !source.is_file() {
            if entry.optional {
                log::info!("Leaving out missing optional file {}", source.display());
                continue;
            }
            return Err(InstallError::MissingSource(source).into());
        }
        let name = archive_name(&entry.source)?;
        contents.add_file(source, name)?;
    }

    for entry in &package.directories {
        let source = source_dir.join(&entry.source);
        if !source.is_dir() {
            if entry.optional {
                log::info!("Leaving out missing optional directory {}", source.display());
                continue;
            }
            return Err(InstallError::MissingSource(source).into());
        }
        let root = archive_name(&entry.source)?;
        let mut files = Vec::new();
        let mut directories = Vec::new();
        collect_tree(&source, &mut files, &mut directories)?;

        contents.directories.push(root.clone());
        for dir in directories {
            let name = nested_name(&root, &dir, &source)?;
            contents.directories.push(name);
        }
        for file in files {
            let name = nested_name(&root, &file, &source)?;
            contents.add_file(file, name)?;
        }
    }

    Ok(contents)
}

fn nested_name(root: &str, path: &Path, base: &Path) -> Result<String, EmbedError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| EmbedError::InvalidSourcePath(path.to_path_buf()))?;
    Ok(format!("{root}/{}", archive_name(relative)?))
}

/// Zip entry name for a relative path, always `/` separated.
fn archive_name(path: &Path) -> Result<String, EmbedError> {
    let invalid = || EmbedError::InvalidSourcePath(path.to_path_buf());
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

/// Manifest and payload found inside a setup binary.
pub struct EmbeddedPayload {
    pub config: EmbeddedConfig,
    archive: ZipArchive<Section<File>>,
}

impl EmbeddedPayload {
    /// Unpacks the payload into `directory`, laid out like the source
    /// directory it was created from.
    pub fn extract(&mut self, directory: &Path) -> Result<(), EmbedError> {
        log::info!(
            "Unpacking {} entries ({} bytes) to {}",
            self.archive.len(),
            self.config.unpacked_size,
            directory.display()
        );
        fs::create_dir_all(directory)?;
        self.archive.extract(directory)?;
        Ok(())
    }
}

/// Reads the manifest and opens the payload appended to `executable`.
pub fn read_embedded_payload(executable: &Path) -> Result<Option<EmbeddedPayload>, EmbedError> {
    let Some(mut section) = search_for_embedded_data(executable)? else {
        return Ok(None);
    };

    let config_len = section.read_u64::<LE>()?;
    if config_len > section.len().saturating_sub(8) {
        return Err(EmbedError::Truncated);
    }
    let config_len = usize::try_from(config_len).map_err(|_| EmbedError::Truncated)?;
    let mut config_bytes = vec![0u8; config_len];
    section.read_exact(&mut config_bytes)?;
    let config: EmbeddedConfig = postcard::from_bytes(&config_bytes)?;

    let archive = ZipArchive::new(section.move_start_to_current())?;
    Ok(Some(EmbeddedPayload { config, archive }))
}
