use bitflags::bitflags;
use byteorder::{LE, WriteBytesExt};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Shell link (`.lnk`) writer for start menu and desktop shortcuts.
///
/// Structures according to:
/// https://winprotocoldoc.z19.web.core.windows.net/MS-SHLLINK/%5bMS-SHLLINK%5d.pdf
///
/// Only the parts needed to point at a local executable are written: the
/// header, a LinkInfo with the local base path, the working directory and an
/// optional icon location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLink {
    pub target: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub icon: Option<PathBuf>,
}

impl ShellLink {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        Self {
            working_dir: target
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf),
            target,
            icon: None,
        }
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    fn flags(&self) -> LinkFlags {
        let mut flags = LinkFlags::HAS_LINK_INFO | LinkFlags::IS_UNICODE;
        if self.working_dir.is_some() {
            flags |= LinkFlags::HAS_WORKING_DIR;
        }
        if self.icon.is_some() {
            flags |= LinkFlags::HAS_ICON_LOCATION;
        }
        flags
    }
}

pub fn write_link(writer: &mut impl Write, link: &ShellLink) -> Result<(), io::Error> {
    write_header(writer, link.flags())?;
    write_link_info(writer, &link.target)?;

    // StringData, in the order the flags are defined
    if let Some(working_dir) = &link.working_dir {
        write_string_data(writer, working_dir)?;
    }
    if let Some(icon) = &link.icon {
        write_string_data(writer, icon)?;
    }

    // TerminalBlock
    writer.write_u32::<LE>(0)?;

    Ok(())
}

pub fn save_link(path: &Path, link: &ShellLink) -> Result<(), io::Error> {
    let mut buffer = Vec::new();
    write_link(&mut buffer, link)?;
    std::fs::write(path, buffer)
}

const HEADER_SIZE: u32 = 0x4c;
const LINK_INFO_HEADER_SIZE: u32 = 0x24;
const VOLUME_ID_SIZE: u32 = 0x11;
const DRIVE_FIXED: u32 = 3;
const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;
const SW_SHOWNORMAL: u32 = 1;

fn write_header(writer: &mut impl Write, flags: LinkFlags) -> Result<(), io::Error> {
    writer.write_u32::<LE>(HEADER_SIZE)?;
    // LinkCLSID 00021401-0000-0000-C000-000000000046
    writer.write_u32::<LE>(0x21401)?;
    writer.write_u32::<LE>(0x0)?;
    writer.write_u32::<LE>(0xc0)?;
    writer.write_u32::<LE>(0x46000000)?;
    writer.write_u32::<LE>(flags.bits())?;
    writer.write_u32::<LE>(FILE_ATTRIBUTE_NORMAL)?;

    // Creation, access and write time are left empty, the shell fills them
    // from the target.
    writer.write_u64::<LE>(0)?;
    writer.write_u64::<LE>(0)?;
    writer.write_u64::<LE>(0)?;

    // FileSize
    writer.write_u32::<LE>(0)?;
    // IconIndex
    writer.write_i32::<LE>(0)?;
    writer.write_u32::<LE>(SW_SHOWNORMAL)?;
    // HotKey
    writer.write_u16::<LE>(0)?;
    // Reserved 1-3
    writer.write_u16::<LE>(0)?;
    writer.write_u32::<LE>(0)?;
    writer.write_u32::<LE>(0)?;

    Ok(())
}

fn write_link_info(writer: &mut impl Write, target: &Path) -> Result<(), io::Error> {
    let target = target.to_string_lossy();
    // The ANSI copy is only a fallback, non ASCII characters live in the
    // unicode copy.
    let ansi: Vec<u8> = target
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();
    let unicode: Vec<u16> = target.encode_utf16().collect();

    let volume_id_offset = LINK_INFO_HEADER_SIZE;
    let local_base_path_offset = volume_id_offset + VOLUME_ID_SIZE;
    let common_path_suffix_offset = local_base_path_offset + ansi.len() as u32 + 1;
    let local_base_path_unicode_offset = common_path_suffix_offset + 1;
    let common_path_suffix_unicode_offset =
        local_base_path_unicode_offset + (unicode.len() as u32 + 1) * 2;
    let size = common_path_suffix_unicode_offset + 2;

    writer.write_u32::<LE>(size)?;
    writer.write_u32::<LE>(LINK_INFO_HEADER_SIZE)?;
    writer.write_u32::<LE>(LinkInfoFlags::VOLUME_ID_AND_LOCAL_BASE_PATH.bits())?;
    writer.write_u32::<LE>(volume_id_offset)?;
    writer.write_u32::<LE>(local_base_path_offset)?;
    // CommonNetworkRelativeLinkOffset
    writer.write_u32::<LE>(0)?;
    writer.write_u32::<LE>(common_path_suffix_offset)?;
    writer.write_u32::<LE>(local_base_path_unicode_offset)?;
    writer.write_u32::<LE>(common_path_suffix_unicode_offset)?;

    // VolumeID with an empty label
    writer.write_u32::<LE>(VOLUME_ID_SIZE)?;
    writer.write_u32::<LE>(DRIVE_FIXED)?;
    // DriveSerialNumber
    writer.write_u32::<LE>(0)?;
    // VolumeLabelOffset
    writer.write_u32::<LE>(0x10)?;
    writer.write_u8(0)?;

    writer.write_all(&ansi)?;
    writer.write_u8(0)?;
    // CommonPathSuffix
    writer.write_u8(0)?;

    for c in &unicode {
        writer.write_u16::<LE>(*c)?;
    }
    writer.write_u16::<LE>(0)?;
    // CommonPathSuffixUnicode
    writer.write_u16::<LE>(0)?;

    Ok(())
}

/// StringData: character count followed by UTF-16 without terminator.
fn write_string_data(writer: &mut impl Write, value: &Path) -> Result<(), io::Error> {
    let value: Vec<u16> = value.to_string_lossy().encode_utf16().collect();
    let count = u16::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shell link string too long"))?;
    writer.write_u16::<LE>(count)?;
    for c in value {
        writer.write_u16::<LE>(c)?;
    }
    Ok(())
}

bitflags! {
    /// Which optional structures follow the ShellLinkHeader (section 2.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LinkFlags: u32 {
        /// A LinkTargetIDList structure follows the header.
        const HAS_LINK_TARGET_ID_LIST = 1 << 0;
        /// A LinkInfo structure is present.
        const HAS_LINK_INFO = 1 << 1;
        /// A NAME_STRING StringData structure is present.
        const HAS_NAME = 1 << 2;
        /// A RELATIVE_PATH StringData structure is present.
        const HAS_RELATIVE_PATH = 1 << 3;
        /// A WORKING_DIR StringData structure is present.
        const HAS_WORKING_DIR = 1 << 4;
        /// A COMMAND_LINE_ARGUMENTS StringData structure is present.
        const HAS_ARGUMENTS = 1 << 5;
        /// An ICON_LOCATION StringData structure is present.
        const HAS_ICON_LOCATION = 1 << 6;
        /// StringData is UTF-16.
        const IS_UNICODE = 1 << 7;
    }
}

bitflags! {
    /// LinkInfoFlags (section 2.3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LinkInfoFlags: u32 {
        /// VolumeID and LocalBasePath are present.
        const VOLUME_ID_AND_LOCAL_BASE_PATH = 1 << 0;
        /// CommonNetworkRelativeLink is present.
        const COMMON_NETWORK_RELATIVE_LINK_AND_PATH_SUFFIX = 1 << 1;
    }
}
