use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};

// Random bytes marking the end of a setup binary that carries a payload.
const FINGERPRINT: [u8; 32] = [
    0x9d, 0x41, 0x7a, 0xe2, 0x0c, 0x5b, 0x83, 0xf6, 0x2e, 0xb4, 0x68, 0x11, 0xd7, 0x3f, 0xa0, 0x5c,
    0x72, 0xe9, 0x04, 0x9b, 0xc6, 0x1d, 0x58, 0xaf, 0x33, 0x8e, 0xf1, 0x6a, 0xbd, 0x27, 0x90, 0x4e,
];
const TRAILER_LEN: u64 = 8 + FINGERPRINT.len() as u64;
const ALIGNMENT: u64 = 4096;

/// Position and length of the data section appended to an executable.
fn find_section(file: &mut File) -> Result<Option<(u64, u64)>, io::Error> {
    let size = file.seek(SeekFrom::End(0))?;
    if size < TRAILER_LEN {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(size - FINGERPRINT.len() as u64))?;
    let mut fingerprint = [0u8; FINGERPRINT.len()];
    file.read_exact(&mut fingerprint)?;
    if fingerprint != FINGERPRINT {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(size - TRAILER_LEN))?;
    let length = file.read_u64::<LE>()?;
    let start = (size - TRAILER_LEN).checked_sub(length).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "embedded data section is larger than the executable",
        )
    })?;
    log::debug!("Found embedded data section with {length} bytes at {start}");
    Ok(Some((start, length)))
}

/// Opens the data section appended to `executable`, if there is one.
pub fn search_for_embedded_data(executable: &Path) -> Result<Option<Section<File>>, io::Error> {
    let mut file = File::open(executable)?;
    Ok(find_section(&mut file)?.map(|(start, length)| Section::new(file, start, length)))
}

/// Length of `file` without an appended data section.
fn executable_len(file: &mut File) -> Result<u64, io::Error> {
    match find_section(file)? {
        Some((start, _)) => Ok(start),
        None => file.seek(SeekFrom::End(0)),
    }
}

/// Copies `source` to `destination`, leaving out any appended data section.
pub fn copy_executable(source: &Path, destination: &Path) -> Result<u64, io::Error> {
    let mut source = File::open(source)?;
    let length = executable_len(&mut source)?;
    source.seek(SeekFrom::Start(0))?;
    let mut destination = File::create(destination)?;
    let copied = io::copy(&mut source.take(length), &mut destination)?;
    destination.sync_all()?;
    Ok(copied)
}

/// Copies the bare `executable` to `new_executable` and returns a writer for
/// the data section behind it.
pub fn append_data(
    executable: &Path,
    new_executable: &Path,
) -> Result<AppendDataWriter, io::Error> {
    copy_executable(executable, new_executable)?;
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(new_executable)?;

    let current_size = file.seek(SeekFrom::End(0))?;
    let misalignment = current_size % ALIGNMENT;
    if misalignment != 0 {
        let padding = vec![0u8; (ALIGNMENT - misalignment) as usize];
        file.write_all(&padding)?;
    }

    AppendDataWriter::new(file)
}

/// Writes the data section of a setup binary.
///
/// Seeking is relative to `start`, so a zip archive written through it is
/// self contained.
pub struct AppendDataWriter {
    section_start: u64,
    start: u64,
    file: File,
}

impl AppendDataWriter {
    pub fn new(mut file: File) -> Result<Self, io::Error> {
        let start = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            section_start: start,
            start,
            file,
        })
    }

    pub fn move_start_to_current(&mut self) -> Result<(), io::Error> {
        self.start = self.file.stream_position()?;
        Ok(())
    }

    /// Writes the section length and fingerprint.
    pub fn finish(mut self) -> Result<u64, io::Error> {
        let total_size = self.file.seek(SeekFrom::End(0))?;
        let written = total_size - self.section_start;
        log::debug!("Finishing embedded data section with {written} bytes");
        self.file.write_u64::<LE>(written)?;
        self.file.write_all(&FINGERPRINT)?;
        self.file.sync_all()?;
        Ok(written)
    }
}

impl Write for AppendDataWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for AppendDataWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = match pos {
            SeekFrom::Start(pos) => self.file.seek(SeekFrom::Start(self.start + pos))?,
            other => self.file.seek(other)?,
        };
        if position < self.start {
            self.file.seek(SeekFrom::Start(self.start))?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the data section",
            ));
        }
        Ok(position - self.start)
    }
}

/// A window into `inner` that reads and seeks like a standalone stream.
#[derive(Debug)]
pub struct Section<R> {
    inner: R,
    start: u64,
    length: u64,
    position: u64,
}

impl<R> Section<R> {
    pub fn new(inner: R, start: u64, length: u64) -> Self {
        Self {
            inner,
            start,
            length,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Drops everything before the current position from the window.
    pub fn move_start_to_current(self) -> Self {
        let position = self.position.min(self.length);
        Self {
            start: self.start + position,
            length: self.length - position,
            position: 0,
            inner: self.inner,
        }
    }
}

impl<R: Read + Seek> Read for Section<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.position);
        let max = usize::try_from(remaining)
            .map_or(buf.len(), |remaining| remaining.min(buf.len()));
        if max == 0 {
            return Ok(0);
        }
        self.inner.seek(SeekFrom::Start(self.start + self.position))?;
        let read = self.inner.read(&mut buf[..max])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R> Seek for Section<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::End(offset) => self.length.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the data section",
            )
        })?;
        self.position = position;
        Ok(position)
    }
}
