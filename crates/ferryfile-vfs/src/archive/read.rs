//! Format-specific readers: build an index, extract one member, extract all.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use ferryfile_core::{VfsError, VfsResult};

use super::ArchiveFormat;
use super::index::{ArchiveIndex, normalize_member};

fn open(archive: &Path) -> VfsResult<File> {
    File::open(archive).map_err(|e| VfsError::io(archive, e))
}

fn corrupt(archive: &Path, e: impl std::fmt::Display) -> VfsError {
    VfsError::protocol(format!("Cannot read {}: {}", archive.display(), e))
}

fn civil_timestamp(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Relative path under the extraction root, or `None` when the member
/// name would escape it.
pub fn contained_path(member: &str) -> Option<PathBuf> {
    let normalized = normalize_member(member);
    let mut relative = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn write_member(dest_root: &Path, member: &str, is_dir: bool, reader: &mut dyn Read) -> VfsResult<()> {
    let Some(relative) = contained_path(member) else {
        tracing::warn!(member, "skipping archive member outside extraction root");
        return Ok(());
    };
    let dest = dest_root.join(relative);

    if is_dir {
        return fs::create_dir_all(&dest).map_err(|e| VfsError::io(&dest, e));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| VfsError::io(parent, e))?;
    }
    let mut out = File::create(&dest).map_err(|e| VfsError::io(&dest, e))?;
    io::copy(reader, &mut out).map_err(|e| VfsError::io(&dest, e))?;
    Ok(())
}

// --- tar family -----------------------------------------------------------

fn tar_stream(archive: &Path, format: ArchiveFormat) -> VfsResult<tar::Archive<Box<dyn Read>>> {
    let file = open(archive)?;
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(file)),
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

fn index_tar(archive: &Path, format: ArchiveFormat) -> VfsResult<ArchiveIndex> {
    let mut tar = tar_stream(archive, format)?;
    let mut index = ArchiveIndex::new();

    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let entry = entry.map_err(|e| corrupt(archive, e))?;
        let header = entry.header();
        let name = entry.path().map_err(|e| corrupt(archive, e))?;
        index.insert(
            &name.to_string_lossy(),
            header.entry_type().is_dir(),
            header.size().unwrap_or(0),
            header.mtime().map(|t| t as i64).unwrap_or(0),
            header.mode().ok(),
        );
    }
    Ok(index)
}

fn extract_tar_member(archive: &Path, format: ArchiveFormat, member: &str, dest: &Path) -> VfsResult<bool> {
    let mut tar = tar_stream(archive, format)?;
    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let name = normalize_member(&entry.path().map_err(|e| corrupt(archive, e))?.to_string_lossy());
        if name == member {
            let mut out = File::create(dest).map_err(|e| VfsError::io(dest, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| VfsError::io(dest, e))?;
            return Ok(true);
        }
    }
    Ok(false)
}

// --- zip ------------------------------------------------------------------

fn zip_archive(archive: &Path) -> VfsResult<zip::ZipArchive<File>> {
    zip::ZipArchive::new(open(archive)?).map_err(|e| corrupt(archive, e))
}

fn index_zip(archive: &Path) -> VfsResult<ArchiveIndex> {
    let mut zip = zip_archive(archive)?;
    let mut index = ArchiveIndex::new();

    for i in 0..zip.len() {
        let file = zip.by_index(i).map_err(|e| corrupt(archive, e))?;
        let modified = file
            .last_modified()
            .map(|dt| {
                civil_timestamp(
                    dt.year() as i32,
                    dt.month() as u32,
                    dt.day() as u32,
                    dt.hour() as u32,
                    dt.minute() as u32,
                    dt.second() as u32,
                )
            })
            .unwrap_or(0);
        index.insert(file.name(), file.is_dir(), file.size(), modified, file.unix_mode());
    }
    Ok(index)
}

fn extract_zip_member(archive: &Path, member: &str, dest: &Path) -> VfsResult<bool> {
    let mut zip = zip_archive(archive)?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| corrupt(archive, e))?;
        if file.is_file() && normalize_member(file.name()) == member {
            let mut out = File::create(dest).map_err(|e| VfsError::io(dest, e))?;
            io::copy(&mut file, &mut out).map_err(|e| VfsError::io(dest, e))?;
            return Ok(true);
        }
    }
    Ok(false)
}

// --- 7z -------------------------------------------------------------------

fn seven_zip(archive: &Path) -> VfsResult<sevenz_rust::SevenZReader<File>> {
    sevenz_rust::SevenZReader::open(archive, sevenz_rust::Password::empty())
        .map_err(|e| corrupt(archive, e))
}

fn index_7z(archive: &Path) -> VfsResult<ArchiveIndex> {
    let reader = seven_zip(archive)?;
    let mut index = ArchiveIndex::new();

    for file in &reader.archive().files {
        let modified = if file.has_last_modified_date {
            let time: SystemTime = file.last_modified_date().into();
            time.duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        } else {
            0
        };
        index.insert(file.name(), file.is_directory(), file.size(), modified, None);
    }
    Ok(index)
}

fn extract_7z_member(archive: &Path, member: &str, dest: &Path) -> VfsResult<bool> {
    let mut reader = seven_zip(archive)?;
    let mut found = false;

    reader
        .for_each_entries(|entry, data| {
            if !entry.is_directory() && normalize_member(entry.name()) == member {
                let mut out = File::create(dest)
                    .map_err(|e| sevenz_rust::Error::other(format!("{}: {}", dest.display(), e)))?;
                io::copy(data, &mut out)
                    .map_err(|e| sevenz_rust::Error::other(format!("{}: {}", dest.display(), e)))?;
                found = true;
                return Ok(false);
            }
            io::copy(data, &mut io::sink())
                .map_err(|e| sevenz_rust::Error::other(format!("Failed to read: {}", e)))?;
            Ok(true)
        })
        .map_err(|e| corrupt(archive, e))?;

    Ok(found)
}

fn extract_7z_all(archive: &Path, dest_root: &Path) -> VfsResult<()> {
    let mut reader = seven_zip(archive)?;
    reader
        .for_each_entries(|entry, data| {
            write_member(dest_root, entry.name(), entry.is_directory(), data)
                .map_err(|e| sevenz_rust::Error::other(e.to_string()))?;
            Ok(true)
        })
        .map_err(|e| corrupt(archive, e))
}

// --- rar ------------------------------------------------------------------

/// Decode an MS-DOS date/time pair as used in RAR headers.
pub fn dos_timestamp(packed: u32) -> i64 {
    if packed == 0 {
        return 0;
    }
    let time = packed & 0xFFFF;
    let date = packed >> 16;
    civil_timestamp(
        ((date >> 9) & 0x7F) as i32 + 1980,
        (date >> 5) & 0x0F,
        date & 0x1F,
        (time >> 11) & 0x1F,
        (time >> 5) & 0x3F,
        (time & 0x1F) * 2,
    )
}

#[cfg(feature = "rar")]
fn index_rar(archive: &Path) -> VfsResult<ArchiveIndex> {
    let listing = unrar::Archive::new(archive)
        .open_for_listing()
        .map_err(|e| corrupt(archive, e))?;
    let mut index = ArchiveIndex::new();

    for header in listing {
        let header = header.map_err(|e| corrupt(archive, e))?;
        index.insert(
            &header.filename.to_string_lossy(),
            header.is_directory(),
            header.unpacked_size,
            dos_timestamp(header.file_time),
            None,
        );
    }
    Ok(index)
}

/// Walk every RAR member, handing wanted ones to `sink` as whole buffers.
/// Stops early when `sink` returns `false`.
#[cfg(feature = "rar")]
fn walk_rar(
    archive: &Path,
    mut wanted: impl FnMut(&str, bool) -> bool,
    mut sink: impl FnMut(&str, bool, Vec<u8>) -> VfsResult<bool>,
) -> VfsResult<()> {
    let mut cursor = unrar::Archive::new(archive)
        .open_for_processing()
        .map_err(|e| corrupt(archive, e))?;

    while let Some(header) = cursor.read_header().map_err(|e| corrupt(archive, e))? {
        let name = header.entry().filename.to_string_lossy().into_owned();
        let is_dir = header.entry().is_directory();
        if wanted(&name, is_dir) {
            let (data, next) = header.read().map_err(|e| corrupt(archive, e))?;
            if !sink(&name, is_dir, data)? {
                return Ok(());
            }
            cursor = next;
        } else {
            cursor = header.skip().map_err(|e| corrupt(archive, e))?;
        }
    }
    Ok(())
}

#[cfg(feature = "rar")]
fn extract_rar_member(archive: &Path, member: &str, dest: &Path) -> VfsResult<bool> {
    let mut found = false;
    walk_rar(
        archive,
        |name, is_dir| !is_dir && normalize_member(name) == member,
        |_, _, data| {
            fs::write(dest, data).map_err(|e| VfsError::io(dest, e))?;
            found = true;
            Ok(false)
        },
    )?;
    Ok(found)
}

#[cfg(feature = "rar")]
fn extract_rar_all(archive: &Path, dest_root: &Path) -> VfsResult<()> {
    walk_rar(
        archive,
        |_, _| true,
        |name, is_dir, data| {
            write_member(dest_root, name, is_dir, &mut data.as_slice())?;
            Ok(true)
        },
    )
}

#[cfg(not(feature = "rar"))]
fn rar_disabled(archive: &Path) -> VfsError {
    VfsError::unsupported(
        "RAR archives (build with the `rar` feature)",
        archive.display().to_string(),
    )
}

// --- dispatch -------------------------------------------------------------

/// Read the table of contents.
pub fn load_index(archive: &Path, format: ArchiveFormat) -> VfsResult<ArchiveIndex> {
    match format {
        ArchiveFormat::Zip => index_zip(archive),
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 | ArchiveFormat::TarXz => {
            index_tar(archive, format)
        }
        ArchiveFormat::SevenZ => index_7z(archive),
        #[cfg(feature = "rar")]
        ArchiveFormat::Rar => index_rar(archive),
        #[cfg(not(feature = "rar"))]
        ArchiveFormat::Rar => Err(rar_disabled(archive)),
    }
}

/// Extract the file `member` into the file `dest`.
pub fn extract_member(archive: &Path, format: ArchiveFormat, member: &str, dest: &Path) -> VfsResult<()> {
    let member = normalize_member(member);
    let found = match format {
        ArchiveFormat::Zip => extract_zip_member(archive, &member, dest)?,
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 | ArchiveFormat::TarXz => {
            extract_tar_member(archive, format, &member, dest)?
        }
        ArchiveFormat::SevenZ => extract_7z_member(archive, &member, dest)?,
        #[cfg(feature = "rar")]
        ArchiveFormat::Rar => extract_rar_member(archive, &member, dest)?,
        #[cfg(not(feature = "rar"))]
        ArchiveFormat::Rar => return Err(rar_disabled(archive)),
    };

    if found {
        Ok(())
    } else {
        Err(VfsError::not_found(member))
    }
}

/// Unpack the whole archive below `dest_root`.
pub fn extract_all(archive: &Path, format: ArchiveFormat, dest_root: &Path) -> VfsResult<()> {
    fs::create_dir_all(dest_root).map_err(|e| VfsError::io(dest_root, e))?;
    match format {
        ArchiveFormat::Zip => zip_archive(archive)?
            .extract(dest_root)
            .map_err(|e| corrupt(archive, e)),
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 | ArchiveFormat::TarXz => {
            tar_stream(archive, format)?
                .unpack(dest_root)
                .map_err(|e| corrupt(archive, e))
        }
        ArchiveFormat::SevenZ => extract_7z_all(archive, dest_root),
        #[cfg(feature = "rar")]
        ArchiveFormat::Rar => extract_rar_all(archive, dest_root),
        #[cfg(not(feature = "rar"))]
        ArchiveFormat::Rar => Err(rar_disabled(archive)),
    }
}
