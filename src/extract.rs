//! Bottle extraction with path-traversal and symlink safety.
//!
//! Bottles are tar streams wrapped in gzip or zstd, laid out as
//! `<name>/<version>/...`. Every entry is validated before it touches
//! the filesystem: no path may escape the extraction root, symlinks may
//! only point inside the cellar or prefix, and hard links must stay
//! inside the cellar.

use crate::error::{FastBrewError, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Extract a bottle tarball into `dest_dir`. `prefix_dir` widens the
/// set of roots a symlink target may resolve into (bottles ship links
/// into `<prefix>/opt`).
pub fn extract_bottle(tar_path: &Path, dest_dir: &Path, prefix_dir: &Path) -> Result<()> {
    let file = fs::File::open(tar_path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    let read = read_magic(&mut reader, &mut magic)?;

    let decoder: Box<dyn Read> = if read >= 2 && magic[..2] == GZIP_MAGIC {
        Box::new(GzDecoder::new(reader))
    } else if read >= 4 && magic == ZSTD_MAGIC {
        Box::new(zstd::stream::read::Decoder::new(reader)?)
    } else {
        return Err(FastBrewError::UnsupportedFormat(hex_string(&magic[..read])));
    };

    unpack(Archive::new(decoder), dest_dir, prefix_dir)
}

/// Peek the magic bytes without consuming them from the stream.
fn read_magic<R: Read + std::io::Seek>(reader: &mut R, magic: &mut [u8; 4]) -> Result<usize> {
    let mut read = 0;
    while read < 4 {
        let n = reader.read(&mut magic[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    reader.seek(std::io::SeekFrom::Start(0))?;
    Ok(read)
}

fn unpack<R: Read>(mut archive: Archive<R>, dest_dir: &Path, prefix_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)?;
    let cellar_root = dest_dir.to_path_buf();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        let relative = sanitize_relative(&entry_path)?;
        let target = dest_dir.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mode = entry.header().mode().unwrap_or(0o644) & 0o777;
                let mut out = fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&target)?;
                std::io::copy(&mut entry, &mut out)?;
                set_mode(&target, mode)?;
            }
            EntryType::Symlink => {
                let link_target = entry
                    .link_name()?
                    .ok_or_else(|| {
                        FastBrewError::ExtractionUnsafe(format!(
                            "symlink without target: {}",
                            entry_path.display()
                        ))
                    })?
                    .into_owned();

                if !symlink_is_safe(&cellar_root, prefix_dir, &target, &link_target) {
                    return Err(FastBrewError::ExtractionUnsafe(format!(
                        "symlink {} points outside the cellar: {}",
                        entry_path.display(),
                        link_target.display()
                    )));
                }

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing(&target)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &target)?;
            }
            EntryType::Link => {
                let link_name = entry
                    .link_name()?
                    .ok_or_else(|| {
                        FastBrewError::ExtractionUnsafe(format!(
                            "hard link without target: {}",
                            entry_path.display()
                        ))
                    })?
                    .into_owned();

                let link_relative = sanitize_relative(&link_name)?;
                let link_target = cellar_root.join(link_relative);

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing(&target)?;
                fs::hard_link(&link_target, &target)?;
            }
            EntryType::Char | EntryType::Block => {
                tracing::warn!(path = %entry_path.display(), "skipping device file in bottle");
            }
            other => {
                tracing::warn!(
                    path = %entry_path.display(),
                    kind = ?other,
                    "skipping unsupported tar entry"
                );
            }
        }
    }

    Ok(())
}

/// Reject absolute paths and any `..` component (zip-slip defense),
/// returning the cleaned relative path.
fn sanitize_relative(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FastBrewError::ExtractionUnsafe(format!(
                    "illegal path in archive: {}",
                    path.display()
                )));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(FastBrewError::ExtractionUnsafe(
            "empty path in archive".to_string(),
        ));
    }
    Ok(clean)
}

/// Absolute link targets must resolve inside the cellar root or prefix
/// root; relative targets are resolved against the entry's directory
/// and must land inside one of those roots as well.
fn symlink_is_safe(cellar_root: &Path, prefix_dir: &Path, target: &Path, link: &Path) -> bool {
    let resolved = if link.is_absolute() {
        normalize(link)
    } else {
        let base = target.parent().unwrap_or(cellar_root);
        normalize(&base.join(link))
    };

    resolved.starts_with(normalize(cellar_root)) || resolved.starts_with(normalize(prefix_dir))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                }
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => {
            fs::remove_file(path)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
