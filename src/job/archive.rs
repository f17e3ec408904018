//! Archive Packager.
//!
//! A finished job directory `<root>/<name>` is packed into `<root>/<name>.zip`
//! with every entry under `<name>/`, and unpacked again to resume. Both
//! directions stage their output (`<name>.zip.part`, `.<name>.unpack`) and
//! rename it into place, so an interrupted run never leaves a half-written
//! archive or job directory behind.
//!
//! These functions do blocking file I/O; async callers run them on the
//! blocking pool.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;
use crate::tile::ARCHIVE_EXTENSION;

fn zip_error(err: zip::result::ZipError) -> ArchiveError {
    ArchiveError::Zip(err.to_string())
}

fn dir_name(dir: &Path) -> Result<String, ArchiveError> {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::InvalidEntry(dir.display().to_string()))
}

/// Pack `dir` into a sibling `<name>.zip` and remove `dir`.
///
/// Returns the archive path. `dir` is only removed once the archive is
/// complete and renamed into place.
pub fn pack(dir: &Path) -> Result<PathBuf, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::MissingDirectory(dir.to_path_buf()));
    }

    let name = dir_name(dir)?;
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    let archive = parent.join(format!("{}.{}", name, ARCHIVE_EXTENSION));
    let partial = parent.join(format!("{}.{}.part", name, ARCHIVE_EXTENSION));

    let written = write_archive(dir, &name, &partial);
    let entries = match written {
        Ok(entries) => entries,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    fs::rename(&partial, &archive)?;
    fs::remove_dir_all(dir)?;

    info!(
        archive = %archive.display(),
        entries,
        "Packed job directory"
    );
    Ok(archive)
}

fn write_archive(dir: &Path, name: &str, partial: &Path) -> Result<usize, ArchiveError> {
    let mut zip = ZipWriter::new(File::create(partial)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{}/", name), options)
        .map_err(zip_error)?;

    let mut entries = 0;
    let mut pending = vec![(dir.to_path_buf(), name.to_string())];
    while let Some((current, prefix)) = pending.pop() {
        let mut children = fs::read_dir(&current)?.collect::<Result<Vec<_>, _>>()?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            let entry_name = format!("{}/{}", prefix, child.file_name().to_string_lossy());
            if child.file_type()?.is_dir() {
                zip.add_directory(format!("{}/", entry_name), options)
                    .map_err(zip_error)?;
                pending.push((child.path(), entry_name));
            } else {
                zip.start_file(entry_name, options).map_err(zip_error)?;
                io::copy(&mut File::open(child.path())?, &mut zip)?;
                entries += 1;
            }
        }
    }

    zip.finish().map_err(zip_error)?;
    Ok(entries)
}

/// Restore `<output_root>/<name>` from `archive`.
///
/// Returns `Ok(false)` without touching anything when the job directory
/// already exists or the archive is missing. Archives whose entries are all
/// rooted under `<name>/` and archives holding the job's files directly are
/// both accepted.
pub fn unpack(archive: &Path, output_root: &Path) -> Result<bool, ArchiveError> {
    let name = archive
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::InvalidEntry(archive.display().to_string()))?;
    let target = output_root.join(&name);

    if target.exists() {
        debug!(target = %target.display(), "Job directory exists; not unpacking");
        return Ok(false);
    }
    if !archive.is_file() {
        debug!(archive = %archive.display(), "No archive to unpack");
        return Ok(false);
    }

    let staging = output_root.join(format!(".{}.unpack", name));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    if let Err(e) = extract_into(archive, &name, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }
    fs::rename(&staging, &target)?;

    info!(
        archive = %archive.display(),
        target = %target.display(),
        "Unpacked job archive"
    );
    Ok(true)
}

fn extract_into(archive: &Path, name: &str, staging: &Path) -> Result<(), ArchiveError> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(zip_error)?;
    fs::create_dir_all(staging)?;

    let mut paths = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(zip_error)?;
        let path = entry
            .enclosed_name()
            .filter(|path| path.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| ArchiveError::InvalidEntry(entry.name().to_string()))?;
        paths.push(path);
    }

    let rooted = !paths.is_empty()
        && paths.iter().all(|path| {
            path.components()
                .next()
                .is_some_and(|first| first.as_os_str() == name)
        });

    for (i, path) in paths.iter().enumerate() {
        let relative = if rooted {
            path.strip_prefix(name).unwrap_or(path)
        } else {
            path.as_path()
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out = staging.join(relative);
        let mut entry = zip.by_index(i).map_err(zip_error)?;
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut File::create(&out)?)?;
    }

    Ok(())
}
