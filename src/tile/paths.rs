//! On-disk layout of an extraction job.
//!
//! ```text
//! <output_root>/<slide_name>/metadata.json
//! <output_root>/<slide_name>/<x>x_<y>y/<z>z.png
//! <output_root>/<slide_name>.zip
//! ```

use std::io;
use std::path::{Path, PathBuf};

use super::grid::{TileFormat, TileOrigin};

pub const METADATA_FILE_NAME: &str = "metadata.json";

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Job name for a slide file: the file name cut at its first space, then at
/// its first `.`.
///
/// `"S1 copy.v2.ndpi"` becomes `"S1"`.
pub fn slide_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = file_name.split(' ').next().unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// Directory name for the tile at `origin`.
pub fn tile_dir_name(origin: TileOrigin) -> String {
    format!("{}x_{}y", origin.x, origin.y)
}

/// File name of the artifact for focal plane `z`.
pub fn plane_file_name(z: u32, format: TileFormat) -> String {
    format!("{}z.{}", z, format.extension())
}

/// Paths of one slide's job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    root: PathBuf,
    name: String,
}

impl JobPaths {
    pub fn new(output_root: &Path, slide_name: impl Into<String>) -> Self {
        let name = slide_name.into();
        Self {
            root: output_root.join(&name),
            name,
        }
    }

    /// Job directory for the slide at `slide_path` under `output_root`.
    pub fn for_slide(output_root: &Path, slide_path: &Path) -> Self {
        Self::new(output_root, slide_name(slide_path))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.root.join(METADATA_FILE_NAME)
    }

    pub fn tile_dir(&self, origin: TileOrigin) -> PathBuf {
        self.root.join(tile_dir_name(origin))
    }

    pub fn archive(&self) -> PathBuf {
        self.root
            .with_file_name(format!("{}.{}", self.name, ARCHIVE_EXTENSION))
    }
}

/// Number of finished artifacts of `format` in `dir`. A missing directory
/// holds none.
pub async fn count_artifacts(dir: &Path, format: TileFormat) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext == format.extension());
        if matches && entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
