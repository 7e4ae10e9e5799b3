//! Candidate frame artifacts.
//!
//! Every sampled candidate owns one artifact: a JPEG on disk or a shared
//! in-memory image. The on-disk file name carries the frame's coordinates
//! (`cut_{segment}_frame_{index}_time_{ms}[_diff_{score}].jpg`) for tools
//! that only see the directory; the typed keyframe structs stay the record.

use image::{DynamicImage, GrayImage, ImageFormat};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::error::{MediaError, MediaResult};

/// Encoded coordinates of a candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactName {
    pub segment_id: u32,
    pub frame_index: u64,
    pub timestamp_ms: u64,
    /// Diagnostic change score, set once selection has run
    pub diff_score: Option<u32>,
}

impl ArtifactName {
    pub fn new(segment_id: u32, frame_index: u64, timestamp_ms: u64) -> Self {
        Self {
            segment_id,
            frame_index,
            timestamp_ms,
            diff_score: None,
        }
    }

    pub fn with_diff(mut self, diff_score: u32) -> Self {
        self.diff_score = Some(diff_score);
        self
    }

    /// File name for the disk store.
    pub fn file_name(&self) -> String {
        format!("{}.jpg", self)
    }

    /// Parse a name produced by [`ArtifactName::file_name`].
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".jpg")?;
        let mut parts = stem.split('_');

        let segment_id = take_field(&mut parts, "cut")?.parse().ok()?;
        let frame_index = take_field(&mut parts, "frame")?.parse().ok()?;
        let timestamp_ms = take_field(&mut parts, "time")?.parse().ok()?;
        let diff_score = match parts.next() {
            None => None,
            Some("diff") => Some(parts.next()?.parse().ok()?),
            Some(_) => return None,
        };

        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            segment_id,
            frame_index,
            timestamp_ms,
            diff_score,
        })
    }
}

fn take_field<'a>(parts: &mut std::str::Split<'a, char>, key: &str) -> Option<&'a str> {
    if parts.next()? != key {
        return None;
    }
    parts.next()
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cut_{}_frame_{}_time_{}",
            self.segment_id, self.frame_index, self.timestamp_ms
        )?;
        if let Some(diff) = self.diff_score {
            write!(f, "_diff_{}", diff)?;
        }
        Ok(())
    }
}

/// Handle to a stored candidate image.
#[derive(Debug, Clone)]
pub enum ArtifactRef {
    Path(PathBuf),
    Memory(Arc<DynamicImage>),
}

impl ArtifactRef {
    /// Load the image.
    pub fn load(&self) -> MediaResult<DynamicImage> {
        match self {
            ArtifactRef::Path(path) => {
                image::open(path).map_err(|e| MediaError::artifact(path, e.to_string()))
            }
            ArtifactRef::Memory(image) => Ok(image.as_ref().clone()),
        }
    }

    /// Load the image as 8-bit luma.
    pub fn load_luma(&self) -> MediaResult<GrayImage> {
        match self {
            ArtifactRef::Path(_) => Ok(self.load()?.to_luma8()),
            ArtifactRef::Memory(image) => Ok(image.to_luma8()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactRef::Path(path) => Some(path),
            ArtifactRef::Memory(_) => None,
        }
    }
}

impl Serialize for ArtifactRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.path() {
            Some(path) => serializer.serialize_some(path),
            None => serializer.serialize_none(),
        }
    }
}

/// Where candidate artifacts live.
#[derive(Debug, Clone)]
pub enum ArtifactStore {
    /// JPEG files under a directory
    Disk { dir: PathBuf },
    /// Shared image buffers, nothing touches the filesystem
    Memory,
}

impl ArtifactStore {
    /// Disk store rooted at `dir` (created if missing).
    pub fn disk(dir: impl Into<PathBuf>) -> MediaResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(ArtifactStore::Disk { dir })
    }

    pub fn memory() -> Self {
        ArtifactStore::Memory
    }

    /// Store a candidate image under `name`.
    pub fn put(&self, name: &ArtifactName, pixels: DynamicImage) -> MediaResult<ArtifactRef> {
        match self {
            ArtifactStore::Disk { dir } => {
                let path = dir.join(name.file_name());
                // JPEG has no alpha channel
                pixels
                    .to_rgb8()
                    .save_with_format(&path, ImageFormat::Jpeg)
                    .map_err(|e| MediaError::artifact(&path, e.to_string()))?;
                Ok(ArtifactRef::Path(path))
            }
            ArtifactStore::Memory => Ok(ArtifactRef::Memory(Arc::new(pixels))),
        }
    }

    /// Re-tag an artifact; in-memory artifacts are returned unchanged.
    pub fn rename(&self, artifact: &ArtifactRef, name: &ArtifactName) -> MediaResult<ArtifactRef> {
        match (self, artifact) {
            (ArtifactStore::Disk { dir }, ArtifactRef::Path(from)) => {
                let to = dir.join(name.file_name());
                if *from != to {
                    std::fs::rename(from, &to)
                        .map_err(|e| MediaError::artifact(from, e.to_string()))?;
                }
                Ok(ArtifactRef::Path(to))
            }
            _ => Ok(artifact.clone()),
        }
    }

    /// Free an artifact. Failures are logged, not returned.
    pub fn release(&self, artifact: &ArtifactRef) {
        if let ArtifactRef::Path(path) = artifact {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_name_format() {
        let name = ArtifactName::new(2, 150, 5000);
        assert_eq!(name.file_name(), "cut_2_frame_150_time_5000.jpg");
        assert_eq!(
            name.with_diff(7).file_name(),
            "cut_2_frame_150_time_5000_diff_7.jpg"
        );
    }

    #[test]
    fn test_name_parse() {
        let parsed = ArtifactName::parse("cut_3_frame_42_time_1375_diff_0.jpg").unwrap();
        assert_eq!(parsed, ArtifactName::new(3, 42, 1375).with_diff(0));
        assert_eq!(
            ArtifactName::parse("cut_1_frame_0_time_0.jpg"),
            Some(ArtifactName::new(1, 0, 0))
        );
        assert!(ArtifactName::parse("cut_1_frame_0.jpg").is_none());
        assert!(ArtifactName::parse("cut_1_frame_0_time_0_diff_x.jpg").is_none());
        assert!(ArtifactName::parse("thumb.png").is_none());
    }

    #[test]
    fn test_disk_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::disk(dir.path().join("frames")).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([120, 40, 40])));

        let name = ArtifactName::new(1, 8, 250);
        let artifact = store.put(&name, image).unwrap();
        let path = artifact.path().unwrap().to_path_buf();
        assert!(path.exists());
        assert_eq!(artifact.load_luma().unwrap().dimensions(), (16, 16));

        let renamed = store.rename(&artifact, &name.with_diff(12)).unwrap();
        assert!(!path.exists());
        let renamed_path = renamed.path().unwrap();
        assert!(renamed_path.ends_with("cut_1_frame_8_time_250_diff_12.jpg"));

        store.release(&renamed);
        assert!(!renamed_path.exists());
        // Releasing twice is harmless
        store.release(&renamed);
    }

    #[test]
    fn test_memory_store() {
        let store = ArtifactStore::memory();
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let artifact = store.put(&ArtifactName::new(1, 0, 0), image).unwrap();
        assert!(artifact.path().is_none());
        assert_eq!(serde_json::to_string(&artifact).unwrap(), "null");
    }
}
