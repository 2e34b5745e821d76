use crate::models::FileDescriptor;
use exif::{In, Tag};
use std::fs::File;
use std::io::BufReader;
use tracing::trace;

/// Scores how much embedded metadata a file carries. Higher is richer.
pub trait MetadataProbe: Send + Sync {
    fn score(&self, file: &FileDescriptor) -> u32;
}

/// Counts the capture-related EXIF tags present in image containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifProbe;

const EXIF_CONTAINERS: &[&str] = &[
    "jpg", "jpeg", "tif", "tiff", "heic", "heif", "png", "webp", "dng", "cr2", "nef", "arw",
    "orf", "rw2",
];

const SCORED_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal,
    Tag::DateTimeDigitized,
    Tag::DateTime,
    Tag::Make,
    Tag::Model,
    Tag::GPSLatitude,
    Tag::GPSLongitude,
    Tag::LensModel,
];

impl ExifProbe {
    fn is_container(file: &FileDescriptor) -> bool {
        file.extension()
            .map(|ext| EXIF_CONTAINERS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl MetadataProbe for ExifProbe {
    fn score(&self, file: &FileDescriptor) -> u32 {
        if !Self::is_container(file) {
            return 0;
        }

        let handle = match File::open(&file.path) {
            Ok(handle) => handle,
            Err(e) => {
                trace!("Metadata probe could not open {}: {}", file.path.display(), e);
                return 0;
            }
        };

        let mut reader = BufReader::new(handle);
        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(data) => SCORED_TAGS
                .iter()
                .filter(|tag| data.get_field(**tag, In::PRIMARY).is_some())
                .count() as u32,
            Err(e) => {
                trace!("No EXIF in {}: {}", file.path.display(), e);
                0
            }
        }
    }
}

/// Probe that reports no metadata for anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataProbe for NoMetadata {
    fn score(&self, _file: &FileDescriptor) -> u32 {
        0
    }
}
