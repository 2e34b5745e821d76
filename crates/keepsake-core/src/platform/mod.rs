#[cfg(target_os = "windows")]
pub mod windows;

use crate::models::AttributeFlags;
use chrono::{DateTime, Utc};
use std::fs::Metadata;

/// Read attribute flags from `symlink_metadata` output (never follows links).
#[cfg(target_os = "windows")]
pub fn attribute_flags(metadata: &Metadata) -> AttributeFlags {
    windows::attribute_flags(metadata)
}

/// Unix has no system/hidden bits; hidden is a naming convention handled by
/// the classifier.
#[cfg(not(target_os = "windows"))]
pub fn attribute_flags(metadata: &Metadata) -> AttributeFlags {
    AttributeFlags {
        system: false,
        hidden: false,
        reparse: metadata.file_type().is_symlink(),
    }
}

/// Platform-reported creation time, when the filesystem records one.
pub fn created_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.created().ok().map(DateTime::<Utc>::from)
}

pub fn modified_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}
