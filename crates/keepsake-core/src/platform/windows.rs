use crate::models::AttributeFlags;
use std::fs::Metadata;
use std::os::windows::fs::MetadataExt;
use winapi::um::winnt::{
    FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_REPARSE_POINT, FILE_ATTRIBUTE_SYSTEM,
};

pub fn attribute_flags(metadata: &Metadata) -> AttributeFlags {
    let attrs = metadata.file_attributes();
    AttributeFlags {
        system: attrs & FILE_ATTRIBUTE_SYSTEM != 0,
        hidden: attrs & FILE_ATTRIBUTE_HIDDEN != 0,
        reparse: attrs & FILE_ATTRIBUTE_REPARSE_POINT != 0 || metadata.file_type().is_symlink(),
    }
}
