//! Title and icon extraction seam.

/// Extracts display metadata from disc images and app folders.
///
/// The container formats (ISO9660, compressed images, PBP/SFO) are parsed by
/// the implementor; the scanner only asks for the results.
pub trait MetadataReader: Send + Sync {
    /// Title embedded in the item, if one can be read.
    fn title(&self, path: &str) -> Option<String>;

    /// Raw icon image embedded in the item, if any.
    fn icon_bytes(&self, path: &str) -> Option<Vec<u8>>;
}

/// Reader that never finds anything. Items fall back to their file names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataReader for NoMetadata {
    fn title(&self, _path: &str) -> Option<String> {
        None
    }

    fn icon_bytes(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}
