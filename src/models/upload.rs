//! An incoming file handed over by the CMS upload widget.

use std::path::PathBuf;

/// File payload for create/replace.
///
/// `temp_path` points at the spooled upload; the caller owns it and removes
/// whatever is left after the operation (a local mirror may have moved it).
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// Client-supplied filename. Untrusted.
    pub name: String,

    pub temp_path: Option<PathBuf>,

    /// Size reported by the caller, if known.
    pub size_bytes: Option<u64>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            temp_path: Some(temp_path.into()),
            size_bytes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}
