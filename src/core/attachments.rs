//! Local files turned into inline chat attachments.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::debug;

use crate::api::ChatFileAttachment;

/// Largest file accepted as an attachment.
pub const MAX_ATTACHMENT_BYTES: u64 = 8 * 1024 * 1024;

/// Extensions we upload, with the media type the backend expects for each.
const SUPPORTED_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("csv", "text/csv"),
];

#[derive(Debug)]
pub enum AttachmentError {
    Read { path: PathBuf, source: io::Error },
    TooLarge { path: PathBuf, size: u64 },
    UnsupportedType { path: PathBuf },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            AttachmentError::TooLarge { path, size } => write!(
                f,
                "{} is {} bytes; attachments are limited to 8 MB",
                path.display(),
                size
            ),
            AttachmentError::UnsupportedType { path } => write!(
                f,
                "{} is not a supported attachment (images, PDF or CSV)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for AttachmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Media type for a path, judged by its extension.
pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, media_type)| *media_type)
}

/// Read a file and encode it as a `data:` URL attachment.
pub fn attachment_from_path(path: &Path) -> Result<ChatFileAttachment, AttachmentError> {
    let media_type = media_type_for(path).ok_or_else(|| AttachmentError::UnsupportedType {
        path: path.to_path_buf(),
    })?;
    let read_error = |source| AttachmentError::Read {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(read_error)?.len();
    if size > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            path: path.to_path_buf(),
            size,
        });
    }

    let bytes = fs::read(path).map_err(read_error)?;
    debug!(path = %path.display(), media_type, size, "Encoding attachment");
    Ok(ChatFileAttachment {
        media_type: media_type.to_string(),
        url: format!(
            "data:{media_type};base64,{}",
            base64::prelude::BASE64_STANDARD.encode(&bytes)
        ),
        file_name: path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
    })
}

/// Strip the random `-<alphanumeric>` suffix storage adds before the extension.
///
/// ```
/// use chatwire::core::attachments::display_file_name;
///
/// assert_eq!(display_file_name("report-a1B2c3.pdf"), "report.pdf");
/// assert_eq!(display_file_name("notes.txt"), "notes.txt");
/// ```
pub fn display_file_name(name: &str) -> String {
    let Some((stem, extension)) = name.rsplit_once('.') else {
        return name.to_string();
    };
    if extension.is_empty() {
        return name.to_string();
    }
    match stem.rsplit_once('-') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{base}.{extension}")
        }
        _ => name.to_string(),
    }
}
