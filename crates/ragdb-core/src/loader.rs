//! Turns a file path into raw text, dispatching on the file extension.
//!
//! Plain-text formats are read directly (with a lossy fallback for mixed
//! encodings); PDF goes through `pdf-extract`. Unknown extensions fail fast
//! instead of silently producing empty text.

use std::fs;
use std::path::Path;

use crate::error::LoadError;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "log", "csv"];

/// Extensions [`load`] accepts, for upstream file discovery.
pub fn supported_extensions() -> &'static [&'static str] {
    const ALL: &[&str] = &["txt", "text", "md", "markdown", "log", "csv", "pdf"];
    ALL
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| supported_extensions().contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract the text content of the document at `path`.
pub fn load(path: &Path) -> Result<String, LoadError> {
    let display = path.display().to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let text = if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        read_text(path, &display)?
    } else if extension == "pdf" {
        pdf_extract::extract_text(path).map_err(|e| LoadError::Extract {
            path: display.clone(),
            reason: e.to_string(),
        })?
    } else {
        return Err(LoadError::UnsupportedFormat { path: display, extension });
    };

    if text.trim().is_empty() {
        return Err(LoadError::EmptyDocument { path: display });
    }
    Ok(text)
}

fn read_text(path: &Path, display: &str) -> Result<String, LoadError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            // Not valid UTF-8; salvage what we can.
            let bytes = fs::read(path).map_err(|source| LoadError::Unreadable {
                path: display.to_string(),
                source,
            })?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
        Err(source) => Err(LoadError::Unreadable { path: display.to_string(), source }),
    }
}
