use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;

const MARKDOWN_EXTENSION: &str = "md";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("path no longer exists: {0}")]
    Missing(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ScanError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ScanError::Missing(path.to_path_buf())
        } else {
            ScanError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Names of the chapter directories directly under `root`, sorted for stable logs.
pub async fn list_chapters(root: &Path) -> Result<Vec<String>, ScanError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|err| ScanError::from_io(root, err))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| ScanError::from_io(root, err))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|err| ScanError::from_io(&entry.path(), err))?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Markdown file names directly inside `chapter`.
pub async fn list_articles(chapter: &Path) -> Result<Vec<String>, ScanError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(chapter)
        .await
        .map_err(|err| ScanError::from_io(chapter, err))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| ScanError::from_io(chapter, err))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|err| ScanError::from_io(&path, err))?;
        if file_type.is_file() && is_markdown(&path) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

pub async fn last_modified(path: &Path) -> Result<OffsetDateTime, ScanError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|err| ScanError::from_io(path, err))?;
    let modified = meta.modified().map_err(|err| ScanError::from_io(path, err))?;
    Ok(OffsetDateTime::from(modified))
}

/// Cache key for an article file: its name without the markdown extension.
pub fn article_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}
