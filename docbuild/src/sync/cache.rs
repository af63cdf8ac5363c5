use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const CATEGORY_CACHE_FILE: &str = ".DOCBUILD_categoryCache.json";
pub const FOLDER_CACHE_FILE: &str = ".DOCBUILD_folderCache.json";
pub const ARTICLE_CACHE_FILE: &str = ".DOCBUILD_articleCache.json";
pub const IMAGE_CACHE_FILE: &str = ".DOCBUILD_imageCache.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to store {} cache file(s): {}", .0.len(), join_errors(.0))]
    Save(Vec<CacheError>),
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CategoryCache = BTreeMap<String, u64>;
pub type FolderCache = BTreeMap<String, u64>;
pub type ArticleCache = BTreeMap<String, ArticleRecord>;
pub type ImageCache = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(rename = "folderID")]
    pub folder_id: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl ArticleRecord {
    pub fn local(folder_id: u64, directory: PathBuf) -> Self {
        Self {
            id: None,
            folder_id,
            last_modified: None,
            directory: Some(directory),
        }
    }

    pub fn remote(id: u64, folder_id: u64) -> Self {
        Self {
            id: Some(id),
            folder_id,
            last_modified: None,
            directory: None,
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.directory.is_none()
    }
}

/// The four mappings carried from one run to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSet {
    pub categories: CategoryCache,
    pub folders: FolderCache,
    pub articles: ArticleCache,
    pub images: ImageCache,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            root: source_root.into(),
        }
    }

    pub fn file_paths(&self) -> [PathBuf; 4] {
        [
            self.root.join(CATEGORY_CACHE_FILE),
            self.root.join(FOLDER_CACHE_FILE),
            self.root.join(ARTICLE_CACHE_FILE),
            self.root.join(IMAGE_CACHE_FILE),
        ]
    }

    pub async fn load(&self) -> CacheSet {
        let [categories, folders, articles, images] = self.file_paths();
        CacheSet {
            categories: load_mapping(&categories).await,
            folders: load_mapping(&folders).await,
            articles: load_mapping(&articles).await,
            images: load_mapping(&images).await,
        }
    }

    pub async fn save(&self, caches: &CacheSet) -> Result<(), CacheError> {
        let [categories, folders, articles, images] = self.file_paths();
        let results = [
            write_mapping(&categories, &caches.categories).await,
            write_mapping(&folders, &caches.folders).await,
            write_mapping(&articles, &caches.articles).await,
            write_mapping(&images, &caches.images).await,
        ];
        let errors: Vec<CacheError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Save(errors))
        }
    }

    pub async fn remove_all(&self) -> Result<(), CacheError> {
        for path in self.file_paths() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed cache file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(())
    }
}

async fn load_mapping<T>(path: &Path) -> T
where
    T: Default + Serialize + DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(mapping) => return mapping,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache file is corrupt, starting empty");
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "cache file missing, creating it");
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cache file unreadable, starting empty");
        }
    }

    let empty = T::default();
    if let Err(err) = write_mapping(path, &empty).await {
        warn!(error = %err, "failed to create empty cache file");
    }
    empty
}

async fn write_mapping<T: Serialize>(path: &Path, mapping: &T) -> Result<(), CacheError> {
    let encoded = encode_pretty(mapping).map_err(|source| CacheError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, encoded).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

fn encode_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}
