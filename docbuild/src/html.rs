//! Standalone HTML export of a document tree.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::render::Render;
use crate::sync::cache::{CacheSet, CacheStore};
use crate::sync::scanner::{self, ScanError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: usize,
    pub failures: Vec<(PathBuf, String)>,
}

pub struct HtmlExport<R> {
    renderer: R,
    source_root: PathBuf,
    destination: PathBuf,
}

impl<R: Render> HtmlExport<R> {
    pub fn new(renderer: R, source_root: PathBuf, destination: PathBuf) -> Self {
        Self {
            renderer,
            source_root,
            destination,
        }
    }

    /// Renders every article to `<destination>/<article>.html`.
    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        let chapters = scanner::list_chapters(&self.source_root).await?;
        let caches = CacheStore::new(&self.source_root).load().await;
        tokio::fs::create_dir_all(&self.destination)
            .await
            .map_err(|source| ExportError::Io {
                path: self.destination.clone(),
                source,
            })?;

        let mut report = ExportReport::default();
        let mut seen = BTreeSet::new();
        for chapter in &chapters {
            let chapter_dir = self.source_root.join(chapter);
            let files = match scanner::list_articles(&chapter_dir).await {
                Ok(files) => files,
                Err(err) => {
                    warn!(chapter = %chapter, error = %err, "cannot list chapter");
                    report.failures.push((chapter_dir, err.to_string()));
                    continue;
                }
            };
            for file in files {
                let name = scanner::article_name(&file).to_string();
                let source = chapter_dir.join(&file);
                if !seen.insert(name.clone()) {
                    warn!(article = %name, path = %source.display(), "duplicate article name, skipping");
                    continue;
                }
                let target = self.destination.join(format!("{name}.html"));
                match self.export_one(&source, &target, &caches).await {
                    Ok(()) => {
                        debug!(article = %name, target = %target.display(), "wrote html");
                        report.written += 1;
                    }
                    Err(reason) => {
                        warn!(article = %name, reason = %reason, "html export failed");
                        report.failures.push((source, reason));
                    }
                }
            }
        }
        info!(written = report.written, destination = %self.destination.display(), "html export done");
        Ok(report)
    }

    async fn export_one(&self, source: &Path, target: &Path, caches: &CacheSet) -> Result<(), String> {
        let markdown = tokio::fs::read_to_string(source)
            .await
            .map_err(|err| err.to_string())?;
        let html = self
            .renderer
            .render(&markdown, caches)
            .map_err(|err| err.to_string())?;
        tokio::fs::write(target, html)
            .await
            .map_err(|err| err.to_string())
    }
}
