use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use freshdesk_core::{
    ArticlePayload, Collection, FreshdeskClient, FreshdeskError, NewEntry, Visibility,
};
use futures_util::future::join_all;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::cache::{ArticleRecord, CacheError, CacheSet, CacheStore, CategoryCache, FolderCache};
use super::scanner::{self, ScanError};
use crate::render::Render;

// Body of the placeholder article created before real content is rendered.
const PLACEHOLDER_BODY: &str = "<p>This article is being prepared.</p>";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to resolve category {name}: {source}")]
    Category {
        name: String,
        source: FreshdeskError,
    },
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("source root has no usable name: {0}")]
    InvalidRoot(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FolderListing,
    FolderCreate,
    ArticleScan,
    ArticleListing,
    Placeholder,
    Render,
    Update,
}

/// One entity that could not be synchronized during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub stage: Stage,
    pub name: String,
    pub reason: String,
}

impl Failure {
    fn new(stage: Stage, name: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            stage,
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub category_id: u64,
    pub category_created: bool,
    pub folders_created: usize,
    pub articles_created: usize,
    pub articles_pushed: usize,
    pub skipped_missing: usize,
    pub failures: Vec<Failure>,
}

impl SyncReport {
    fn fail(&mut self, failure: Failure) {
        warn!(stage = ?failure.stage, name = %failure.name, reason = %failure.reason, "sync step failed");
        self.failures.push(failure);
    }
}

struct PendingUpdate {
    name: String,
    id: u64,
    modified: OffsetDateTime,
    payload: ArticlePayload,
}

pub struct Reconciler<R> {
    client: FreshdeskClient,
    renderer: R,
    source_root: PathBuf,
    visibility: Visibility,
    backoff: Backoff,
}

impl<R: Render> Reconciler<R> {
    pub fn new(client: FreshdeskClient, renderer: R, source_root: PathBuf) -> Self {
        Self {
            client,
            renderer,
            source_root,
            visibility: Visibility::Draft,
            backoff: Backoff::new(Duration::from_millis(500), Duration::from_secs(10), true),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Loads the caches, reconciles everything and persists the caches again.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let store = CacheStore::new(&self.source_root);
        let mut caches = store.load().await;
        let outcome = self.reconcile(&mut caches).await;
        let saved = store.save(&caches).await;
        if outcome.is_err()
            && let Err(err) = &saved
        {
            warn!(error = %err, "failed to persist caches");
        }
        let report = outcome?;
        saved?;
        Ok(report)
    }

    pub async fn reconcile(&self, caches: &mut CacheSet) -> Result<SyncReport, SyncError> {
        let category_name = category_name(&self.source_root).await?;
        let chapters = scanner::list_chapters(&self.source_root).await?;
        let (category_id, category_created) = self
            .resolve_category(&category_name, &mut caches.categories)
            .await?;
        let mut report = SyncReport {
            category_id,
            category_created,
            ..SyncReport::default()
        };

        info!(category = %category_name, chapters = chapters.len(), "resolving folders");
        self.resolve_folders(category_id, &chapters, &mut caches.folders, &mut report)
            .await;

        let local = self.register_articles(&chapters, caches, &mut report).await;
        info!(articles = local.len(), "creating placeholder articles");
        let deferred = self.create_placeholders(&local, caches, &mut report).await;

        info!("pushing changed articles");
        self.push_content(caches, &deferred, &mut report).await;
        Ok(report)
    }

    async fn resolve_category(
        &self,
        name: &str,
        categories: &mut CategoryCache,
    ) -> Result<(u64, bool), SyncError> {
        if let Some(id) = categories.get(name) {
            debug!(category = name, id, "category cached");
            return Ok((*id, false));
        }
        let collection = Collection::Categories;
        let to_sync_error = |source| SyncError::Category {
            name: name.to_string(),
            source,
        };
        let found = self
            .backoff
            .retry(|| self.client.find_by_name(&collection, name))
            .await
            .map_err(to_sync_error)?;
        let (id, created) = match found {
            Some(id) => {
                info!(category = name, id, "found remote category");
                (id, false)
            }
            None => {
                let entry = NewEntry::category(name);
                let id = self
                    .backoff
                    .retry_create(|| self.client.create(&collection, &entry))
                    .await
                    .map_err(to_sync_error)?;
                info!(category = name, id, "created category");
                (id, true)
            }
        };
        categories.insert(name.to_string(), id);
        Ok((id, created))
    }

    async fn resolve_folders(
        &self,
        category_id: u64,
        chapters: &[String],
        folders: &mut FolderCache,
        report: &mut SyncReport,
    ) {
        let collection = Collection::Folders { category_id };
        let mut checked_online = false;
        let mut listing_failed = false;

        for chapter in chapters {
            if folders.contains_key(chapter) {
                continue;
            }
            if !checked_online {
                checked_online = true;
                match self
                    .backoff
                    .retry(|| self.client.list_all(&collection))
                    .await
                {
                    Ok(remote) => {
                        debug!(found = remote.len(), "listed remote folders");
                        for entry in remote {
                            folders.insert(entry.name, entry.id);
                        }
                    }
                    Err(err) => {
                        listing_failed = true;
                        report.fail(Failure::new(Stage::FolderListing, chapter.as_str(), err));
                    }
                }
                if folders.contains_key(chapter) {
                    continue;
                }
            }
            // Without a listing a create could duplicate an existing folder.
            if listing_failed {
                report.fail(Failure::new(
                    Stage::FolderCreate,
                    chapter.as_str(),
                    "remote folders could not be listed",
                ));
                continue;
            }
            let entry = NewEntry::folder(chapter.as_str());
            match self
                .backoff
                .retry_create(|| self.client.create(&collection, &entry))
                .await
            {
                Ok(id) => {
                    info!(folder = %chapter, id, "created folder");
                    folders.insert(chapter.clone(), id);
                    report.folders_created += 1;
                }
                Err(err) => report.fail(Failure::new(Stage::FolderCreate, chapter.as_str(), err)),
            }
        }
    }

    /// Records every local markdown file under a resolved folder; returns the article names seen.
    async fn register_articles(
        &self,
        chapters: &[String],
        caches: &mut CacheSet,
        report: &mut SyncReport,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        for chapter in chapters {
            let Some(&folder_id) = caches.folders.get(chapter) else {
                debug!(chapter = %chapter, "folder unresolved, skipping chapter");
                continue;
            };
            let files = match scanner::list_articles(&self.source_root.join(chapter)).await {
                Ok(files) => files,
                Err(err) => {
                    report.fail(Failure::new(Stage::ArticleScan, chapter.as_str(), err));
                    continue;
                }
            };
            for file in files {
                let name = scanner::article_name(&file).to_string();
                let directory = Path::new(chapter).join(&file);
                if !seen.insert(name.clone()) {
                    warn!(article = %name, path = %directory.display(), "duplicate article name, skipping");
                    continue;
                }
                match caches.articles.get_mut(&name) {
                    Some(record) => {
                        record.folder_id = folder_id;
                        record.directory = Some(directory);
                    }
                    None => {
                        caches
                            .articles
                            .insert(name, ArticleRecord::local(folder_id, directory));
                    }
                }
            }
        }
        seen
    }

    /// Returns the articles left without a remote id by a failure already reported.
    async fn create_placeholders(
        &self,
        local: &BTreeSet<String>,
        caches: &mut CacheSet,
        report: &mut SyncReport,
    ) -> BTreeSet<String> {
        let unresolved_folders: BTreeSet<u64> = local
            .iter()
            .filter_map(|name| caches.articles.get(name))
            .filter(|record| record.id.is_none())
            .map(|record| record.folder_id)
            .collect();
        if unresolved_folders.is_empty() {
            return BTreeSet::new();
        }

        let listings = join_all(unresolved_folders.iter().map(|&folder_id| async move {
            let collection = Collection::Articles { folder_id };
            let result = self
                .backoff
                .retry(|| self.client.list_all(&collection))
                .await;
            (folder_id, result)
        }))
        .await;

        let mut listed = BTreeSet::new();
        for (folder_id, result) in listings {
            match result {
                Ok(entries) => {
                    listed.insert(folder_id);
                    for entry in entries {
                        let remote_folder = entry.parent_id.unwrap_or(folder_id);
                        match caches.articles.get_mut(&entry.name) {
                            Some(record) if record.id.is_none() => {
                                debug!(article = %entry.name, id = entry.id, "adopted remote article");
                                record.id = Some(entry.id);
                                record.folder_id = remote_folder;
                            }
                            Some(_) => {}
                            None => {
                                caches
                                    .articles
                                    .insert(entry.name, ArticleRecord::remote(entry.id, remote_folder));
                            }
                        }
                    }
                }
                Err(err) => report.fail(Failure::new(
                    Stage::ArticleListing,
                    format!("folder {folder_id}"),
                    err,
                )),
            }
        }

        let mut deferred = BTreeSet::new();
        let mut pending: Vec<(String, u64)> = Vec::new();
        for name in local {
            let Some(record) = caches.articles.get(name) else {
                continue;
            };
            if record.id.is_some() {
                continue;
            }
            if listed.contains(&record.folder_id) {
                pending.push((name.clone(), record.folder_id));
            } else {
                debug!(article = %name, folder = record.folder_id, "folder not listed, no placeholder");
                deferred.insert(name.clone());
            }
        }

        let created = join_all(pending.iter().map(|(name, folder_id)| async move {
            let payload = ArticlePayload::new(name.as_str(), PLACEHOLDER_BODY, self.visibility);
            self.backoff
                .retry_create(|| self.client.create_article(*folder_id, &payload))
                .await
        }))
        .await;

        for ((name, _), result) in pending.into_iter().zip(created) {
            match result {
                Ok(id) => {
                    debug!(article = %name, id, "created placeholder article");
                    if let Some(record) = caches.articles.get_mut(&name) {
                        record.id = Some(id);
                    }
                    report.articles_created += 1;
                }
                Err(err) => {
                    deferred.insert(name.clone());
                    report.fail(Failure::new(Stage::Placeholder, name, err));
                }
            }
        }
        deferred
    }

    async fn push_content(
        &self,
        caches: &mut CacheSet,
        deferred: &BTreeSet<String>,
        report: &mut SyncReport,
    ) {
        let mut jobs = Vec::new();
        for (name, record) in &caches.articles {
            let Some(relative) = &record.directory else {
                continue;
            };
            let path = self.source_root.join(relative);
            let modified = match scanner::last_modified(&path).await {
                Ok(modified) => modified,
                Err(ScanError::Missing(_)) => {
                    debug!(article = %name, "local file is gone, nothing to push");
                    report.skipped_missing += 1;
                    continue;
                }
                Err(err) => {
                    report.fail(Failure::new(Stage::Update, name.as_str(), err));
                    continue;
                }
            };
            if record
                .last_modified
                .is_some_and(|pushed| pushed >= modified)
            {
                continue;
            }
            let Some(id) = record.id else {
                if !deferred.contains(name) {
                    report.fail(Failure::new(Stage::Update, name.as_str(), "article has no remote id"));
                }
                continue;
            };
            let markdown = match tokio::fs::read_to_string(&path).await {
                Ok(markdown) => markdown,
                Err(err) => {
                    report.fail(Failure::new(Stage::Render, name.as_str(), err));
                    continue;
                }
            };
            let html = match self.renderer.render(&markdown, caches) {
                Ok(html) => html,
                Err(err) => {
                    report.fail(Failure::new(Stage::Render, name.as_str(), err));
                    continue;
                }
            };
            jobs.push(PendingUpdate {
                name: name.clone(),
                id,
                modified,
                payload: ArticlePayload::new(name.as_str(), html, self.visibility),
            });
        }

        let results = join_all(jobs.iter().map(|job| {
            self.backoff
                .retry(|| self.client.update_article(job.id, &job.payload))
        }))
        .await;

        let mut pushed = BTreeMap::new();
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(article = %job.name, id = job.id, "pushed article");
                    pushed.insert(job.name, job.modified);
                }
                Err(err) => report.fail(Failure::new(Stage::Update, job.name, err)),
            }
        }
        for (name, modified) in pushed {
            if let Some(record) = caches.articles.get_mut(&name) {
                record.last_modified = Some(modified);
                report.articles_pushed += 1;
            }
        }
    }
}

async fn category_name(root: &Path) -> Result<String, SyncError> {
    if let Some(name) = root.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| SyncError::InvalidRoot(root.to_path_buf()))?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| SyncError::InvalidRoot(root.to_path_buf()))
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
