use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const API_PREFIX: &str = "/api/v2/solutions";
// Freshdesk authenticates with the API key as the username; the password is ignored.
const API_KEY_PASSWORD: &str = "X";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FreshdeskError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// A remote collection that entries can be listed from or created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Categories,
    Folders { category_id: u64 },
    Articles { folder_id: u64 },
}

impl Collection {
    fn path(&self) -> String {
        match self {
            Collection::Categories => format!("{API_PREFIX}/categories"),
            Collection::Folders { category_id } => {
                format!("{API_PREFIX}/categories/{category_id}/folders")
            }
            Collection::Articles { folder_id } => {
                format!("{API_PREFIX}/folders/{folder_id}/articles")
            }
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Categories => write!(f, "categories"),
            Collection::Folders { category_id } => write!(f, "folders of category {category_id}"),
            Collection::Articles { folder_id } => write!(f, "articles of folder {folder_id}"),
        }
    }
}

#[derive(Clone)]
pub struct FreshdeskClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl FreshdeskClient {
    pub fn new(helpdesk_name: &str, token: impl Into<String>) -> Result<Self, FreshdeskError> {
        Self::with_base_url(&format!("https://{helpdesk_name}.freshdesk.com"), token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, FreshdeskError> {
        Ok(Self {
            http: build_http(DEFAULT_TIMEOUT)?,
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FreshdeskError> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn list_page(
        &self,
        collection: &Collection,
        page: u32,
    ) -> Result<Vec<Listing>, FreshdeskError> {
        let mut url = self.endpoint(&collection.path())?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &PAGE_SIZE.to_string());
        let response = self
            .http
            .get(url)
            .basic_auth(&self.token, Some(API_KEY_PASSWORD))
            .send()
            .await?;
        let entries: Vec<RemoteEntry> = Self::handle_response(response).await?;
        Ok(entries.into_iter().map(Listing::from).collect())
    }

    pub async fn list_all(&self, collection: &Collection) -> Result<Vec<Listing>, FreshdeskError> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.list_page(collection, page).await?;
            let full = batch.len() >= PAGE_SIZE;
            let mut fresh = false;
            for entry in batch {
                if seen.insert(entry.id) {
                    fresh = true;
                    items.push(entry);
                }
            }
            // A page with nothing new means the server is not paging.
            if !full || !fresh {
                break;
            }
        }
        Ok(items)
    }

    pub async fn find_by_name(
        &self,
        collection: &Collection,
        name: &str,
    ) -> Result<Option<u64>, FreshdeskError> {
        Ok(self
            .list_all(collection)
            .await?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id))
    }

    pub async fn create(
        &self,
        collection: &Collection,
        entry: &NewEntry,
    ) -> Result<u64, FreshdeskError> {
        let url = self.endpoint(&collection.path())?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.token, Some(API_KEY_PASSWORD))
            .json(entry)
            .send()
            .await?;
        let created: Created = Self::handle_response(response).await?;
        Ok(created.id)
    }

    pub async fn create_article(
        &self,
        folder_id: u64,
        article: &ArticlePayload,
    ) -> Result<u64, FreshdeskError> {
        let url = self.endpoint(&Collection::Articles { folder_id }.path())?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.token, Some(API_KEY_PASSWORD))
            .json(article)
            .send()
            .await?;
        let created: Created = Self::handle_response(response).await?;
        Ok(created.id)
    }

    pub async fn update_article(
        &self,
        article_id: u64,
        article: &ArticlePayload,
    ) -> Result<u64, FreshdeskError> {
        let url = self.endpoint(&format!("{API_PREFIX}/articles/{article_id}"))?;
        let response = self
            .http
            .put(url)
            .basic_auth(&self.token, Some(API_KEY_PASSWORD))
            .json(article)
            .send()
            .await?;
        let updated: Created = Self::handle_response(response).await?;
        Ok(updated.id)
    }

    fn endpoint(&self, path: &str) -> Result<Url, FreshdeskError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FreshdeskError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FreshdeskError::Api { status, body })
        }
    }
}

fn build_http(timeout: Duration) -> Result<Client, FreshdeskError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

impl FreshdeskError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            FreshdeskError::Api { status, .. } => Some(classify_api_status(*status)),
            FreshdeskError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    /// True only for rate-limited requests, which the server rejected unprocessed.
    pub fn is_safe_to_resend(&self) -> bool {
        self.classification() == Some(ApiErrorClass::RateLimit)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Publication state applied to every article created or updated in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Draft,
    Published,
}

impl Visibility {
    pub fn status_code(self) -> u8 {
        match self {
            Visibility::Draft => 1,
            Visibility::Published => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
}

impl From<RemoteEntry> for Listing {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            parent_id: entry.folder_id.or(entry.category_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    id: u64,
    #[serde(alias = "title")]
    name: String,
    #[serde(default)]
    folder_id: Option<u64>,
    #[serde(default)]
    category_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewEntry {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<u8>,
}

impl NewEntry {
    pub fn category(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            visibility: None,
        }
    }

    /// Folders are created visible to all users; article status controls publication.
    pub fn folder(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            visibility: Some(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArticlePayload {
    pub title: String,
    pub description: String,
    pub status: u8,
}

impl ArticlePayload {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: visibility.status_code(),
        }
    }
}
