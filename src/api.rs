use std::fs::File;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{GlobalId, Sku};
use crate::error::SyncError;

/// Seam between the pipeline and the publisher's REST API. The pipeline only
/// ever talks to this trait; tests substitute a mock.
pub trait ContentApi: Send + Sync {
    fn volume(&self, id: &GlobalId) -> Result<RemoteVolume, SyncError>;
    fn volume_by_sku(&self, sku: &Sku) -> Result<RemoteVolume, SyncError>;
    fn issue(&self, id: &GlobalId) -> Result<RemoteIssue, SyncError>;
    fn issue_by_sku(&self, sku: &Sku) -> Result<RemoteIssue, SyncError>;
    fn article(&self, id: &GlobalId) -> Result<RemoteArticle, SyncError>;
    fn article_by_sku(&self, sku: &Sku) -> Result<RemoteArticle, SyncError>;
    /// Accepts several ids at once; the endpoint takes a comma-joined list.
    fn media(&self, ids: &[GlobalId]) -> Result<Vec<RemoteAsset>, SyncError>;
    /// Streams a binary (image/audio) to `destination`.
    fn download_file(&self, url: &str, destination: &Utf8Path) -> Result<(), SyncError>;
}

// Request URLs double as status-tracker keys, so they are built in one
// place and reused by the pipeline.

pub fn volume_url(base_url: &str, id: &str) -> String {
    format!("{base_url}volumes/{id}")
}

pub fn issue_url(base_url: &str, id: &str) -> String {
    format!("{base_url}issues/{id}")
}

pub fn article_url(base_url: &str, id: &str) -> String {
    format!("{base_url}articles/{id}")
}

pub fn media_url(base_url: &str, id: &str) -> String {
    format!("{base_url}media/{id}")
}

/// Shared `meta` block the server attaches to volumes, issues, articles and
/// media. Individual resources populate different subsets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeta {
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub published_by: String,
    #[serde(default)]
    pub display_date: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: Option<RemoteUpdated>,
    #[serde(default, rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteUpdated {
    #[serde(default)]
    pub date: String,
}

impl RemoteMeta {
    pub fn updated_date(&self) -> Option<&str> {
        self.updated
            .as_ref()
            .map(|updated| updated.date.as_str())
            .filter(|date| !date.is_empty())
    }
}

/// Reference to a child resource inside a parent payload; only the id is
/// trusted, the child's own endpoint is the source of truth for its fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteChildRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVolume {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub meta: RemoteMeta,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub custom_meta: Value,
    #[serde(default)]
    pub featured_image: String,
    #[serde(default)]
    pub media: Vec<RemoteChildRef>,
    #[serde(default)]
    pub issues: Vec<RemoteChildRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIssue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub meta: RemoteMeta,
    #[serde(default)]
    pub cover_phone: String,
    #[serde(default)]
    pub custom_meta: Value,
    #[serde(default)]
    pub media: Vec<RemoteChildRef>,
    #[serde(default)]
    pub articles: Vec<RemoteChildRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArticle {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_url: String,
    #[serde(default)]
    pub section: String,
    #[serde(default, rename = "type")]
    pub article_type: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub commentary: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub meta: RemoteMeta,
    #[serde(default)]
    pub custom_meta: Value,
    #[serde(default)]
    pub media: Vec<RemoteChildRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAsset {
    pub id: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub cdn_url: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub cdn_url_thumb: String,
    #[serde(default)]
    pub url_thumb: String,
    #[serde(default)]
    pub meta: RemoteMeta,
    #[serde(default)]
    pub custom_meta: Value,
}

impl RemoteAsset {
    /// Preferred URL plus a fallback to retry when the CDN copy fails.
    pub fn original_urls(&self) -> (&str, Option<&str>) {
        if self.cdn_url.is_empty() {
            (&self.url, None)
        } else {
            (&self.cdn_url, Some(self.url.as_str()).filter(|url| !url.is_empty()))
        }
    }

    pub fn thumb_urls(&self) -> (&str, Option<&str>) {
        if self.cdn_url_thumb.is_empty() {
            (&self.url_thumb, None)
        } else {
            (
                &self.cdn_url_thumb,
                Some(self.url_thumb.as_str()).filter(|url| !url.is_empty()),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct VolumesEnvelope {
    #[serde(default)]
    volumes: Vec<RemoteVolume>,
}

#[derive(Debug, Deserialize)]
struct IssuesEnvelope {
    #[serde(default)]
    issues: Vec<RemoteIssue>,
}

#[derive(Debug, Deserialize)]
struct ArticlesEnvelope {
    #[serde(default)]
    articles: Vec<RemoteArticle>,
}

#[derive(Debug, Deserialize)]
struct MediaEnvelope {
    #[serde(default)]
    media: Vec<RemoteAsset>,
}

pub struct HttpContentApi {
    client: Client,
    base_url: String,
}

impl HttpContentApi {
    pub fn new(config: &ResolvedConfig) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kiosk-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::Http(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "method=clientkey,token={}",
                config.client_key
            ))
            .map_err(|err| SyncError::Http(err.to_string()))?,
        );
        if config.preview {
            headers.insert("X-Preview-App", HeaderValue::from_static("preview"));
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyncError::Http(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "content API request failed".to_string());
            return Err(SyncError::ApiStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .map_err(|err| SyncError::Http(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| SyncError::DataShape(err.to_string()))
    }
}

fn single<T>(mut items: Vec<T>, what: &str) -> Result<T, SyncError> {
    if items.is_empty() {
        return Err(SyncError::NotFound(what.to_string()));
    }
    Ok(items.remove(0))
}

impl ContentApi for HttpContentApi {
    fn volume(&self, id: &GlobalId) -> Result<RemoteVolume, SyncError> {
        let envelope: VolumesEnvelope =
            self.get_json(&volume_url(&self.base_url, id.as_str()))?;
        single(envelope.volumes, &format!("volume {id}"))
    }

    fn volume_by_sku(&self, sku: &Sku) -> Result<RemoteVolume, SyncError> {
        let envelope: VolumesEnvelope =
            self.get_json(&format!("{}volumes/sku/{}", self.base_url, sku))?;
        single(envelope.volumes, &format!("volume sku {sku}"))
    }

    fn issue(&self, id: &GlobalId) -> Result<RemoteIssue, SyncError> {
        let envelope: IssuesEnvelope = self.get_json(&issue_url(&self.base_url, id.as_str()))?;
        single(envelope.issues, &format!("issue {id}"))
    }

    fn issue_by_sku(&self, sku: &Sku) -> Result<RemoteIssue, SyncError> {
        let envelope: IssuesEnvelope =
            self.get_json(&format!("{}issues/sku/{}", self.base_url, sku))?;
        single(envelope.issues, &format!("issue sku {sku}"))
    }

    fn article(&self, id: &GlobalId) -> Result<RemoteArticle, SyncError> {
        let envelope: ArticlesEnvelope =
            self.get_json(&article_url(&self.base_url, id.as_str()))?;
        single(envelope.articles, &format!("article {id}"))
    }

    fn article_by_sku(&self, sku: &Sku) -> Result<RemoteArticle, SyncError> {
        let envelope: ArticlesEnvelope =
            self.get_json(&format!("{}articles/sku/{}", self.base_url, sku))?;
        single(envelope.articles, &format!("article sku {sku}"))
    }

    fn media(&self, ids: &[GlobalId]) -> Result<Vec<RemoteAsset>, SyncError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(GlobalId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let envelope: MediaEnvelope = self.get_json(&media_url(&self.base_url, &joined))?;
        Ok(envelope.media)
    }

    fn download_file(&self, url: &str, destination: &Utf8Path) -> Result<(), SyncError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ApiStatus {
                status: status.as_u16(),
                message: format!("file download failed: {url}"),
            });
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        }
        let mut file = File::create(destination.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
