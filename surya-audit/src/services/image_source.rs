//! Rooftop image sources
//!
//! The pipeline consumes raster bytes for a site. `LocalImageSource` reads
//! images already present under the root folder; `StaticMapsSource` fetches
//! from a static-maps provider and caches the result next to the local ones.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use surya_common::config::ImageryConfig;
use thiserror::Error;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("surya-audit/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Extensions tried by [`LocalImageSource`], in order
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No image for {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error {0}: {1}")]
    Provider(u16, String),

    #[error("Provider returned an error body: {0}")]
    ErrorBody(String),

    #[error("No maps API key configured")]
    MissingApiKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to fetch for one site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRequest {
    pub sample_id: String,
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    /// `<width>x<height>`
    pub size: String,
    pub map_type: String,
}

impl SiteRequest {
    pub fn new(sample_id: impl Into<String>, lat: f64, lon: f64, zoom: u8, imagery: &ImageryConfig) -> Self {
        Self {
            sample_id: sample_id.into(),
            lat,
            lon,
            zoom,
            size: imagery.size.clone(),
            map_type: imagery.map_type.clone(),
        }
    }
}

/// Source of raster bytes for a site
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Provider label recorded in the record's image metadata
    fn name(&self) -> &str;

    async fn fetch(&self, request: &SiteRequest) -> Result<Vec<u8>, FetchError>;
}

/// Images already on disk as `<dir>/<sample_id>.<png|jpg|jpeg>`
#[derive(Debug, Clone)]
pub struct LocalImageSource {
    dir: PathBuf,
}

impl LocalImageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Image file for `sample_id`; extensions match case-insensitively
    pub fn path_for(&self, sample_id: &str) -> Option<PathBuf> {
        let exact = IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", sample_id, ext)))
            .find(|p| p.is_file());
        if exact.is_some() {
            return exact;
        }

        let mut matches: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && image_stem(p) == Some(sample_id))
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    /// Sample ids of every image in the directory, sorted and deduplicated
    pub fn list_sample_ids(&self) -> std::io::Result<Vec<String>> {
        let mut ids = Vec::new();
        if !self.dir.exists() {
            return Ok(ids);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(stem) = image_stem(&path) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// File stem of a path with an image extension in any case
fn image_stem(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()?.to_str()
}

#[async_trait]
impl ImageSource for LocalImageSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self, request: &SiteRequest) -> Result<Vec<u8>, FetchError> {
        let path = self
            .path_for(&request.sample_id)
            .ok_or_else(|| FetchError::NotFound(request.sample_id.clone()))?;
        debug!(sample_id = %request.sample_id, path = %path.display(), "Reading local image");
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Static-maps HTTP provider with an on-disk cache
pub struct StaticMapsSource {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    cache_dir: PathBuf,
}

impl StaticMapsSource {
    pub fn new(imagery: &ImageryConfig, api_key: Option<String>, cache_dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(FetchError::MissingApiKey)?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: imagery.base_url.clone(),
            api_key,
            cache_dir: cache_dir.into(),
        })
    }

    fn cache_path(&self, sample_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.png", sample_id))
    }

    async fn store(&self, path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageSource for StaticMapsSource {
    fn name(&self) -> &str {
        "Google Static Maps"
    }

    async fn fetch(&self, request: &SiteRequest) -> Result<Vec<u8>, FetchError> {
        let center = format!("{},{}", request.lat, request.lon);
        let zoom = request.zoom.to_string();
        let params = [
            ("center", center.as_str()),
            ("zoom", zoom.as_str()),
            ("size", request.size.as_str()),
            ("maptype", request.map_type.as_str()),
            ("key", self.api_key.as_str()),
        ];

        debug!(sample_id = %request.sample_id, %center, zoom = request.zoom, "Requesting static map");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Provider(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
            .to_vec();
        check_error_body(&bytes)?;

        let path = self.cache_path(&request.sample_id);
        self.store(&path, &bytes).await?;
        info!(sample_id = %request.sample_id, bytes = bytes.len(), path = %path.display(), "Image fetched");
        Ok(bytes)
    }
}

/// The provider signals some failures with a 200 and an `error_message` body
fn check_error_body(bytes: &[u8]) -> Result<(), FetchError> {
    const MARKER: &[u8] = b"error_message";
    if bytes.windows(MARKER.len()).any(|w| w == MARKER) {
        let snippet = String::from_utf8_lossy(&bytes[..bytes.len().min(200)]).into_owned();
        return Err(FetchError::ErrorBody(snippet));
    }
    Ok(())
}
