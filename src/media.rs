//! Image uploads
//!
//! Uploaded files are sniffed and measured locally, then handed to the
//! configured [`ImageHost`]: Cloudinary, ImageKit, or a local directory served
//! under `/uploads`.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use chrono::Utc;
use image::ImageFormat;
use log::{debug, info};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::{CloudinaryConfig, Config, ImageKitConfig, ImageProviderKind};
use crate::error::{AppError, AppResult};

const DEFAULT_FOLDER: &str = "portfolio";
const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Format and size of an uploaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub extension: &'static str,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// A validated file ready to be stored
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    /// Original file name without directories
    pub file_name: String,
    pub folder: String,
    pub info: ImageInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    /// Identifier used to delete the image later
    pub public_id: String,
    pub provider: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub format: String,
}

/// Somewhere images can be stored and later removed
#[async_trait]
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upload(&self, request: UploadRequest) -> AppResult<UploadedImage>;

    async fn delete(&self, public_id: &str) -> AppResult<()>;
}

/// Build the host selected in the configuration
pub fn host_from_config(config: &Config) -> AppResult<Arc<dyn ImageHost>> {
    let host: Arc<dyn ImageHost> = match (config.image_provider, &config.cloudinary, &config.imagekit)
    {
        (ImageProviderKind::Cloudinary, Some(c), _) => Arc::new(CloudinaryHost::new(c.clone())?),
        (ImageProviderKind::ImageKit, _, Some(c)) => Arc::new(ImageKitHost::new(c.clone())?),
        _ => Arc::new(LocalHost::new(&config.upload_dir, "/uploads")),
    };
    info!("Image uploads go to {}", host.name());
    Ok(host)
}

/// Sniff the image format from its bytes and read its dimensions
pub fn inspect_image(bytes: &[u8]) -> AppResult<ImageInfo> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("uploaded file is empty".into()));
    }

    let format = image::guess_format(bytes)
        .map_err(|_| AppError::UnsupportedMedia("file is not a recognised image".into()))?;
    let (extension, mime) = match format {
        ImageFormat::Png => ("png", "image/png"),
        ImageFormat::Jpeg => ("jpg", "image/jpeg"),
        ImageFormat::Gif => ("gif", "image/gif"),
        ImageFormat::WebP => ("webp", "image/webp"),
        other => {
            return Err(AppError::UnsupportedMedia(format!(
                "{other:?} images are not accepted"
            )));
        }
    };

    let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| AppError::UnsupportedMedia(format!("unreadable image: {e}")))?;

    Ok(ImageInfo {
        extension,
        mime,
        width,
        height,
    })
}

/// Lowercase, keep `[a-z0-9_-/]`, collapse empty segments
pub fn sanitize_folder(folder: &str) -> String {
    let cleaned: Vec<String> = folder
        .split('/')
        .map(|segment| {
            segment
                .trim()
                .to_ascii_lowercase()
                .chars()
                .map(|c| if c == ' ' { '-' } else { c })
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .collect();

    if cleaned.is_empty() {
        DEFAULT_FOLDER.to_string()
    } else {
        cleaned.join("/")
    }
}

fn base_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

fn http_client() -> AppResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
        .build()?)
}

async fn error_body(response: reqwest::Response, service: &str) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Upstream(format!("{service} returned {status}: {body}"))
}

pub struct CloudinaryHost {
    client: Client,
    config: CloudinaryConfig,
    api_base: String,
}

#[derive(Deserialize)]
struct CloudinaryUpload {
    secure_url: String,
    public_id: String,
    width: u32,
    height: u32,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    bytes: Option<usize>,
}

#[derive(Deserialize)]
struct CloudinaryDestroy {
    result: String,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            config,
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        })
    }

    /// Signature over the alphabetically sorted parameters followed by the secret
    pub fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.config.cloud_name, action)
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, request: UploadRequest) -> AppResult<UploadedImage> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", request.folder.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);

        let file = Part::bytes(request.bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(request.info.mime)?;
        let form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", request.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        debug!("Uploading {} to Cloudinary", request.file_name);
        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_body(response, "Cloudinary").await);
        }

        let uploaded: CloudinaryUpload = response.json().await?;
        Ok(UploadedImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            provider: self.name().to_string(),
            width: uploaded.width,
            height: uploaded.height,
            bytes: uploaded.bytes.unwrap_or(request.bytes.len()),
            format: uploaded
                .format
                .unwrap_or_else(|| request.info.extension.to_string()),
        })
    }

    async fn delete(&self, public_id: &str) -> AppResult<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_body(response, "Cloudinary").await);
        }

        let destroyed: CloudinaryDestroy = response.json().await?;
        match destroyed.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(AppError::not_found("Image")),
            other => Err(AppError::Upstream(format!("Cloudinary destroy: {other}"))),
        }
    }
}

pub struct ImageKitHost {
    client: Client,
    config: ImageKitConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageKitUpload {
    file_id: String,
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    size: Option<usize>,
}

impl ImageKitHost {
    pub fn new(config: ImageKitConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }
}

#[async_trait]
impl ImageHost for ImageKitHost {
    fn name(&self) -> &'static str {
        "imagekit"
    }

    async fn upload(&self, request: UploadRequest) -> AppResult<UploadedImage> {
        let file = Part::bytes(request.bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(request.info.mime)?;
        let form = Form::new()
            .part("file", file)
            .text("fileName", request.file_name.clone())
            .text("folder", format!("/{}", request.folder))
            .text("useUniqueFileName", "true");

        debug!("Uploading {} to ImageKit", request.file_name);
        let response = self
            .client
            .post("https://upload.imagekit.io/api/v1/files/upload")
            .basic_auth(&self.config.private_key, Some(""))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_body(response, "ImageKit").await);
        }

        let uploaded: ImageKitUpload = response.json().await?;
        Ok(UploadedImage {
            url: uploaded.url,
            public_id: uploaded.file_id,
            provider: self.name().to_string(),
            width: uploaded.width.unwrap_or(request.info.width),
            height: uploaded.height.unwrap_or(request.info.height),
            bytes: uploaded.size.unwrap_or(request.bytes.len()),
            format: request.info.extension.to_string(),
        })
    }

    async fn delete(&self, public_id: &str) -> AppResult<()> {
        let url = format!(
            "https://api.imagekit.io/v1/files/{}",
            urlencoding::encode(public_id)
        );
        let response = self
            .client
            .delete(url)
            .basic_auth(&self.config.private_key, Some(""))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(AppError::not_found("Image")),
            _ => Err(error_body(response, "ImageKit").await),
        }
    }
}

/// Stores images on disk and serves them from `public_prefix`
pub struct LocalHost {
    root: PathBuf,
    public_prefix: String,
}

impl LocalHost {
    pub fn new(root: impl AsRef<Path>, public_prefix: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a public id to a path inside the root, rejecting traversal
    fn resolve(&self, public_id: &str) -> AppResult<PathBuf> {
        let relative = Path::new(public_id);
        if public_id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::BadRequest("invalid image id".into()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageHost for LocalHost {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, request: UploadRequest) -> AppResult<UploadedImage> {
        let public_id = format!(
            "{}/{}.{}",
            request.folder,
            Uuid::new_v4(),
            request.info.extension
        );
        let path = self.resolve(&public_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &request.bytes).await?;

        Ok(UploadedImage {
            url: format!("{}/{}", self.public_prefix, public_id),
            public_id,
            provider: self.name().to_string(),
            width: request.info.width,
            height: request.info.height,
            bytes: request.bytes.len(),
            format: request.info.extension.to_string(),
        })
    }

    async fn delete(&self, public_id: &str) -> AppResult<()> {
        let path = self.resolve(public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::not_found("Image")),
            Err(e) => Err(e.into()),
        }
    }
}

// Web handler functions below

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageQuery {
    #[serde(alias = "public_id")]
    pub public_id: String,
}

/// Accepts a multipart form with an `image` (or `file`) field and an optional
/// `folder` field
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadedImage>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut folder = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "image" | "file" => {
                let name = base_file_name(field.file_name().unwrap_or("upload"));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
                file = Some((name, bytes.to_vec()));
            }
            "folder" => {
                folder = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read folder: {e}")))?;
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| AppError::BadRequest("No image field in upload".into()))?;
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(state.config.max_upload_bytes));
    }
    let info = inspect_image(&bytes)?;

    let uploaded = state
        .images
        .upload(UploadRequest {
            bytes,
            file_name,
            folder: sanitize_folder(&folder),
            info,
        })
        .await?;
    info!(
        "Uploaded {} ({}x{}) to {}",
        uploaded.public_id, uploaded.width, uploaded.height, uploaded.provider
    );
    Ok(Json(uploaded))
}

pub async fn handle_delete_upload(
    State(state): State<AppState>,
    Query(query): Query<DeleteImageQuery>,
) -> AppResult<Json<serde_json::Value>> {
    state.images.delete(&query.public_id).await?;
    info!("Deleted image {}", query.public_id);
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_inspect_png() {
        let info = inspect_image(&png_bytes(4, 3)).unwrap();
        assert_eq!(info.extension, "png");
        assert_eq!(info.mime, "image/png");
        assert_eq!((info.width, info.height), (4, 3));
    }

    #[test]
    fn test_inspect_rejects_non_images() {
        assert!(matches!(inspect_image(b""), Err(AppError::BadRequest(_))));
        assert!(matches!(
            inspect_image(b"%PDF-1.7 not an image"),
            Err(AppError::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn test_sanitize_folder() {
        assert_eq!(sanitize_folder(""), "portfolio");
        assert_eq!(sanitize_folder("Carousel Images"), "carousel-images");
        assert_eq!(sanitize_folder("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_folder("projects//2024/"), "projects/2024");
    }

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("C:\\photos\\me.png"), "me.png");
        assert_eq!(base_file_name("a/b/c.jpg"), "c.jpg");
        assert_eq!(base_file_name(""), "upload");
    }

    #[test]
    fn test_cloudinary_signature_is_order_independent() {
        let host = CloudinaryHost::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        })
        .unwrap();

        let a = host.sign(&[("timestamp", "1700000000"), ("folder", "portfolio")]);
        let b = host.sign(&[("folder", "portfolio"), ("timestamp", "1700000000")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=portfolio&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
        assert_eq!(
            host.endpoint("upload"),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }

    #[tokio::test]
    async fn test_local_host_roundtrip() {
        let dir = TempDir::new().unwrap();
        let host = LocalHost::new(dir.path(), "/uploads/");
        let bytes = png_bytes(2, 2);
        let info = inspect_image(&bytes).unwrap();

        let uploaded = host
            .upload(UploadRequest {
                bytes,
                file_name: "me.png".into(),
                folder: "carousel".into(),
                info,
            })
            .await
            .unwrap();
        assert!(uploaded.public_id.starts_with("carousel/"));
        assert!(uploaded.url.starts_with("/uploads/carousel/"));
        assert!(dir.path().join(&uploaded.public_id).exists());

        host.delete(&uploaded.public_id).await.unwrap();
        assert!(!dir.path().join(&uploaded.public_id).exists());
        assert!(matches!(
            host.delete(&uploaded.public_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            host.delete("../secrets.json").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
