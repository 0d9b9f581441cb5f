use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use url::Url;

use super::{ImageUpload, MediaError, MediaHost, MediaResult, UploadedImage};
use crate::config::{CloudinaryConfig, SignatureAlgorithm, UploadAuth};

/// Maximum number of idle connections to maintain per host
const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;

/// Uploads images to Cloudinary's REST upload endpoint.
///
/// Every request goes through a single `reqwest` client that carries the
/// configured timeout, so a stalled upload can never hold a handler forever.
pub struct CloudinaryClient {
    http: Client,
    upload_url: Url,
    folder: String,
    auth: UploadAuth,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudinaryClient {
    /// Builds the client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Transport` if the HTTP client cannot be constructed
    pub fn new(config: &CloudinaryConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .user_agent(concat!("visit-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            upload_url: config.upload_url.clone(),
            folder: config.folder.clone(),
            auth: config.auth.clone(),
        })
    }

    fn form_fields(&self, file: String, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut fields = vec![("file", file), ("folder", self.folder.clone())];

        match &self.auth {
            UploadAuth::Unsigned { upload_preset } => {
                fields.push(("upload_preset", upload_preset.clone()));
            }
            UploadAuth::Signed {
                api_key,
                api_secret,
                algorithm,
            } => {
                let timestamp = timestamp.to_string();
                let signature = sign_params(
                    &[("folder", self.folder.as_str()), ("timestamp", timestamp.as_str())],
                    api_secret,
                    *algorithm,
                );
                fields.push(("api_key", api_key.clone()));
                fields.push(("timestamp", timestamp));
                fields.push(("signature", signature));
                if *algorithm == SignatureAlgorithm::Sha256 {
                    fields.push(("signature_algorithm", "sha256".to_string()));
                }
            }
        }

        fields
    }
}

#[async_trait::async_trait]
impl MediaHost for CloudinaryClient {
    async fn upload_image(&self, image: &ImageUpload) -> MediaResult<UploadedImage> {
        let fields = self.form_fields(image.data_uri(), Utc::now().timestamp());

        let response = self
            .http
            .post(self.upload_url.clone())
            .form(&fields)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::warn!(status = status.as_u16(), "Cloudinary rejected upload: {message}");
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let raw: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| MediaError::InvalidResponse(e.to_string()))?;
        let uploaded = parse_upload_response(raw)?;
        tracing::debug!(public_id = %uploaded.public_id, "image stored");
        Ok(uploaded)
    }
}

/// Signs upload parameters the way Cloudinary verifies them: parameters
/// sorted by name, joined as `k=v&k=v`, the API secret appended, then the
/// hex digest of the whole string.
#[must_use]
pub fn sign_params(params: &[(&str, &str)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let payload = format!("{to_sign}{api_secret}");

    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
    }
}

/// `error.message` from a JSON error body, or the body itself.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn parse_upload_response(raw: serde_json::Value) -> MediaResult<UploadedImage> {
    let image_url = raw
        .get("secure_url")
        .or_else(|| raw.get("url"))
        .and_then(serde_json::Value::as_str)
        .ok_or(MediaError::MissingField("secure_url"))?
        .to_string();
    let public_id = raw
        .get("public_id")
        .and_then(serde_json::Value::as_str)
        .ok_or(MediaError::MissingField("public_id"))?
        .to_string();

    Ok(UploadedImage {
        image_url,
        public_id,
        raw,
    })
}
