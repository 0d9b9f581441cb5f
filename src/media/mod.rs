//! Media host abstraction and the Cloudinary client behind it
mod cloudinary;
mod error;

use axum::body::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub use cloudinary::{sign_params, CloudinaryClient};
pub use error::{MediaError, MediaResult};

/// An image received from a caller, ready to be forwarded
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    #[must_use]
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// `data:<content-type>;base64,<payload>`, the form the upload API accepts
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

/// What the media host hands back for a stored image
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Durable URL, preferring HTTPS
    pub image_url: String,
    /// Identifier assigned by the host
    pub public_id: String,
    /// Untouched response body, passed through to the caller
    pub raw: serde_json::Value,
}

/// Trait for the external service that stores uploaded images
#[async_trait::async_trait]
pub trait MediaHost: Send + Sync {
    /// Store one image and return where it lives. Never retried.
    async fn upload_image(&self, image: &ImageUpload) -> MediaResult<UploadedImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_embeds_content_type_and_base64() {
        let image = ImageUpload::new("image/png", vec![0x89, b'P', b'N', b'G']);
        assert_eq!(image.data_uri(), "data:image/png;base64,iVBORw==");
    }
}
