use base64::Engine;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Problems with the uploaded photo. All map to 400; no model call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Image file is required.")]
    MissingImage,

    #[error("Image file is empty.")]
    EmptyImage,

    #[error("Image is too large ({size} bytes, maximum {max}).")]
    TooLarge { size: usize, max: usize },

    #[error("Uploaded file is not a readable image: {0}")]
    NotAnImage(String),
}

/// Detect an image MIME type from magic bytes.
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    // GIF87a / GIF89a
    if bytes.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    // WebP: RIFF....WEBP
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some("image/webp");
    }
    None
}

/// Fallback MIME from the multipart content type, then the file name.
fn declared_image_mime(content_type: Option<&str>, file_name: Option<&str>) -> Option<String> {
    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence.starts_with("image/") {
            return Some(essence);
        }
    }
    let guessed = mime_guess::from_path(file_name?).first()?;
    (guessed.type_() == mime_guess::mime::IMAGE).then(|| guessed.essence_str().to_string())
}

/// A validated upload, encoded once for the model call and for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime: String,
    pub base64: String,
    /// Lowercase hex SHA-256 of the raw bytes.
    pub sha256: String,
    pub size_bytes: usize,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub fn from_upload(
        bytes: &[u8],
        content_type: Option<&str>,
        file_name: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, InputError> {
        if bytes.is_empty() {
            return Err(InputError::EmptyImage);
        }
        if bytes.len() > max_bytes {
            return Err(InputError::TooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }

        let decoded =
            image::load_from_memory(bytes).map_err(|e| InputError::NotAnImage(e.to_string()))?;
        let (width, height) = decoded.dimensions();

        let mime = detect_image_mime(bytes)
            .map(str::to_string)
            .or_else(|| declared_image_mime(content_type, file_name))
            .unwrap_or_else(|| "image/jpeg".to_string());

        Ok(Self {
            mime,
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            sha256: format!("{:x}", Sha256::digest(bytes)),
            size_bytes: bytes.len(),
            width,
            height,
        })
    }

    /// `data:<mime>;base64,...` URL for an image content part.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}
