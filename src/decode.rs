//! Image decoding contract (spec.md §1 non-goal: the concrete codec is an
//! external collaborator). The orchestrator owns the decoded handle
//! exclusively for the run; waves receive a read-only view (spec.md §5).

use async_trait::async_trait;

/// A decoded image handle. Pixel data is exposed as packed 8-bit RGBA rows,
/// top-to-bottom, left-to-right - the lowest common denominator any codec
/// crate can produce.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    /// Additional decoded frames for animated inputs (GIF/APNG/WebP). Empty
    /// for still images. `rgba` above is always the first frame.
    pub frames: Vec<Vec<u8>>,
    pub is_animated: bool,
    pub format: String,
}

impl DecodedImage {
    pub fn still(width: u32, height: u32, rgba: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            rgba,
            frames: Vec::new(),
            is_animated: false,
            format: format.into(),
        }
    }

    /// Number of frames, counting the still/first frame.
    pub fn frame_count(&self) -> usize {
        if self.frames.is_empty() {
            1
        } else {
            self.frames.len()
        }
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        if index == 0 {
            Some(&self.rgba)
        } else {
            self.frames.get(index - 1).map(|f| f.as_slice())
        }
    }
}

/// Decoding errors a codec implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unreadable image at {0}: {1}")]
    Unreadable(String, String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// External collaborator: decodes a file on disk into a [`DecodedImage`].
/// The core never implements the actual codec (spec.md §1 non-goal); tests
/// use a deterministic in-memory double.
#[async_trait]
pub trait ImageDecoder: Send + Sync {
    async fn decode(&self, path: &std::path::Path) -> Result<DecodedImage, DecodeError>;
}
