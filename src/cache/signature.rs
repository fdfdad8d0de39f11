//! Signature key computation (spec.md §4.6): content hash + perceptual hash.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::decode::DecodedImage;
use crate::error::CacheError;

const CONTENT_HASH_PREFIX_BYTES: usize = 64 * 1024;

/// The two keys a fast-path lookup is performed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureKey {
    pub content_hash: String,
    pub perceptual_hash: u64,
    pub file_size: u64,
    pub combined_key: String,
}

/// `content_hash = sha256(first 64 KiB of file ∥ 8-byte LE file length)`.
/// Reads at most 64 KiB off disk regardless of file size.
pub fn compute_content_hash(path: &Path) -> Result<(String, u64), CacheError> {
    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len();

    let mut file = std::fs::File::open(path)?;
    let mut prefix = vec![0u8; CONTENT_HASH_PREFIX_BYTES.min(file_size as usize)];
    std::io::Read::read_exact(&mut file, &mut prefix)?;

    let mut hasher = Sha256::new();
    hasher.update(&prefix);
    hasher.update(file_size.to_le_bytes());
    Ok((hex::encode(hasher.finalize()), file_size))
}

/// 64-bit average hash (aHash) over an 8x8 grayscale resample of the decoded
/// image, ITU-R BT.601 luminance weights. Bit `i` is set iff pixel `i` is at
/// or above the mean pixel value.
pub fn compute_perceptual_hash(image: &DecodedImage) -> u64 {
    const GRID: usize = 8;
    let mut samples = [0f64; GRID * GRID];

    for (i, sample) in samples.iter_mut().enumerate() {
        let gx = i % GRID;
        let gy = i / GRID;
        let src_x = (gx * image.width.max(1) as usize / GRID).min(image.width.saturating_sub(1) as usize);
        let src_y = (gy * image.height.max(1) as usize / GRID).min(image.height.saturating_sub(1) as usize);
        let offset = (src_y * image.width as usize + src_x) * 4;
        let pixel = image.rgba.get(offset..offset + 3).unwrap_or(&[0, 0, 0]);
        *sample = 0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let mut hash = 0u64;
    for (i, sample) in samples.iter().enumerate() {
        if *sample >= mean {
            hash |= 1 << i;
        }
    }
    hash
}

/// `compute_signature_key` (spec.md §4.6): content hash of the bytes on disk
/// plus the perceptual hash of the already-decoded image.
pub fn compute_signature_key(path: &Path, image: &DecodedImage) -> Result<SignatureKey, CacheError> {
    let (content_hash, file_size) = compute_content_hash(path)?;
    let perceptual_hash = compute_perceptual_hash(image);
    let combined_key = format!("{content_hash}:{perceptual_hash:016x}");
    Ok(SignatureKey {
        content_hash,
        perceptual_hash,
        file_size,
        combined_key,
    })
}

/// Hamming distance between two perceptual hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: (u8, u8, u8)) -> DecodedImage {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            rgba.extend_from_slice(&[rgb.0, rgb.1, rgb.2, 255]);
        }
        DecodedImage::still(width, height, rgba, "png")
    }

    #[test]
    fn identical_solid_images_hash_to_zero_or_all_ones() {
        let image = solid(16, 16, (40, 40, 40));
        let hash = compute_perceptual_hash(&image);
        // Every sample equals the mean, so every bit is set (>= is inclusive).
        assert_eq!(hash, u64::MAX);
    }

    #[test]
    fn hamming_distance_of_identical_hashes_is_zero() {
        assert_eq!(hamming_distance(0xFF00, 0xFF00), 0);
        assert_eq!(hamming_distance(0x0000, 0xFFFF), 16);
    }
}
