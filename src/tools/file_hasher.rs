/// 影像像素內容的 hash（寬、高一併納入）
#[must_use]
pub fn calculate_pixel_hash(width: u32, height: u32, pixels: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&width.to_le_bytes());
    hasher.update(&height.to_le_bytes());
    hasher.update(pixels);
    hasher.finalize().to_hex().to_string()
}
