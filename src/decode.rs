//! Image decoding seams and the file-backed decoder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::debug;

/// A decoded, uploadable image owned by a cache entry.
pub trait Texture: Send + 'static {
    /// Decoded width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Release any backing storage. Called exactly once, on eviction or disposal.
    fn release(&mut self);
}

/// Produces textures from path keys. Runs on the blocking pool.
pub trait ImageSource: Send + Sync + 'static {
    type Output: Texture;

    fn load(&self, path: &str) -> Result<Self::Output>;
}

/// RGBA8 pixels ready for upload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn is_released(&self) -> bool {
        self.pixels.is_empty()
    }
}

impl Texture for DecodedImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn release(&mut self) {
        debug!(path = %self.path, bytes = self.pixels.len(), "releasing decoded image");
        self.pixels = Vec::new();
    }
}

/// Decodes files from disk, honouring EXIF orientation and a texture size cap.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    max_texture_size: u32,
}

impl FileImageSource {
    pub fn new(max_texture_size: u32) -> Self {
        Self {
            max_texture_size: max_texture_size.max(1),
        }
    }
}

impl ImageSource for FileImageSource {
    type Output = DecodedImage;

    fn load(&self, path: &str) -> Result<DecodedImage> {
        let rgba = decode_rgba8_apply_exif(Path::new(path))?;
        let rgba = fit_within(rgba, self.max_texture_size)?;
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            path: path.to_owned(),
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let img = img.to_rgba8();

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(apply_orientation(img, orientation))
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};
    match orientation {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!("exif orientation {} for {}", orientation, path.display());
    Some(orientation)
}

/// Downsizes so the longer edge is at most `max_dim`, keeping aspect ratio.
fn fit_within(source: RgbaImage, max_dim: u32) -> Result<RgbaImage> {
    let (w, h) = source.dimensions();
    let longest = w.max(h);
    if longest <= max_dim {
        return Ok(source);
    }
    let ratio = max_dim as f64 / longest as f64;
    let target_w = ((w as f64 * ratio).round() as u32).max(1);
    let target_h = ((h as f64 * ratio).round() as u32).max(1);

    let src_view = fir::images::ImageRef::new(w, h, source.as_raw(), fir::PixelType::U8x4)
        .context("failed to create source view for texture resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("texture resize failed")?;
    debug!(from_w = w, from_h = h, target_w, target_h, "downsized texture");
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    // JPEG 2x1 with EXIF orientation 6 (rotate 90 CW), base64 encoded
    const ORIENT6_JPEG: &str = concat!(
        "/9j/4AAQSkZJRgABAQAAAQABAAD/4QAiRXhpZgAATU0AKgAAAAgAAQESAAMAAAABAAYAAAAAAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8UHRofHh0aHBwgJC4nICIsIxwcKDcpLDAxNDQ0Hyc5PTgyPC4zNDL/",
        "2wBDAQkJCQwLDBgNDRgyIRwhMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjL/wAARCAABAAIDASIAAhEBAxEB/8QAHwAAAQUBAQEBAQEAAAAAAAAAAAECAwQFBgcICQoL/8QAtRAAAgEDAwIEAwUFBAQAAAF9AQIDAAQRBRIhMUEGE1FhByJxFDKBkaEII0KxwRVS0fAkM2JyggkKFhcYGRolJicoKSo0NTY3ODk6Q0RFRkdISUpTVFVWV1hZWmNkZWZnaGlqc3R1dnd4eXqDhIWGh4iJipKTlJWWl5iZmqKjpKWmp6ipqrKztLW2t7i5usLDxMXGx8jJytLT1NXW19jZ2uHi4+Tl5ufo6erx8vP09fb3+Pn6/8QAHwEAAwEBAQEBAQEBAQAAAAAAAAECAwQFBgcICQoL/8QAtREAAgECBAQDBAcFBAQAAQJ3AAECAxEEBSExBhJBUQdhcRMiMoEIFEKRobHBCSMzUvAVYnLRChYkNOEl8RcYGRomJygpKjU2Nzg5OkNERUZHSElKU1RVVldYWVpjZGVmZ2hpanN0dXZ3eHl6goOEhYaHiImKkpOUlZaXmJmaoqOkpaanqKmqsrO0tba3uLm6wsPExcbHyMnK0tPU1dbX2Nna4uPk5ebn6Onq8vP09fb3+Pn6/9oADAMBAAIRAxEAPwDi6KKK+ZP3E//Z"
    );

    #[test]
    fn applies_orientation_six() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(ORIENT6_JPEG)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orient6.jpg");
        std::fs::write(&path, &bytes).unwrap();

        let img = FileImageSource::new(2048)
            .load(path.to_str().unwrap())
            .unwrap();
        assert_eq!(img.dimensions(), (1, 2));
        assert_eq!(img.pixels.len(), 8);
    }

    #[test]
    fn downsizes_to_texture_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbaImage::from_pixel(400, 100, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let img = FileImageSource::new(200)
            .load(path.to_str().unwrap())
            .unwrap();
        assert_eq!(img.dimensions(), (200, 50));
        assert_eq!(img.pixels.len(), 200 * 50 * 4);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jpg");
        assert!(FileImageSource::new(64).load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn release_drops_pixels() {
        let mut img = DecodedImage {
            path: "a".into(),
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        img.release();
        assert!(img.is_released());
        assert_eq!(img.dimensions(), (1, 1));
    }
}
