use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("unable to decode texture {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture is {width}x{height} but {len} bytes of RGBA were given")]
    Size { width: u32, height: u32, len: usize },
    #[error("texture is {width}x{height} but the device allows at most {limit} per side")]
    TooLarge { width: u32, height: u32, limit: u32 },
}

/// Decoded RGBA8 pixels, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureImage {
    /// Decodes a PNG or JPEG file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("decoded {} ({width}x{height})", path.display());
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
            return Err(TextureError::Size {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// 1x1 opaque white, bound when a draw has no texture of its own.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Fails when either side exceeds `limit`, the device's maximum 2D
    /// texture dimension.
    pub fn check_fits(&self, limit: u32) -> Result<(), TextureError> {
        if self.width > limit || self.height > limit {
            return Err(TextureError::TooLarge {
                width: self.width,
                height: self.height,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_into_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let mut pixels = image::RgbImage::new(2, 3);
        pixels.put_pixel(1, 2, image::Rgb([10, 20, 30]));
        pixels.save(&path).unwrap();

        let texture = TextureImage::load(&path).unwrap();
        assert_eq!((texture.width(), texture.height()), (2, 3));
        assert_eq!(texture.rgba().len(), 2 * 3 * 4);
        assert_eq!(&texture.rgba()[20..24], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_files_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            TextureImage::load(&path),
            Err(TextureError::Decode { .. })
        ));
        assert!(TextureImage::load(dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn from_rgba_checks_the_buffer_size() {
        assert!(TextureImage::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureImage::from_rgba(2, 2, vec![0; 15]),
            Err(TextureError::Size { .. })
        ));
        assert!(TextureImage::from_rgba(0, 0, Vec::new()).is_err());
        assert_eq!(TextureImage::white().rgba(), &[255, 255, 255, 255]);
    }

    #[test]
    fn oversized_images_do_not_fit() {
        let strip = TextureImage::from_rgba(20, 1, vec![0; 80]).unwrap();
        assert!(strip.check_fits(20).is_ok());
        let err = strip.check_fits(16).unwrap_err();
        assert!(matches!(
            err,
            TextureError::TooLarge {
                width: 20,
                height: 1,
                limit: 16
            }
        ));
        assert!(err.to_string().contains("at most 16"));
    }
}
