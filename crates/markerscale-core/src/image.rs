/// Errors raised when wrapping a caller-supplied pixel buffer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },

    #[error("invalid RGBA buffer length (expected {expected} bytes, got {got})")]
    InvalidBufferLength { expected: usize, got: usize },
}

/// Borrowed RGBA8 image, row-major, 4 bytes per pixel.
#[derive(Clone, Copy, Debug)]
pub struct RgbaImageView<'a> {
    width: usize,
    height: usize,
    data: &'a [u8],
}

/// Owned RGBA8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

fn expected_len(width: usize, height: usize) -> Result<usize, ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .ok_or(ImageError::InvalidDimensions { width, height })
}

impl<'a> RgbaImageView<'a> {
    /// Wrap a raw RGBA buffer, checking that its length matches the dimensions.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, ImageError> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(ImageError::InvalidBufferLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// RGBA value of an in-bounds pixel.
    #[inline]
    pub fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Luminosity `(r + g + b) / 3` with coordinates clamped to the border.
    #[inline]
    pub fn luminosity(&self, x: i64, y: i64) -> f64 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let i = (y * self.width + x) * 4;
        (self.data[i] as f64 + self.data[i + 1] as f64 + self.data[i + 2] as f64) / 3.0
    }

    /// Grayscale copy for collaborators that work on single-channel data.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(4)
            .map(|px| ((px[0] as u16 + px[1] as u16 + px[2] as u16) / 3) as u8)
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl RgbaImage {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        RgbaImageView::new(width, height, &data)?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Image filled with a single colour.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Result<Self, ImageError> {
        let len = expected_len(width, height)?;
        let data = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> RgbaImageView<'_> {
        RgbaImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    pub fn put_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            let i = (y * self.width + x) * 4;
            self.data[i..i + 4].copy_from_slice(&rgba);
        }
    }
}

impl GrayImage {
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_buffers() {
        assert_eq!(
            RgbaImageView::new(0, 4, &[]).unwrap_err(),
            ImageError::InvalidDimensions {
                width: 0,
                height: 4
            }
        );
        let buf = vec![0u8; 15];
        assert_eq!(
            RgbaImageView::new(2, 2, &buf).unwrap_err(),
            ImageError::InvalidBufferLength {
                expected: 16,
                got: 15
            }
        );
        assert!(matches!(
            RgbaImageView::new(usize::MAX, 2, &buf),
            Err(ImageError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn luminosity_clamps_to_border() {
        let mut img = RgbaImage::filled(3, 2, [0, 0, 0, 255]).unwrap();
        img.put_pixel(2, 1, [30, 60, 90, 255]);
        let view = img.view();
        assert_eq!(view.luminosity(2, 1), 60.0);
        assert_eq!(view.luminosity(10, 10), 60.0);
        assert_eq!(view.luminosity(-4, 0), 0.0);
        assert_eq!(view.to_gray().data, vec![0, 0, 0, 0, 0, 60]);
    }
}
