//! A width x height x depth array of unsigned 8-bit samples, scanline-major,
//! channel-interleaved. This is the only shape the core codec knows about;
//! reading and writing bitmaps from an actual file format (BMP or otherwise)
//! is left to callers such as the `ap-cli` crate.

use crate::constants::{MAX_DIMENSION, MIN_DIMENSION, RGB_DEPTH};
use crate::error::{Error, Result};

/// An in-memory RGB(-ish) raster.
///
/// Row 0 is the top row; for `depth == 3` channels are interleaved R,G,B.
#[derive(Clone, Debug, Default)]
pub struct Bitmap {
    width: u32,
    height: u32,
    depth: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a zero-filled bitmap of the given dimensions and depth.
    ///
    /// Returns `Error::InvalidInput` if the dimensions fall outside
    /// `1..=32767`.
    pub fn new(width: u32, height: u32, depth: usize) -> Result<Self> {
        if width < MIN_DIMENSION
            || width > MAX_DIMENSION
            || height < MIN_DIMENSION
            || height > MAX_DIMENSION
        {
            return Err(Error::InvalidInput(format!(
                "dimensions out of range: {}x{}",
                width, height
            )));
        }
        let len = width as usize * height as usize * depth;
        Ok(Self {
            width,
            height,
            depth,
            data: vec![0u8; len],
        })
    }

    /// Wraps an existing, already-sized pixel buffer.
    ///
    /// `data.len()` must equal `width * height * depth`.
    pub fn from_raw(
        width: u32,
        height: u32,
        depth: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * depth;
        if data.len() != expected {
            return Err(Error::InvalidInput(format!(
                "pixel buffer length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                depth
            )));
        }
        Ok(Self {
            width,
            height,
            depth,
            data,
        })
    }

    /// Width, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Raw scanline-major, channel-interleaved pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw pixel data.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of pixel (x, y)'s first channel.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.depth
    }

    /// The RGB triple at (x, y). Panics outside an `RGB_DEPTH` bitmap; this
    /// mirrors the core's assumption that every image it touches after the
    /// first `put_image` has depth 3.
    #[inline]
    pub fn pixel_rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let o = self.offset(x, y);
        [self.data[o], self.data[o + 1], self.data[o + 2]]
    }

    /// Overwrites the RGB triple at (x, y).
    #[inline]
    pub fn set_pixel_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let o = self.offset(x, y);
        self.data[o] = rgb[0];
        self.data[o + 1] = rgb[1];
        self.data[o + 2] = rgb[2];
    }

    /// Returns a new bitmap holding the top-left `(w, h)` region of `self`,
    /// the inverse of [`pad_to`](Self::pad_to).
    pub fn crop_to(&self, w: u32, h: u32) -> Result<Bitmap> {
        if w > self.width || h > self.height {
            return Err(Error::InvalidInput(
                "crop dimensions larger than source".to_owned(),
            ));
        }
        let mut out = Bitmap::new(w, h, self.depth)?;
        for y in 0..h {
            let src_row_start = self.offset(0, y);
            let dst_row_start = out.offset(0, y);
            let row_bytes = w as usize * self.depth;
            out.data[dst_row_start..dst_row_start + row_bytes]
                .copy_from_slice(&self.data[src_row_start..src_row_start + row_bytes]);
        }
        Ok(out)
    }

    /// Returns a new bitmap padded up to `(padded_w, padded_h)`, copying
    /// existing rows and zero-filling the right/bottom margins. `self` must
    /// already be `RGB_DEPTH`.
    pub fn pad_to(&self, padded_w: u32, padded_h: u32) -> Result<Bitmap> {
        if self.depth != RGB_DEPTH {
            return Err(Error::InvalidInput(format!(
                "expected {}-byte pixels, got {}",
                RGB_DEPTH, self.depth
            )));
        }
        if padded_w < self.width || padded_h < self.height {
            return Err(Error::InvalidInput(
                "padded dimensions smaller than source".to_owned(),
            ));
        }
        let mut out = Bitmap::new(padded_w, padded_h, self.depth)?;
        for y in 0..self.height {
            let src_row_start = self.offset(0, y);
            let src_row_end = src_row_start + self.width as usize * self.depth;
            let dst_row_start = out.offset(0, y);
            out.data[dst_row_start..dst_row_start + (src_row_end - src_row_start)]
                .copy_from_slice(&self.data[src_row_start..src_row_end]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimension() {
        assert!(Bitmap::new(0, 10, 3).is_err());
    }

    #[test]
    fn rejects_oversized_dimension() {
        assert!(Bitmap::new(32768, 10, 3).is_err());
    }

    #[test]
    fn pad_preserves_pixels_and_zero_fills_margin() {
        let mut bmp = Bitmap::new(2, 2, 3).unwrap();
        bmp.set_pixel_rgb(0, 0, [1, 2, 3]);
        bmp.set_pixel_rgb(1, 1, [9, 9, 9]);
        let padded = bmp.pad_to(4, 4).unwrap();
        assert_eq!(padded.pixel_rgb(0, 0), [1, 2, 3]);
        assert_eq!(padded.pixel_rgb(1, 1), [9, 9, 9]);
        assert_eq!(padded.pixel_rgb(3, 3), [0, 0, 0]);
        assert_eq!(padded.pixel_rgb(2, 0), [0, 0, 0]);
    }

    #[test]
    fn crop_is_the_inverse_of_pad() {
        let mut bmp = Bitmap::new(2, 2, 3).unwrap();
        bmp.set_pixel_rgb(0, 0, [1, 2, 3]);
        bmp.set_pixel_rgb(1, 1, [9, 9, 9]);
        let padded = bmp.pad_to(4, 4).unwrap();
        let cropped = padded.crop_to(2, 2).unwrap();
        assert_eq!(cropped.pixel_rgb(0, 0), [1, 2, 3]);
        assert_eq!(cropped.pixel_rgb(1, 1), [9, 9, 9]);
    }
}
