//! Sequential frame decoder: the symmetric counterpart to [`crate::encoder`].

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::change::ChangeMap;
use crate::config::DecoderOptions;
use crate::constants::{
    BLOCK_SIZE, FRAME_PALETTE_BYTES, FRAME_PALETTE_COLORS, FRAME_TYPE_DELTA, FRAME_TYPE_KEYFRAME,
    MACROBLOCK_SIZE, RGB_DEPTH,
};
use crate::container::{
    parse_header, parse_record_header, DELTA_RECORD_HEADER_SIZE, KEYFRAME_RECORD_HEADER_SIZE,
};
use crate::error::{Error, Result};
use crate::rle;

/// Reads frames back out of an AP stream in sequential order.
///
/// Only `seek(0)` (rewind to the start) is supported; arbitrary seeking
/// would require either scanning every preceding delta record or keeping a
/// full-index cache neither format nor decoder maintain.
///
/// [`get_frame`](Self::get_frame) and [`get_frame_rgb`](Self::get_frame_rgb)
/// both fill a caller-provided output sized to the *padded* surface
/// (`buffer_width x buffer_height`), not the logical `width x height`: the
/// macroblock grid, and therefore every decoded pixel, lives on the padded
/// buffer, and cropping is left to callers that need the logical size.
pub struct FrameDecoder {
    #[allow(dead_code)]
    options: DecoderOptions,
    file: Option<File>,

    width: u32,
    height: u32,
    fps: f32,
    frame_count: u32,
    keyframe_count: u32,
    padded_width: u32,
    padded_height: u32,
    mb_w: u32,
    mb_h: u32,
    blocks_w: u32,
    blocks_h: u32,

    reference: Bitmap,
    next_frame_index: u32,
    data_start: u64,
}

impl FrameDecoder {
    /// Opens `path`, validates the fixed header, and positions the decoder
    /// at frame 0.
    pub fn open<P: AsRef<Path>>(path: P, options: DecoderOptions) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut header_buf = vec![0u8; crate::constants::FILE_HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = parse_header(&header_buf)?;

        let width = u32::from(header.width);
        let height = u32::from(header.height);
        let padded_width = round_up(width, MACROBLOCK_SIZE);
        let padded_height = round_up(height, MACROBLOCK_SIZE);
        let mb_w = padded_width / MACROBLOCK_SIZE;
        let mb_h = padded_height / MACROBLOCK_SIZE;

        log::debug!(
            "opened stream: {}x{} padded to {}x{}, {} frames, {} keyframes",
            width,
            height,
            padded_width,
            padded_height,
            header.frame_count,
            header.keyframe_count
        );

        Ok(Self {
            options,
            data_start: header_buf.len() as u64,
            file: Some(file),
            width,
            height,
            fps: header.fps,
            frame_count: header.frame_count,
            keyframe_count: header.keyframe_count,
            padded_width,
            padded_height,
            mb_w,
            mb_h,
            blocks_w: mb_w * 2,
            blocks_h: mb_h * 2,
            reference: Bitmap::new(padded_width, padded_height, RGB_DEPTH)?,
            next_frame_index: 0,
        })
    }

    /// Original (unpadded) frame width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Original (unpadded) frame height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Internal reconstruction buffer width, a multiple of the macroblock
    /// size. [`get_frame`](Self::get_frame) and
    /// [`get_frame_rgb`](Self::get_frame_rgb) both fill a buffer of exactly
    /// `buffer_width x buffer_height`.
    pub fn buffer_width(&self) -> u32 {
        self.padded_width
    }

    /// Internal reconstruction buffer height, a multiple of the macroblock
    /// size.
    pub fn buffer_height(&self) -> u32 {
        self.padded_height
    }

    /// Playback rate recorded in the file header.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Total frame count recorded in the file header.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Total keyframe count recorded in the file header.
    pub fn keyframe_count(&self) -> u32 {
        self.keyframe_count
    }

    /// Rewinds to frame 0. Any other target is rejected:
    /// `Error::UnsupportedOperation`.
    pub fn seek(&mut self, frame_index: u32) -> Result<()> {
        if frame_index != 0 {
            return Err(Error::UnsupportedOperation(
                "only seeking to frame 0 is supported".to_owned(),
            ));
        }
        use std::io::{Seek, SeekFrom};
        let data_start = self.data_start;
        self.file_mut()?.seek(SeekFrom::Start(data_start))?;
        self.next_frame_index = 0;
        self.reference = Bitmap::new(self.padded_width, self.padded_height, RGB_DEPTH)?;
        Ok(())
    }

    /// Decodes the next frame into `out`, a padded `buffer_width x
    /// buffer_height x 3` bitmap, returning `false` once every frame
    /// recorded in the header has been read.
    pub fn get_frame(&mut self, out: &mut Bitmap) -> Result<bool> {
        if out.width() != self.padded_width
            || out.height() != self.padded_height
            || out.depth() != RGB_DEPTH
        {
            return Err(Error::InvalidInput(format!(
                "output bitmap must be {}x{}x{}, got {}x{}x{}",
                self.padded_width,
                self.padded_height,
                RGB_DEPTH,
                out.width(),
                out.height(),
                out.depth()
            )));
        }
        if !self.decode_next_frame()? {
            return Ok(false);
        }
        out.data_mut().copy_from_slice(self.reference.data());
        Ok(true)
    }

    /// Decodes the next frame into `out`, a `buffer_width * buffer_height`
    /// array of packed `(R<<16)|(G<<8)|B` pixels, returning `false` once
    /// every frame recorded in the header has been read.
    pub fn get_frame_rgb(&mut self, out: &mut [u32]) -> Result<bool> {
        let expected = (self.padded_width * self.padded_height) as usize;
        if out.len() != expected {
            return Err(Error::InvalidInput(format!(
                "output buffer must hold {} packed pixels, got {}",
                expected,
                out.len()
            )));
        }
        if !self.decode_next_frame()? {
            return Ok(false);
        }
        for y in 0..self.padded_height {
            for x in 0..self.padded_width {
                let rgb = self.reference.pixel_rgb(x, y);
                let packed = (u32::from(rgb[0]) << 16) | (u32::from(rgb[1]) << 8) | u32::from(rgb[2]);
                out[(y * self.padded_width + x) as usize] = packed;
            }
        }
        Ok(true)
    }

    /// Releases the underlying file handle. A no-op if already closed.
    pub fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            log::debug!("closed stream after {} frames read", self.next_frame_index);
        }
        Ok(())
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("decoder already closed".to_owned()))
    }

    /// Reads and applies the next frame record onto `self.reference`, or
    /// returns `false` if every frame has already been read.
    fn decode_next_frame(&mut self) -> Result<bool> {
        if self.next_frame_index >= self.frame_count {
            return Ok(false);
        }

        let (is_keyframe, payload_len) = self.read_record_header()?;
        let mut payload = vec![0u8; payload_len as usize];
        self.file_mut()?.read_exact(&mut payload)?;

        if payload.len() < FRAME_PALETTE_BYTES {
            log::warn!(
                "frame {}: payload shorter than the frame palette",
                self.next_frame_index
            );
            return Err(Error::InvalidContainer(
                "frame payload shorter than the frame palette".to_owned(),
            ));
        }
        let mut palette = [[0u8; 3]; FRAME_PALETTE_COLORS];
        for (i, entry) in palette.iter_mut().enumerate() {
            let o = i * 3;
            *entry = [payload[o], payload[o + 1], payload[o + 2]];
        }
        let mut pos = FRAME_PALETTE_BYTES;

        let change_map = if is_keyframe {
            let mut map = ChangeMap::new(self.blocks_w, self.blocks_h);
            map.set_all();
            map
        } else {
            let bytes = ((self.blocks_w * self.blocks_h) as usize + 7) / 8;
            if payload.len() < pos + bytes {
                log::warn!(
                    "frame {}: payload shorter than its changed-block map",
                    self.next_frame_index
                );
                return Err(Error::InvalidContainer(
                    "frame payload shorter than its changed-block map".to_owned(),
                ));
            }
            let map = ChangeMap::unpack(self.blocks_w, self.blocks_h, &payload[pos..pos + bytes]);
            pos += bytes;
            map
        };

        for my in 0..self.mb_h {
            for mx in 0..self.mb_w {
                let sub_changed = [
                    change_map.is_changed(2 * mx, 2 * my),
                    change_map.is_changed(2 * mx + 1, 2 * my),
                    change_map.is_changed(2 * mx, 2 * my + 1),
                    change_map.is_changed(2 * mx + 1, 2 * my + 1),
                ];
                if !sub_changed.iter().any(|&c| c) {
                    continue;
                }
                pos = self.decode_macroblock(&payload, pos, &palette, mx, my, &sub_changed)?;
            }
        }

        self.next_frame_index += 1;
        Ok(true)
    }

    /// Decodes one macroblock's sub-palette and RLE block starting at
    /// `payload[pos..]`, painting its changed pixels into the reference
    /// buffer, and returns the offset just past the macroblock's data.
    fn decode_macroblock(
        &mut self,
        payload: &[u8],
        mut pos: usize,
        palette: &[[u8; 3]; FRAME_PALETTE_COLORS],
        mx: u32,
        my: u32,
        sub_changed: &[bool; 4],
    ) -> Result<usize> {
        const SUB_PALETTE_BYTES: usize = crate::constants::SUB_PALETTE_COLORS;
        if payload.len() < pos + SUB_PALETTE_BYTES {
            log::warn!(
                "frame {}: payload truncated before a macroblock sub-palette at ({}, {})",
                self.next_frame_index,
                mx,
                my
            );
            return Err(Error::InvalidContainer(
                "frame payload truncated before a macroblock sub-palette".to_owned(),
            ));
        }
        let sub_palette = &payload[pos..pos + SUB_PALETTE_BYTES];
        pos += SUB_PALETTE_BYTES;

        let block_len = rle::block_len(&payload[pos..]).map_err(|e| {
            log::warn!(
                "frame {}: RLE block at ({}, {}) missing its length prefix",
                self.next_frame_index,
                mx,
                my
            );
            e
        })?;
        if payload.len() < pos + block_len {
            log::warn!(
                "frame {}: payload truncated inside a macroblock RLE block at ({}, {})",
                self.next_frame_index,
                mx,
                my
            );
            return Err(Error::InvalidContainer(
                "frame payload truncated inside a macroblock RLE block".to_owned(),
            ));
        }
        let indexed = rle::decode(&payload[pos..pos + block_len]).map_err(|e| {
            log::warn!(
                "frame {}: RLE overrun decoding macroblock ({}, {})",
                self.next_frame_index,
                mx,
                my
            );
            e
        })?;
        pos += block_len;

        let x0 = mx * MACROBLOCK_SIZE;
        let y0 = my * MACROBLOCK_SIZE;
        for dy in 0..MACROBLOCK_SIZE {
            for dx in 0..MACROBLOCK_SIZE {
                if !sub_changed[sub_block_of(dx, dy)] {
                    continue;
                }
                let slot = indexed[(dy * MACROBLOCK_SIZE + dx) as usize] as usize;
                let frame_index = *sub_palette.get(slot).ok_or_else(|| {
                    log::warn!(
                        "frame {}: sub-palette index {} out of range at macroblock ({}, {})",
                        self.next_frame_index,
                        slot,
                        mx,
                        my
                    );
                    Error::InternalInvariant("sub-palette index out of range".to_owned())
                })? as usize;
                let rgb = *palette.get(frame_index).ok_or_else(|| {
                    log::warn!(
                        "frame {}: frame palette index {} out of range at macroblock ({}, {})",
                        self.next_frame_index,
                        frame_index,
                        mx,
                        my
                    );
                    Error::InternalInvariant("frame palette index out of range".to_owned())
                })?;
                self.reference.set_pixel_rgb(x0 + dx, y0 + dy, rgb);
            }
        }
        Ok(pos)
    }

    fn read_record_header(&mut self) -> Result<(bool, u32)> {
        let frame_index = self.next_frame_index;
        let mut type_byte = [0u8; 1];
        self.file_mut()?.read_exact(&mut type_byte)?;
        let mut buf = Vec::with_capacity(KEYFRAME_RECORD_HEADER_SIZE);
        buf.push(type_byte[0]);
        let extra = match type_byte[0] {
            t if t == FRAME_TYPE_DELTA => DELTA_RECORD_HEADER_SIZE - 1,
            t if t == FRAME_TYPE_KEYFRAME => KEYFRAME_RECORD_HEADER_SIZE - 1,
            other => {
                log::warn!(
                    "frame {}: unknown frame type byte {}",
                    frame_index,
                    other
                );
                return Err(Error::InvalidContainer(format!(
                    "unknown frame type byte: {}",
                    other
                )));
            }
        };
        let mut rest = vec![0u8; extra];
        self.file_mut()?.read_exact(&mut rest)?;
        buf.extend_from_slice(&rest);
        let (parsed, _consumed) = parse_record_header(&buf).map_err(|e| {
            log::warn!("frame {}: malformed record header", frame_index);
            e
        })?;
        Ok((parsed.is_keyframe, parsed.payload_len))
    }
}

fn round_up(value: u32, multiple: u32) -> u32 {
    ((value + multiple - 1) / multiple) * multiple
}

#[inline]
fn sub_block_of(dx: u32, dy: u32) -> usize {
    let col = if dx < BLOCK_SIZE { 0 } else { 1 };
    let row = if dy < BLOCK_SIZE { 0 } else { 1 };
    row * 2 + col
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderOptions;
    use crate::encoder::FrameEncoder;
    use tempfile::NamedTempFile;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> Bitmap {
        let mut b = Bitmap::new(w, h, 3).unwrap();
        for y in 0..h {
            for x in 0..w {
                b.set_pixel_rgb(x, y, rgb);
            }
        }
        b
    }

    #[test]
    fn decodes_a_single_keyframe_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let mut enc = FrameEncoder::new(EncoderOptions::new(25.0, 6).unwrap());
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(17, 19, [200, 40, 10])).unwrap();
        enc.close().unwrap();

        let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
        assert_eq!(dec.width(), 17);
        assert_eq!(dec.height(), 19);
        assert_eq!(dec.frame_count(), 1);
        assert_eq!(dec.buffer_width(), 32);
        assert_eq!(dec.buffer_height(), 32);

        let mut frame = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
        assert!(dec.get_frame(&mut frame).unwrap());
        let got = frame.pixel_rgb(5, 5);
        assert!((i32::from(got[0]) - 200).abs() <= 4);
        assert!((i32::from(got[1]) - 40).abs() <= 4);
        assert!((i32::from(got[2]) - 10).abs() <= 4);

        assert!(!dec.get_frame(&mut frame).unwrap());
        dec.close().unwrap();
    }

    #[test]
    fn get_frame_rgb_packs_the_same_pixels_get_frame_writes() {
        let tmp = NamedTempFile::new().unwrap();
        let mut enc = FrameEncoder::new(EncoderOptions::new(25.0, 6).unwrap());
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [200, 40, 10])).unwrap();
        enc.close().unwrap();

        let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
        let mut packed = vec![0u32; (dec.buffer_width() * dec.buffer_height()) as usize];
        assert!(dec.get_frame_rgb(&mut packed).unwrap());

        let rgb = packed[0];
        let r = ((rgb >> 16) & 0xFF) as i32;
        let g = ((rgb >> 8) & 0xFF) as i32;
        let b = (rgb & 0xFF) as i32;
        assert!((r - 200).abs() <= 4);
        assert!((g - 40).abs() <= 4);
        assert!((b - 10).abs() <= 4);
    }

    #[test]
    fn get_frame_rejects_a_mismatched_output_buffer() {
        let tmp = NamedTempFile::new().unwrap();
        let mut enc = FrameEncoder::new(EncoderOptions::new(25.0, 6).unwrap());
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 1, 1])).unwrap();
        enc.close().unwrap();

        let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
        let mut wrong_size = Bitmap::new(8, 8, 3).unwrap();
        assert!(dec.get_frame(&mut wrong_size).is_err());
    }

    #[test]
    fn decodes_an_unchanged_second_frame_identically_to_the_first() {
        let tmp = NamedTempFile::new().unwrap();
        let mut enc = FrameEncoder::new(EncoderOptions::new(25.0, 6).unwrap());
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [30, 60, 90])).unwrap();
        enc.put_image(&solid(16, 16, [30, 60, 90])).unwrap();
        enc.close().unwrap();

        let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
        let mut first = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
        let mut second = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
        assert!(dec.get_frame(&mut first).unwrap());
        assert!(dec.get_frame(&mut second).unwrap());
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn rejects_seeking_anywhere_but_zero() {
        let tmp = NamedTempFile::new().unwrap();
        let mut enc = FrameEncoder::new(EncoderOptions::new(25.0, 6).unwrap());
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 1, 1])).unwrap();
        enc.close().unwrap();

        let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
        let mut frame = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
        dec.get_frame(&mut frame).unwrap();
        assert!(dec.seek(5).is_err());
        assert!(dec.seek(0).is_ok());
    }
}
