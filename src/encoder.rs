//! Frame-by-frame encoder: change detection, palette quantization, RLE, and
//! the container back-patch bookkeeping, tied together against one output
//! file.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::bitmap::Bitmap;
use crate::byteio::patch_i32_le;
use crate::change::{detect_changes, ChangeMap};
use crate::config::EncoderOptions;
use crate::constants::{
    MACROBLOCK_PIXELS, MACROBLOCK_SIZE, MAX_KEYFRAME_INTERVAL, MIN_CHANGE_FOR_KEYFRAME,
    MIN_KEYFRAME_INTERVAL, RGB_DEPTH, SUB_PALETTE_COLORS,
};
use crate::container::{
    build_delta_record_header, build_keyframe_record_header, build_placeholder_header,
    patch_header_counts, KEYFRAME_LINKS_OFFSET,
};
use crate::error::{Error, Result};
use crate::quantizer::array::ArrayQuantizer;
use crate::quantizer::list::ListQuantizer;
use crate::quantizer::nearest_index;
use crate::rle;

/// Per-keyframe bookkeeping needed to back-patch the linked index at
/// [`FrameEncoder::close`].
struct KeyframeEntry {
    record_offset: u64,
}

/// Encodes a sequence of same-sized RGB frames into an AP stream.
///
/// Geometry and the output file are fixed by the first [`put_image`] call;
/// every later frame must match.
///
/// [`put_image`]: FrameEncoder::put_image
pub struct FrameEncoder {
    options: EncoderOptions,
    path: Option<PathBuf>,
    file: Option<File>,

    width: u32,
    height: u32,
    padded_width: u32,
    padded_height: u32,
    mb_w: u32,
    mb_h: u32,
    blocks_w: u32,
    blocks_h: u32,

    reference: Option<Bitmap>,
    frame_count: u32,
    had_keyframe: bool,
    last_keyframe_frame_index: u32,
    keyframes: Vec<KeyframeEntry>,
    file_pos: u64,
}

impl FrameEncoder {
    /// Creates an encoder with the given options and no bound output file.
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            path: None,
            file: None,
            width: 0,
            height: 0,
            padded_width: 0,
            padded_height: 0,
            mb_w: 0,
            mb_h: 0,
            blocks_w: 0,
            blocks_h: 0,
            reference: None,
            frame_count: 0,
            had_keyframe: false,
            last_keyframe_frame_index: 0,
            keyframes: Vec::new(),
            file_pos: 0,
        }
    }

    /// Binds the output path. Fails if encoding has already started (the
    /// first [`put_image`](Self::put_image) call has opened a file).
    pub fn set_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::InvalidInput(
                "cannot rebind output path after encoding has started".to_owned(),
            ));
        }
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Replaces the encoder options. Fails once encoding has started, since
    /// `fps` and quantizer depth are fixed for the life of the stream.
    pub fn set_options(&mut self, options: EncoderOptions) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::InvalidInput(
                "cannot change options after encoding has started".to_owned(),
            ));
        }
        self.options = options;
        Ok(())
    }

    /// Encodes one more frame. The first call fixes the stream's geometry
    /// from `image`'s dimensions; later calls must match it exactly.
    pub fn put_image(&mut self, image: &Bitmap) -> Result<()> {
        if image.depth() != RGB_DEPTH {
            return Err(Error::InvalidInput(format!(
                "expected {}-byte RGB pixels, got depth {}",
                RGB_DEPTH,
                image.depth()
            )));
        }

        if self.file.is_none() {
            self.init_stream(image.width(), image.height())?;
        } else if image.width() != self.width || image.height() != self.height {
            return Err(Error::InvalidInput(format!(
                "frame {}x{} does not match stream geometry {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }

        let current = if image.width() == self.padded_width && image.height() == self.padded_height
        {
            image.clone()
        } else {
            image.pad_to(self.padded_width, self.padded_height)?
        };

        let (is_keyframe, change_map) = self.decide_frame_type(&current);

        let palette = ArrayQuantizer::new(self.options.median_cut_depth)
            .quantize(&current, crate::constants::FRAME_PALETTE_COLORS);

        let payload = self.build_payload(&current, &palette, is_keyframe, &change_map);

        let record_offset = self.file_pos;
        if is_keyframe {
            let header = build_keyframe_record_header(
                payload.len() as u32,
                self.keyframes.len() as u32,
            );
            self.write_record(&header, &payload)?;
            self.keyframes.push(KeyframeEntry { record_offset });
            self.last_keyframe_frame_index = self.frame_count;
            self.had_keyframe = true;
        } else {
            let header = build_delta_record_header(payload.len() as u32);
            self.write_record(&header, &payload)?;
        }

        self.update_reference(&current, is_keyframe, &change_map);
        log::debug!(
            "frame {}: {} ({} bytes payload)",
            self.frame_count,
            if is_keyframe { "keyframe" } else { "delta" },
            payload.len()
        );
        self.frame_count += 1;

        Ok(())
    }

    /// Flushes the final frame/keyframe counts and the keyframe index's
    /// prev/next back-pointers. A no-op if no frame was ever encoded.
    pub fn close(&mut self) -> Result<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => return Ok(()),
        };

        let mut header = vec![0u8; crate::constants::FILE_HEADER_SIZE];
        patch_header_counts(&mut header, self.frame_count, self.keyframes.len() as u32);
        file.seek(SeekFrom::Start(crate::container::FRAME_COUNT_OFFSET as u64))?;
        file.write_all(
            &header[crate::container::FRAME_COUNT_OFFSET..crate::container::FRAME_COUNT_OFFSET + 4],
        )?;
        file.seek(SeekFrom::Start(crate::container::KEYFRAME_COUNT_OFFSET as u64))?;
        file.write_all(
            &header
                [crate::container::KEYFRAME_COUNT_OFFSET..crate::container::KEYFRAME_COUNT_OFFSET + 4],
        )?;

        for (i, entry) in self.keyframes.iter().enumerate() {
            let prev = if i > 0 {
                self.keyframes[i - 1].record_offset as i64 - entry.record_offset as i64
            } else {
                0
            };
            let next = if i + 1 < self.keyframes.len() {
                self.keyframes[i + 1].record_offset as i64 - entry.record_offset as i64
            } else {
                0
            };
            let mut links = [0u8; 8];
            patch_i32_le(&mut links, 0, prev as i32);
            patch_i32_le(&mut links, 4, next as i32);
            file.seek(SeekFrom::Start(
                entry.record_offset + KEYFRAME_LINKS_OFFSET as u64,
            ))?;
            file.write_all(&links)?;
        }

        file.flush()?;
        log::debug!(
            "closed stream: {} frames, {} keyframes",
            self.frame_count,
            self.keyframes.len()
        );
        Ok(())
    }

    fn init_stream(&mut self, width: u32, height: u32) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::InvalidInput("no output path set; call set_file first".to_owned()))?;

        self.width = width;
        self.height = height;
        self.padded_width = round_up(width, MACROBLOCK_SIZE);
        self.padded_height = round_up(height, MACROBLOCK_SIZE);
        self.mb_w = self.padded_width / MACROBLOCK_SIZE;
        self.mb_h = self.padded_height / MACROBLOCK_SIZE;
        self.blocks_w = self.mb_w * 2;
        self.blocks_h = self.mb_h * 2;

        if path.exists() {
            fs::remove_file(&path)?;
        }
        let mut file = File::create(&path)?;
        let header = build_placeholder_header(self.options.fps, width as u16, height as u16);
        file.write_all(&header)?;
        self.file_pos = header.len() as u64;
        self.file = Some(file);

        self.reference = Some(Bitmap::new(self.padded_width, self.padded_height, RGB_DEPTH)?);
        self.frame_count = 0;
        self.had_keyframe = false;
        self.last_keyframe_frame_index = 0;
        self.keyframes.clear();

        log::debug!(
            "opened stream {:?}: {}x{} padded to {}x{}",
            path,
            width,
            height,
            self.padded_width,
            self.padded_height
        );
        Ok(())
    }

    /// Decides whether `current` should be coded as a keyframe, returning
    /// the changed-block map computed along the way (all-ones if the frame
    /// is a keyframe).
    fn decide_frame_type(&self, current: &Bitmap) -> (bool, ChangeMap) {
        if !self.had_keyframe {
            let mut map = ChangeMap::new(self.blocks_w, self.blocks_h);
            map.set_all();
            return (true, map);
        }

        let reference = self
            .reference
            .as_ref()
            .expect("reference frame exists once had_keyframe is true");
        let map = detect_changes(current, reference, self.options.change_threshold);
        let delta_t =
            f64::from(self.frame_count - self.last_keyframe_frame_index) / f64::from(self.options.fps);
        let ratio = f64::from(map.changed_count()) / f64::from(map.total_count());

        let is_keyframe = delta_t >= MAX_KEYFRAME_INTERVAL
            || (delta_t >= MIN_KEYFRAME_INTERVAL && ratio >= MIN_CHANGE_FOR_KEYFRAME);

        if is_keyframe {
            let mut all = ChangeMap::new(self.blocks_w, self.blocks_h);
            all.set_all();
            (true, all)
        } else {
            (false, map)
        }
    }

    fn build_payload(
        &self,
        current: &Bitmap,
        palette: &[[u8; 3]],
        is_keyframe: bool,
        change_map: &ChangeMap,
    ) -> Vec<u8> {
        let mut payload = Vec::new();
        for rgb in palette {
            payload.extend_from_slice(rgb);
        }
        if !is_keyframe {
            payload.extend(change_map.pack());
        }

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
                self.encode_macroblock(current, palette, mx, my, &sub_changed, &mut payload);
            }
        }
        payload
    }

    /// Encodes one macroblock: frame-palette indices, a sub-palette, and
    /// the RLE of the sub-palette-indexed buffer. Pixels belonging to an
    /// unchanged sub-block are zeroed in the indexed buffer so they cost
    /// nothing extra in the RLE stream.
    fn encode_macroblock(
        &self,
        current: &Bitmap,
        palette: &[[u8; 3]],
        mx: u32,
        my: u32,
        sub_changed: &[bool; 4],
        payload: &mut Vec<u8>,
    ) {
        let x0 = mx * MACROBLOCK_SIZE;
        let y0 = my * MACROBLOCK_SIZE;

        let mut frame_indices = [0u8; MACROBLOCK_PIXELS];
        for dy in 0..MACROBLOCK_SIZE {
            for dx in 0..MACROBLOCK_SIZE {
                let rgb = current.pixel_rgb(x0 + dx, y0 + dy);
                frame_indices[(dy * MACROBLOCK_SIZE + dx) as usize] =
                    nearest_index(palette, rgb) as u8;
            }
        }

        let mut occurrences: Vec<(u8, u32)> = Vec::new();
        let mut list = ListQuantizer::new();
        for dy in 0..MACROBLOCK_SIZE {
            for dx in 0..MACROBLOCK_SIZE {
                if !sub_changed[sub_block_of(dx, dy)] {
                    continue;
                }
                let idx = frame_indices[(dy * MACROBLOCK_SIZE + dx) as usize];
                match occurrences.iter_mut().find(|(i, _)| *i == idx) {
                    Some((_, count)) => *count += 1,
                    None => occurrences.push((idx, 1)),
                }
                list.add(palette[idx as usize]);
            }
        }

        let sub_palette: [u8; SUB_PALETTE_COLORS] = if occurrences.len() <= SUB_PALETTE_COLORS {
            occurrences.sort_by(|a, b| b.1.cmp(&a.1));
            let mut sub = [0u8; SUB_PALETTE_COLORS];
            for (slot, (idx, _)) in sub.iter_mut().zip(occurrences.iter()) {
                *slot = *idx;
            }
            sub
        } else {
            let centroids = list.quantize(SUB_PALETTE_COLORS);
            let mut sub = [0u8; SUB_PALETTE_COLORS];
            for (slot, centroid) in sub.iter_mut().zip(centroids.iter()) {
                *slot = nearest_index(palette, *centroid) as u8;
            }
            sub
        };

        let sub_palette_rgb: Vec<[u8; 3]> =
            sub_palette.iter().map(|&i| palette[i as usize]).collect();

        let mut indexed = [0u8; MACROBLOCK_PIXELS];
        for dy in 0..MACROBLOCK_SIZE {
            for dx in 0..MACROBLOCK_SIZE {
                let pos = (dy * MACROBLOCK_SIZE + dx) as usize;
                if !sub_changed[sub_block_of(dx, dy)] {
                    continue;
                }
                let rgb = palette[frame_indices[pos] as usize];
                indexed[pos] = nearest_index(&sub_palette_rgb, rgb) as u8;
            }
        }

        payload.extend_from_slice(&sub_palette);
        payload.extend(rle::encode(&indexed));
    }

    fn update_reference(&mut self, current: &Bitmap, is_keyframe: bool, change_map: &ChangeMap) {
        let reference = self
            .reference
            .as_mut()
            .expect("reference allocated in init_stream");
        if is_keyframe {
            *reference = current.clone();
            return;
        }
        for by in 0..change_map.blocks_h() {
            for bx in 0..change_map.blocks_w() {
                if !change_map.is_changed(bx, by) {
                    continue;
                }
                let x0 = bx * crate::constants::BLOCK_SIZE;
                let y0 = by * crate::constants::BLOCK_SIZE;
                for dy in 0..crate::constants::BLOCK_SIZE {
                    for dx in 0..crate::constants::BLOCK_SIZE {
                        let rgb = current.pixel_rgb(x0 + dx, y0 + dy);
                        reference.set_pixel_rgb(x0 + dx, y0 + dy, rgb);
                    }
                }
            }
        }
    }

    fn write_record(&mut self, header: &[u8], payload: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .expect("write_record only called once init_stream has opened a file");
        file.write_all(header)?;
        file.write_all(payload)?;
        self.file_pos += header.len() as u64 + payload.len() as u64;
        Ok(())
    }
}

fn round_up(value: u32, multiple: u32) -> u32 {
    ((value + multiple - 1) / multiple) * multiple
}

/// Which of a macroblock's four 8x8 sub-blocks a pixel offset falls into.
#[inline]
fn sub_block_of(dx: u32, dy: u32) -> usize {
    let col = if dx < crate::constants::BLOCK_SIZE { 0 } else { 1 };
    let row = if dy < crate::constants::BLOCK_SIZE { 0 } else { 1 };
    row * 2 + col
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn first_frame_is_always_a_keyframe() {
        let tmp = NamedTempFile::new().unwrap();
        let options = EncoderOptions::new(25.0, 6).unwrap();
        let mut enc = FrameEncoder::new(options);
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
        enc.close().unwrap();

        let bytes = fs::read(tmp.path()).unwrap();
        let header = crate::container::parse_header(&bytes).unwrap();
        assert_eq!(header.frame_count, 1);
        assert_eq!(header.keyframe_count, 1);
    }

    #[test]
    fn rejects_mismatched_frame_geometry() {
        let tmp = NamedTempFile::new().unwrap();
        let options = EncoderOptions::new(25.0, 6).unwrap();
        let mut enc = FrameEncoder::new(options);
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
        let result = enc.put_image(&solid(32, 32, [1, 2, 3]));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_rebinding_output_after_encoding_started() {
        let tmp = NamedTempFile::new().unwrap();
        let other = NamedTempFile::new().unwrap();
        let options = EncoderOptions::new(25.0, 6).unwrap();
        let mut enc = FrameEncoder::new(options);
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
        assert!(enc.set_file(other.path()).is_err());
    }

    #[test]
    fn identical_second_frame_encodes_as_non_keyframe_with_no_changed_blocks() {
        let tmp = NamedTempFile::new().unwrap();
        let options = EncoderOptions::new(25.0, 6).unwrap();
        let mut enc = FrameEncoder::new(options);
        enc.set_file(tmp.path()).unwrap();
        enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
        enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
        enc.close().unwrap();

        let bytes = fs::read(tmp.path()).unwrap();
        let header = crate::container::parse_header(&bytes).unwrap();
        assert_eq!(header.frame_count, 2);
        assert_eq!(header.keyframe_count, 1);
    }
}
