// Internal constants.

/// Width/height, in pixels, of a change-detection block.
pub(crate) const BLOCK_SIZE: u32 = 8;

/// Width/height, in pixels, of a macroblock (2x2 blocks).
pub(crate) const MACROBLOCK_SIZE: u32 = 16;

/// Pixels per macroblock.
pub(crate) const MACROBLOCK_PIXELS: usize = 256;

/// Entries in a frame palette.
pub(crate) const FRAME_PALETTE_COLORS: usize = 256;

/// Bytes a frame palette occupies on the wire (RGB, 3 bytes/entry).
pub(crate) const FRAME_PALETTE_BYTES: usize = FRAME_PALETTE_COLORS * 3;

/// Entries in a macroblock sub-palette.
pub(crate) const SUB_PALETTE_COLORS: usize = 16;

/// Default squared-distance change threshold (T=8).
pub(crate) const DEFAULT_CHANGE_THRESHOLD: u16 = 8;

/// Default median-cut histogram depth for the frame palette.
pub(crate) const DEFAULT_MEDIAN_CUT_DEPTH: u8 = 7;

/// Minimum accepted median-cut histogram depth.
pub(crate) const MIN_MEDIAN_CUT_DEPTH: u8 = 6;

/// Maximum accepted median-cut histogram depth.
pub(crate) const MAX_MEDIAN_CUT_DEPTH: u8 = 8;

/// Seconds since the last keyframe after which a keyframe is forced
/// unconditionally.
pub(crate) const MAX_KEYFRAME_INTERVAL: f64 = 10.0;

/// Seconds since the last keyframe after which a keyframe may be forced
/// early if enough of the frame has changed.
pub(crate) const MIN_KEYFRAME_INTERVAL: f64 = 2.0;

/// Changed-block ratio, in [MIN_KEYFRAME_INTERVAL, MAX_KEYFRAME_INTERVAL),
/// above which a keyframe is forced.
pub(crate) const MIN_CHANGE_FOR_KEYFRAME: f64 = 0.80;

/// Minimum run length eligible for repeat-mode RLE coding.
pub(crate) const MIN_REPEAT_RUN: usize = 4;

/// Maximum run length a single RLE header can describe.
pub(crate) const MAX_RUN_LENGTH: usize = 128;

/// Container magic, "ANIP".
pub const MAGIC: [u8; 4] = [0x41, 0x4E, 0x49, 0x50];

/// Container format version understood by this implementation.
pub const VERSION: u8 = 1;

/// Size, in bytes, of the fixed file header.
pub(crate) const FILE_HEADER_SIZE: usize = 21;

/// frameType value marking a keyframe record.
pub(crate) const FRAME_TYPE_KEYFRAME: u8 = 1;

/// frameType value marking a delta record.
pub(crate) const FRAME_TYPE_DELTA: u8 = 0;

/// Smallest accepted frame dimension.
pub(crate) const MIN_DIMENSION: u32 = 1;

/// Largest accepted frame dimension.
pub(crate) const MAX_DIMENSION: u32 = 32767;

/// Expected bitmap depth (bytes per pixel) for input frames.
pub(crate) const RGB_DEPTH: usize = 3;
