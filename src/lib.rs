//! Lossy cel-animation video codec: block-level change detection, two-tier
//! median-cut palette quantization, and nibble-packed run-length pixel
//! coding, framed into a keyframe-indexed container.
//!
//! This crate implements the encoder and decoder pipelines only. Bitmap
//! file I/O, the command-line front end, and a playback loop live in the
//! separate `ap-cli` binary crate.

pub mod bitmap;
pub mod change;
pub mod config;
pub mod constants;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod quantizer;
pub mod rle;

mod byteio;

pub use bitmap::Bitmap;
pub use config::{DecoderOptions, EncoderOptions};
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use error::{Error, Result};
