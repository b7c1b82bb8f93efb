//! End-to-end encode/decode tests against the public API only, exercising
//! the container's keyframe cadence and reference-frame lock-step
//! guarantees rather than any single module in isolation.

use ap::{Bitmap, DecoderOptions, EncoderOptions, FrameDecoder, FrameEncoder};
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
fn round_trips_a_single_solid_frame() {
    let tmp = NamedTempFile::new().unwrap();
    let mut enc = FrameEncoder::new(EncoderOptions::new(24.0, 7).unwrap());
    enc.set_file(tmp.path()).unwrap();
    enc.put_image(&solid(40, 30, [64, 128, 200])).unwrap();
    enc.close().unwrap();

    let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
    assert_eq!(dec.frame_count(), 1);
    assert_eq!(dec.keyframe_count(), 1);

    let mut padded = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
    assert!(dec.get_frame(&mut padded).unwrap());
    let frame = padded.crop_to(dec.width(), dec.height()).unwrap();
    assert_eq!((frame.width(), frame.height()), (40, 30));
    let got = frame.pixel_rgb(10, 10);
    assert!((i32::from(got[0]) - 64).abs() <= 4);
    assert!((i32::from(got[1]) - 128).abs() <= 4);
    assert!((i32::from(got[2]) - 200).abs() <= 4);
    dec.close().unwrap();
}

#[test]
fn unchanged_regions_carry_forward_through_the_reference_frame() {
    let tmp = NamedTempFile::new().unwrap();
    let mut enc = FrameEncoder::new(EncoderOptions::new(24.0, 7).unwrap());
    enc.set_file(tmp.path()).unwrap();

    // Frame 0: solid. Frame 1: same, except a single 8x8 block changes.
    let base = solid(32, 32, [10, 10, 10]);
    enc.put_image(&base).unwrap();
    let mut changed = base.clone();
    for y in 0..8 {
        for x in 0..8 {
            changed.set_pixel_rgb(x, y, [250, 250, 250]);
        }
    }
    enc.put_image(&changed).unwrap();
    enc.close().unwrap();

    let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
    assert_eq!(dec.frame_count(), 2);
    assert_eq!(dec.keyframe_count(), 1);

    let mut first = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
    let mut second = Bitmap::new(dec.buffer_width(), dec.buffer_height(), 3).unwrap();
    assert!(dec.get_frame(&mut first).unwrap());
    assert!(dec.get_frame(&mut second).unwrap());

    let top_left = second.pixel_rgb(0, 0);
    assert!(i32::from(top_left[0]) > 200);
    let untouched = second.pixel_rgb(20, 20);
    assert!((i32::from(untouched[0]) - 10).abs() <= 4);
    dec.close().unwrap();
}

#[test]
fn a_long_run_of_identical_frames_forces_a_keyframe_at_the_max_interval() {
    let tmp = NamedTempFile::new().unwrap();
    let fps = 25.0;
    let mut enc = FrameEncoder::new(EncoderOptions::new(fps, 6).unwrap());
    enc.set_file(tmp.path()).unwrap();

    // MAX_KEYFRAME_INTERVAL is 10s; at 25fps that's exactly 250 frames
    // after the last keyframe, forcing frame index 250 to be a keyframe
    // even though nothing changed.
    let frame = solid(16, 16, [5, 5, 5]);
    for _ in 0..251 {
        enc.put_image(&frame).unwrap();
    }
    enc.close().unwrap();

    let dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
    assert_eq!(dec.frame_count(), 251);
    assert_eq!(dec.keyframe_count(), 2);
}

#[test]
fn rejects_a_second_frame_with_different_dimensions() {
    let tmp = NamedTempFile::new().unwrap();
    let mut enc = FrameEncoder::new(EncoderOptions::new(24.0, 7).unwrap());
    enc.set_file(tmp.path()).unwrap();
    enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
    assert!(enc.put_image(&solid(8, 8, [1, 2, 3])).is_err());
}

#[test]
fn rejects_seeking_past_frame_zero() {
    let tmp = NamedTempFile::new().unwrap();
    let mut enc = FrameEncoder::new(EncoderOptions::new(24.0, 7).unwrap());
    enc.set_file(tmp.path()).unwrap();
    enc.put_image(&solid(16, 16, [1, 2, 3])).unwrap();
    enc.close().unwrap();

    let mut dec = FrameDecoder::open(tmp.path(), DecoderOptions::default()).unwrap();
    assert!(dec.seek(1).is_err());
    assert!(dec.seek(0).is_ok());
}
