//! Command-line front end for the `ap` codec: encode a numbered BMP
//! sequence, decode back to numbered BMPs, or print a summary of a stream
//! ("play" without pulling in a GUI/windowing dependency).

mod bmp;

use std::path::{Path, PathBuf};

use clap::{App, Arg, SubCommand};

use ap::{Bitmap, DecoderOptions, EncoderOptions, FrameDecoder, FrameEncoder};

fn main() {
    env_logger::init();

    let matches = App::new("ap-cli")
        .about("Encoder/decoder front end for the ap cel-animation codec")
        .subcommand(
            SubCommand::with_name("c")
                .about("encode a numbered BMP sequence")
                .arg(Arg::new("output").help("output .ap path").required(true))
                .arg(Arg::new("fps").help("playback rate").required(true))
                .arg(
                    Arg::new("pattern")
                        .help("first input BMP, e.g. image0000.bmp")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("x")
                .about("decode frames to a numbered BMP sequence")
                .arg(Arg::new("input").help("input .ap path").required(true))
                .arg(
                    Arg::new("pattern")
                        .help("first output BMP, e.g. image0000.bmp")
                        .required(true),
                )
                .arg(Arg::new("start").help("first frame index (default 0)"))
                .arg(Arg::new("end").help("last frame index, inclusive (default: last frame)")),
        )
        .arg(Arg::new("play-path").help("an .ap path to summarise").index(1))
        .get_matches();

    let result = if let Some(m) = matches.subcommand_matches("c") {
        run_encode(m)
    } else if let Some(m) = matches.subcommand_matches("x") {
        run_decode(m)
    } else if let Some(path) = matches.value_of("play-path") {
        run_play(path)
    } else {
        eprintln!("usage: ap-cli c out.ap <fps> image0000.bmp | ap-cli x in.ap image0000.bmp [A [B]] | ap-cli in.ap");
        std::process::exit(1);
    };

    if let Err(msg) = result {
        eprintln!("ap-cli: {}", msg);
        std::process::exit(1);
    }
}

fn run_encode(m: &clap::ArgMatches) -> Result<(), String> {
    let output = m.value_of("output").unwrap();
    let fps: f32 = m
        .value_of("fps")
        .unwrap()
        .parse()
        .map_err(|_| "fps must be a number".to_owned())?;
    let pattern = Path::new(m.value_of("pattern").unwrap());
    let (prefix, width, suffix) =
        split_numbered(pattern).ok_or("input pattern must end in a run of digits, e.g. image0000.bmp")?;

    let options = EncoderOptions::new(fps, 7).map_err(|e| e.to_string())?;
    let mut encoder = FrameEncoder::new(options);
    encoder.set_file(output).map_err(|e| e.to_string())?;

    let mut n = 0usize;
    loop {
        let frame_path = numbered_path(pattern, &prefix, width, &suffix, n);
        if !frame_path.exists() {
            break;
        }
        let image = bmp::read_bmp(&frame_path).map_err(|e| e.to_string())?;
        encoder.put_image(&image).map_err(|e| e.to_string())?;
        n += 1;
    }

    if n == 0 {
        return Err(format!("no input frames found starting at {:?}", pattern));
    }

    encoder.close().map_err(|e| e.to_string())?;
    println!("encoded {} frames to {}", n, output);
    Ok(())
}

fn run_decode(m: &clap::ArgMatches) -> Result<(), String> {
    let input = m.value_of("input").unwrap();
    let pattern = Path::new(m.value_of("pattern").unwrap());
    let (prefix, width, suffix) =
        split_numbered(pattern).ok_or("output pattern must end in a run of digits, e.g. image0000.bmp")?;
    let start: u32 = m
        .value_of("start")
        .map(|s| s.parse().map_err(|_| "A must be a frame index".to_owned()))
        .transpose()?
        .unwrap_or(0);

    let mut decoder =
        FrameDecoder::open(input, DecoderOptions::default()).map_err(|e| e.to_string())?;
    let end: u32 = m
        .value_of("end")
        .map(|s| s.parse().map_err(|_| "B must be a frame index".to_owned()))
        .transpose()?
        .unwrap_or_else(|| decoder.frame_count().saturating_sub(1));

    if start > 0 {
        return Err("seeking past frame 0 is not supported; decode from A=0".to_owned());
    }

    let mut padded =
        Bitmap::new(decoder.buffer_width(), decoder.buffer_height(), 3).map_err(|e| e.to_string())?;

    let mut written = 0u32;
    let mut index = 0u32;
    while decoder.get_frame(&mut padded).map_err(|e| e.to_string())? {
        if index > end {
            break;
        }
        if index >= start {
            let frame = padded
                .crop_to(decoder.width(), decoder.height())
                .map_err(|e| e.to_string())?;
            let frame_path = numbered_path(pattern, &prefix, width, &suffix, index as usize);
            bmp::write_bmp(&frame_path, &frame).map_err(|e| e.to_string())?;
            written += 1;
        }
        index += 1;
    }

    decoder.close().map_err(|e| e.to_string())?;
    println!("decoded {} frames starting at {:?}", written, pattern);
    Ok(())
}

fn run_play(path: &str) -> Result<(), String> {
    let mut decoder = FrameDecoder::open(path, DecoderOptions::default()).map_err(|e| e.to_string())?;
    println!(
        "{}: {} frames at {} fps ({}x{})",
        path,
        decoder.frame_count(),
        decoder.fps(),
        decoder.width(),
        decoder.height()
    );
    decoder.close().map_err(|e| e.to_string())?;
    Ok(())
}

/// Splits a numbered filename like `image0000.bmp` into its prefix
/// (`image`), the digit run's width (`4`), and its suffix (`.bmp`).
fn split_numbered(path: &Path) -> Option<(String, usize, String)> {
    let file_name = path.file_name()?.to_str()?;
    let (stem, ext) = match file_name.rfind('.') {
        Some(i) => (&file_name[..i], &file_name[i..]),
        None => (file_name, ""),
    };
    let digit_start = stem.rfind(|c: char| !c.is_ascii_digit()).map_or(0, |i| i + 1);
    if digit_start == stem.len() {
        return None;
    }
    let width = stem.len() - digit_start;
    Some((stem[..digit_start].to_owned(), width, ext.to_owned()))
}

/// Rebuilds the sibling path for frame `n` next to `template`, using the
/// prefix/width/suffix extracted by [`split_numbered`].
fn numbered_path(template: &Path, prefix: &str, width: usize, suffix: &str, n: usize) -> PathBuf {
    let file_name = format!("{}{:0width$}{}", prefix, n, suffix, width = width);
    match template.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_a_standard_numbered_pattern() {
        let (prefix, width, suffix) = split_numbered(Path::new("image0000.bmp")).unwrap();
        assert_eq!(prefix, "image");
        assert_eq!(width, 4);
        assert_eq!(suffix, ".bmp");
    }

    #[test]
    fn rejects_a_pattern_with_no_digits() {
        assert!(split_numbered(Path::new("frame.bmp")).is_none());
    }

    #[test]
    fn numbered_path_zero_pads_to_the_template_width() {
        let template = Path::new("out/image0000.bmp");
        let (prefix, width, suffix) = split_numbered(template).unwrap();
        let path = numbered_path(template, &prefix, width, &suffix, 7);
        assert_eq!(path, Path::new("out/image0007.bmp"));
    }
}
