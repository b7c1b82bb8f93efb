//! Minimal bit-exact 24-bit uncompressed BMP reader/writer: `BM` file
//! header, `BITMAPINFOHEADER`, scanlines padded to a multiple of 4 bytes
//! and stored bottom-up, BGR pixel order, 2835 px/metre (~72 DPI)
//! resolution. This is the only bitmap format the codec core needs to
//! interoperate with in practice.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use ap::Bitmap;

const FILE_HEADER_SIZE: u32 = 14;
const DIB_HEADER_SIZE: u32 = 40;
const PIXELS_PER_METRE: i32 = 2835;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

fn stride_for(width: u32) -> u32 {
    (width * 3 + 3) / 4 * 4
}

/// Reads a 24-bit uncompressed BMP file into an RGB [`Bitmap`].
pub fn read_bmp<P: AsRef<Path>>(path: P) -> io::Result<Bitmap> {
    let mut f = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 2];
    f.read_exact(&mut magic)?;
    if &magic != b"BM" {
        return Err(invalid_data("not a BMP file (bad magic)"));
    }
    let _file_size = f.read_u32::<LittleEndian>()?;
    let _reserved = f.read_u32::<LittleEndian>()?;
    let pixel_offset = f.read_u32::<LittleEndian>()?;

    let dib_size = f.read_u32::<LittleEndian>()?;
    if dib_size < DIB_HEADER_SIZE {
        return Err(invalid_data("unsupported DIB header"));
    }
    let width = f.read_i32::<LittleEndian>()?;
    let height = f.read_i32::<LittleEndian>()?;
    let _planes = f.read_u16::<LittleEndian>()?;
    let bitcount = f.read_u16::<LittleEndian>()?;
    let compression = f.read_u32::<LittleEndian>()?;
    if bitcount != 24 || compression != 0 {
        return Err(invalid_data(
            "only uncompressed 24-bit BMPs are supported",
        ));
    }
    if width <= 0 || height == 0 {
        return Err(invalid_data("non-positive BMP dimensions"));
    }

    // Skip the rest of the DIB header up to the pixel data offset.
    let consumed = FILE_HEADER_SIZE + dib_size;
    if pixel_offset < consumed {
        return Err(invalid_data("pixel data overlaps header"));
    }
    let mut skip = vec![0u8; (pixel_offset - consumed) as usize];
    f.read_exact(&mut skip)?;

    let width = width as u32;
    let top_down = height < 0;
    let height = height.unsigned_abs();
    let stride = stride_for(width);
    let mut row = vec![0u8; stride as usize];

    let mut bitmap = Bitmap::new(width, height, 3)
        .map_err(|e| invalid_data(format!("invalid bitmap dimensions: {}", e)))?;

    for i in 0..height {
        f.read_exact(&mut row)?;
        let y = if top_down { i } else { height - 1 - i };
        for x in 0..width {
            let o = (x * 3) as usize;
            bitmap.set_pixel_rgb(x, y, [row[o + 2], row[o + 1], row[o]]);
        }
    }

    Ok(bitmap)
}

/// Writes `bitmap` as a 24-bit uncompressed, bottom-up BMP file.
pub fn write_bmp<P: AsRef<Path>>(path: P, bitmap: &Bitmap) -> io::Result<()> {
    let width = bitmap.width();
    let height = bitmap.height();
    let stride = stride_for(width);
    let pixel_data_size = stride * height;
    let file_size = FILE_HEADER_SIZE + DIB_HEADER_SIZE + pixel_data_size;

    let mut f = BufWriter::new(File::create(path)?);
    f.write_all(b"BM")?;
    f.write_u32::<LittleEndian>(file_size)?;
    f.write_u32::<LittleEndian>(0)?;
    f.write_u32::<LittleEndian>(FILE_HEADER_SIZE + DIB_HEADER_SIZE)?;

    f.write_u32::<LittleEndian>(DIB_HEADER_SIZE)?;
    f.write_i32::<LittleEndian>(width as i32)?;
    f.write_i32::<LittleEndian>(height as i32)?;
    f.write_u16::<LittleEndian>(1)?;
    f.write_u16::<LittleEndian>(24)?;
    f.write_u32::<LittleEndian>(0)?;
    f.write_u32::<LittleEndian>(pixel_data_size)?;
    f.write_i32::<LittleEndian>(PIXELS_PER_METRE)?;
    f.write_i32::<LittleEndian>(PIXELS_PER_METRE)?;
    f.write_u32::<LittleEndian>(0)?;
    f.write_u32::<LittleEndian>(0)?;

    let padding = vec![0u8; (stride - width * 3) as usize];
    for y in (0..height).rev() {
        for x in 0..width {
            let rgb = bitmap.pixel_rgb(x, y);
            f.write_all(&[rgb[2], rgb[1], rgb[0]])?;
        }
        f.write_all(&padding)?;
    }
    f.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_a_small_image() {
        let mut bmp = Bitmap::new(3, 2, 3).unwrap();
        bmp.set_pixel_rgb(0, 0, [10, 20, 30]);
        bmp.set_pixel_rgb(2, 1, [200, 100, 50]);

        let tmp = NamedTempFile::new().unwrap();
        write_bmp(tmp.path(), &bmp).unwrap();
        let back = read_bmp(tmp.path()).unwrap();

        assert_eq!(back.width(), 3);
        assert_eq!(back.height(), 2);
        assert_eq!(back.pixel_rgb(0, 0), [10, 20, 30]);
        assert_eq!(back.pixel_rgb(2, 1), [200, 100, 50]);
    }

    #[test]
    fn rejects_non_bmp_file() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a bmp").unwrap();
        assert!(read_bmp(tmp.path()).is_err());
    }
}
