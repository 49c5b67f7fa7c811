#![allow(dead_code)]

use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// 均匀灰图：没有边缘，熵为 0
pub fn gray_scene() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 320, Rgb([128, 128, 128])))
}

/// 浅色路面上密集的深色碎块
pub fn dumping_scene() -> DynamicImage {
    let img = RgbImage::from_fn(320, 320, |x, y| {
        if x % 6 < 4 && y % 6 < 4 {
            Rgb([77, 54, 10])
        } else {
            let s = ((x * 7 + y * 13) % 40) as u8;
            Rgb([199 + s, 158 + s, 51 + s / 2])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// 上半部分从左往右渐亮，下半部分反过来
pub fn gradient_scene() -> DynamicImage {
    let (w, h) = (480u32, 360u32);
    let img = RgbImage::from_fn(w, h, |x, y| {
        let ramp = if y < h / 2 { x } else { w - 1 - x };
        let v = (ramp * 255 / (w - 1)) as u8;
        Rgb([v, v / 2 + 40, 255 - v / 3])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn write_png(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

pub fn jpeg_bytes(img: &DynamicImage, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut out, ImageOutputFormat::Jpeg(quality)).unwrap();
    out
}

pub fn write_jpeg(dir: &Path, name: &str, img: &DynamicImage, quality: u8) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, jpeg_bytes(img, quality)).unwrap();
    path
}

/// 编码成 JPEG，并在 SOI 之后插入一个带 DateTimeOriginal 的 APP1 段
pub fn write_jpeg_with_capture_time(dir: &Path, name: &str, img: &DynamicImage, taken: &str) -> PathBuf {
    let field = Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![taken.as_bytes().to_vec()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let jpeg = jpeg_bytes(img, 90);
    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);

    let path = dir.join(name);
    std::fs::write(&path, out).unwrap();
    path
}
