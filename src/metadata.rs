//! 拍摄时间的可信度检查 (EXIF)
//!
//! 没有元数据不算失败：返回 `None` (未知)，由决策层按中性处理。

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, warn};

const EXIF_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// 按优先级查找的时间标签
const TIME_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// 拍摄时间早于 now - max_age_days 视为不可信
    pub max_age_days: i64,
    /// EXIF 时间没有时区，允许超前 now 这么多小时
    pub max_future_hours: i64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            max_age_days: 1825,
            max_future_hours: 24,
        }
    }
}

/// 检查拍摄时间是否合理
///
/// - `None`: 没有 EXIF，或 EXIF 里没有时间也没有设备信息
/// - `Some(false)`: 时间离谱，或有相机厂商/型号却缺少时间 (被抹掉了)
/// - `Some(true)`: 时间落在允许的窗口内
pub fn check_capture_time(
    bytes: &[u8],
    now: DateTime<Utc>,
    config: &MetadataConfig,
) -> Option<bool> {
    let exif = read_exif(bytes)?;

    match capture_time(&exif) {
        CaptureTime::Present(taken) => {
            // 超出 chrono 可表示范围时视为该方向不设限
            let earliest = Duration::try_days(config.max_age_days).and_then(|d| now.checked_sub_signed(d));
            let latest = Duration::try_hours(config.max_future_hours).and_then(|d| now.checked_add_signed(d));
            let ok = earliest.map_or(true, |e| taken >= e) && latest.map_or(true, |l| taken <= l);
            debug!(%taken, ok, "EXIF 拍摄时间");
            Some(ok)
        }
        CaptureTime::Malformed(raw) => {
            debug!(raw = %raw, "EXIF 时间格式无法解析");
            Some(false)
        }
        CaptureTime::Absent if has_device_tags(&exif) => {
            debug!("有设备信息但缺少拍摄时间");
            Some(false)
        }
        CaptureTime::Absent => None,
    }
}

/// 读出图片里嵌入的 EXIF；没有或格式不支持都算"缺失"
fn read_exif(bytes: &[u8]) -> Option<Exif> {
    let mut cursor = Cursor::new(bytes);
    match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => Some(exif),
        Err(exif::Error::NotFound(_)) => None,
        Err(err) => {
            warn!(error = %err, "EXIF 不可读，按缺失处理");
            None
        }
    }
}

enum CaptureTime {
    Present(DateTime<Utc>),
    Malformed(String),
    Absent,
}

fn capture_time(exif: &Exif) -> CaptureTime {
    for tag in TIME_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        let Value::Ascii(ref parts) = field.value else {
            continue;
        };
        let Some(raw) = parts.first() else {
            continue;
        };

        let text = String::from_utf8_lossy(raw);
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        // 时钟没设置的相机会写全 0 或空格
        if text.is_empty() || text.starts_with("0000") {
            continue;
        }

        return match NaiveDateTime::parse_from_str(text, EXIF_TIME_FORMAT) {
            Ok(naive) => CaptureTime::Present(Utc.from_utc_datetime(&naive)),
            Err(_) => CaptureTime::Malformed(text.to_string()),
        };
    }
    CaptureTime::Absent
}

fn has_device_tags(exif: &Exif) -> bool {
    [Tag::Make, Tag::Model]
        .into_iter()
        .any(|tag| exif.get_field(tag, In::PRIMARY).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::Field;

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    /// 最小 JPEG 容器：SOI + APP1(Exif) + EOI
    fn jpeg_with(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_metadata_is_unknown() {
        assert_eq!(check_capture_time(b"not an image", now(), &MetadataConfig::default()), None);
    }

    #[test]
    fn recent_capture_is_plausible() {
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "2026:05:30 08:15:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(true));
    }

    #[test]
    fn far_future_capture_fails() {
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "2036:06:01 12:00:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(false));
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "2026:06:01 20:00:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(true));
    }

    #[test]
    fn ancient_capture_fails() {
        let bytes = jpeg_with(&[ascii(Tag::DateTime, "2001:01:01 00:00:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(false));
    }

    #[test]
    fn camera_without_timestamp_fails() {
        let bytes = jpeg_with(&[ascii(Tag::Make, "Canon"), ascii(Tag::Model, "EOS 80D")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(false));
    }

    #[test]
    fn unparseable_timestamp_fails() {
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "garbage")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), Some(false));
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let cfg = MetadataConfig {
            max_age_days: i64::MAX,
            max_future_hours: i64::MAX,
        };
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "1999:01:01 00:00:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &cfg), Some(true));
    }

    #[test]
    fn zeroed_clock_counts_as_absent() {
        let bytes = jpeg_with(&[ascii(Tag::DateTimeOriginal, "0000:00:00 00:00:00")]);
        assert_eq!(check_capture_time(&bytes, now(), &MetadataConfig::default()), None);
    }
}
