use image::DynamicImage;
use img_hash::{HashAlg, HasherConfig, ImageHash}; // 引入 pHash 相关的配置器和算法枚举
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256}; // 引入 SHA2 算法和 Digest 特性(方法集)
use std::fmt;
use std::str::FromStr;

/// 指纹边长：8x8 = 64 位
pub const HASH_SIDE: u32 = 8;
pub const HASH_BITS: u32 = HASH_SIDE * HASH_SIDE;

/// 感知指纹 (Perceptual Fingerprint)
///
/// **作用**: 解决"内容同一性"。图片经过缩放、再压缩后 SHA256 会全变，但这里的汉明距离依然很小。
/// **存储**: 对外一律是 Base64 字符串 (短小，适合数据库的 String 列)。
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint(ImageHash);

impl Fingerprint {
    /// 两个指纹之间不同的位数 (0..=64)
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        self.0.dist(&other.0)
    }

    pub fn to_base64(&self) -> String {
        self.0.to_base64()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// 从已解码的图片计算感知指纹
///
/// 过程：缩小到 9x8 -> 灰度化 -> 比较相邻像素梯度 -> 64 位。
/// 工作尺寸固定，所以耗时与原图分辨率无关。
pub fn fingerprint(image: &DynamicImage) -> Fingerprint {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Gradient) // "梯度算法"：比均值算法(Mean)对明暗变化更鲁棒
        .hash_size(HASH_SIDE, HASH_SIDE)
        .to_hasher();

    Fingerprint(hasher.hash_image(image))
}

/// 原始字节的 SHA256 (小写十六进制)，解决"原始完整性"
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint {input:?}: {reason}")]
pub struct FingerprintParseError {
    pub input: String,
    pub reason: String,
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hash: ImageHash = ImageHash::from_base64(s.trim()).map_err(|e| FingerprintParseError {
            input: s.to_string(),
            reason: format!("{:?}", e),
        })?;

        // 长度不对的指纹 (比如旧版本的 hash_size) 无法比较距离
        if hash.as_bytes().len() as u32 * 8 != HASH_BITS {
            return Err(FingerprintParseError {
                input: s.to_string(),
                reason: format!("expected {} bits, found {}", HASH_BITS, hash.as_bytes().len() * 8),
            });
        }

        Ok(Fingerprint(hash))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_base64())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn ramp(width: u32, height: u32, flipped: bool) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let mut v = (x * 255 / (width - 1)) as u8;
            if (y < height / 2) == flipped {
                v = 255 - v;
            }
            Rgb([v, v / 2 + 40, 255 - v / 3])
        }))
    }

    #[test]
    fn identical_content_gives_identical_fingerprint() {
        let a = fingerprint(&ramp(200, 120, false));
        let b = fingerprint(&ramp(200, 120, false));
        assert_eq!(a, b);
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn resized_copy_stays_close() {
        let original = ramp(400, 300, false);
        let small = original.resize_exact(160, 120, image::imageops::FilterType::Triangle);
        assert!(fingerprint(&original).distance(&fingerprint(&small)) <= 4);
    }

    #[test]
    fn mirrored_content_is_far_apart() {
        let a = fingerprint(&ramp(200, 120, false));
        let b = fingerprint(&ramp(200, 120, true));
        assert!(a.distance(&b) > 32);
    }

    #[test]
    fn base64_form_parses_back() {
        let fp = fingerprint(&ramp(64, 64, false));
        let parsed: Fingerprint = fp.to_base64().parse().unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(parsed.as_bytes().len(), 8);

        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("not base64 at all!".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn digest_is_lower_hex_sha256() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
