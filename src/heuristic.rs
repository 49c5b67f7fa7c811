//! 启发式相关性打分 (Heuristic Relevance Scorer)
//!
//! **职责**: 不依赖任何训练好的模型，只看像素统计量，给出"这张图像不像一张真实的户外垃圾现场照"的 0..1 分数。
//!
//! **流程**:
//! 1. 缩放到固定工作尺寸，通道归一化到 [0,1]
//! 2. 灰度 = 0.299 R + 0.587 G + 0.114 B
//! 3. 水平/垂直梯度 -> 边缘密度、直线度
//! 4. 饱和度、户外色 (偏绿 / 偏棕) 比例
//! 5. 森林惩罚：户外色多、饱和度高、边缘却很少 (树林、草地)
//! 6. 暗区比例、"垃圾线索" (暗 + 强梯度同时出现)
//! 7. 灰度直方图熵 (按 log2(bins) 归一化)
//! 8. 加权求和 + 举报类型奖励 - 森林惩罚
//! 9. 截断到 [floor, 1]
//!
//! 所有常量都在 [`ScorerConfig`] 里，同一张图 + 同一份配置的结果逐位可复现。

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evidence::ReportType;
use crate::policy::clamp_unit;

/// 各特征的线性权重
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub edge_density: f64,
    pub straightness: f64,
    pub outdoor_ratio: f64,
    pub dark_ratio: f64,
    pub entropy: f64,
    pub trash_cue: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            edge_density: 0.30,
            straightness: 0.18,
            outdoor_ratio: 0.14,
            dark_ratio: 0.18,
            entropy: 0.12,
            trash_cue: 0.08,
        }
    }
}

/// 森林惩罚的触发条件与上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPenalty {
    pub min_outdoor_ratio: f64,
    pub min_saturation: f64,
    pub max_edge_density: f64,
    pub cap: f64,
}

impl Default for ForestPenalty {
    fn default() -> Self {
        Self {
            min_outdoor_ratio: 0.20,
            min_saturation: 0.30,
            max_edge_density: 0.12,
            cap: 0.10,
        }
    }
}

/// 户外色的通道阈值
///
/// 偏绿: G > R && G > B && G > green_min
/// 偏棕: R > brown_red_min && G > brown_green_min && B < brown_blue_max && R > B
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorThresholds {
    pub green_min: f64,
    pub brown_red_min: f64,
    pub brown_green_min: f64,
    pub brown_blue_max: f64,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            green_min: 0.28,
            brown_red_min: 0.28,
            brown_green_min: 0.20,
            brown_blue_max: 0.38,
        }
    }
}

/// 启发式打分器的全部常量，构造一次后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// 工作分辨率 (正方形边长)
    pub working_size: u32,
    /// 边缘密度用的梯度分位数
    pub edge_percentile: f64,
    /// 垃圾线索用的梯度分位数
    pub trash_edge_percentile: f64,
    pub dark_threshold: f64,
    pub trash_cue_scale: f64,
    pub straightness_scale: f64,
    pub entropy_bins: usize,
    pub colors: ColorThresholds,
    pub forest: ForestPenalty,
    pub weights: FeatureWeights,
    /// `illegal_dumping` 的固定奖励
    pub dumping_bonus: f64,
    /// 最终分数下限
    pub floor: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            working_size: 320,
            edge_percentile: 60.0,
            trash_edge_percentile: 70.0,
            dark_threshold: 0.28,
            trash_cue_scale: 1.5,
            straightness_scale: 4.0,
            entropy_bins: 32,
            colors: ColorThresholds::default(),
            forest: ForestPenalty::default(),
            weights: FeatureWeights::default(),
            dumping_bonus: 0.05,
            floor: 0.08,
        }
    }
}

/// 单张图片的特征向量 (随结果一起保存，方便人工复核时看清楚分数从哪来)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub edge_density: f64,
    pub straightness: f64,
    pub saturation: f64,
    pub outdoor_ratio: f64,
    pub forest_penalty: f64,
    pub dark_ratio: f64,
    pub trash_cue: f64,
    pub entropy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicScore {
    pub score: f64,
    pub features: FeatureVector,
}

/// 相关性分数 (0..1)，越高越像真实的户外现场
pub fn score_relevance(image: &DynamicImage, report_type: &ReportType, config: &ScorerConfig) -> f64 {
    score_with_features(image, report_type, config).score
}

/// 同 [`score_relevance`]，同时返回特征明细
pub fn score_with_features(
    image: &DynamicImage,
    report_type: &ReportType,
    config: &ScorerConfig,
) -> HeuristicScore {
    let features = extract_features(image, config);
    let score = combine(&features, report_type, config);

    debug!(
        edges = features.edge_density,
        straight = features.straightness,
        outdoor = features.outdoor_ratio,
        dark = features.dark_ratio,
        trash_cue = features.trash_cue,
        entropy = features.entropy,
        penalty = features.forest_penalty,
        score,
        "heuristic"
    );

    HeuristicScore { score, features }
}

/// 特征加权求和，截断到 [floor, 1]
pub fn combine(features: &FeatureVector, report_type: &ReportType, config: &ScorerConfig) -> f64 {
    let w = &config.weights;
    let mut base = w.edge_density * features.edge_density
        + w.straightness * features.straightness
        + w.outdoor_ratio * features.outdoor_ratio
        + w.dark_ratio * features.dark_ratio
        + w.entropy * features.entropy
        + w.trash_cue * features.trash_cue;

    if report_type.is_illegal_dumping() {
        base += config.dumping_bonus;
    }

    let score = base - features.forest_penalty;
    clamp_unit(score.max(config.floor).min(1.0))
}

/// 归一化到工作尺寸的像素帧
struct WorkingFrame {
    width: usize,
    height: usize,
    rgb: Vec<[f64; 3]>,
    gray: Vec<f64>,
}

impl WorkingFrame {
    fn from_image(image: &DynamicImage, size: u32) -> Self {
        let size = size.max(2);
        let resized = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        let rgb: Vec<[f64; 3]> = resized
            .pixels()
            .map(|p| [p[0] as f64 / 255.0, p[1] as f64 / 255.0, p[2] as f64 / 255.0])
            .collect();
        let gray = rgb.iter().map(|&[r, g, b]| luminance(r, g, b)).collect();

        Self {
            width: size as usize,
            height: size as usize,
            rgb,
            gray,
        }
    }

    fn gray_at(&self, x: usize, y: usize) -> f64 {
        self.gray[y * self.width + x]
    }
}

fn luminance(r: f64, g: f64, b: f64) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// 提取全部特征 (纯函数，无状态)
pub fn extract_features(image: &DynamicImage, config: &ScorerConfig) -> FeatureVector {
    let frame = WorkingFrame::from_image(image, config.working_size);
    let (w, h) = (frame.width, frame.height);

    // --- 梯度 / 边缘 ---
    // gx: h x (w-1)，gy: (h-1) x w，幅值取公共区域 (h-1) x (w-1)
    let mut gx_sum = 0.0;
    for y in 0..h {
        for x in 0..w - 1 {
            gx_sum += (frame.gray_at(x + 1, y) - frame.gray_at(x, y)).abs();
        }
    }
    let mut gy_sum = 0.0;
    for y in 0..h - 1 {
        for x in 0..w {
            gy_sum += (frame.gray_at(x, y + 1) - frame.gray_at(x, y)).abs();
        }
    }

    let (mw, mh) = (w - 1, h - 1);
    let mut magnitude = Vec::with_capacity(mw * mh);
    for y in 0..mh {
        for x in 0..mw {
            let gx = (frame.gray_at(x + 1, y) - frame.gray_at(x, y)).abs();
            let gy = (frame.gray_at(x, y + 1) - frame.gray_at(x, y)).abs();
            magnitude.push(gx.hypot(gy));
        }
    }

    let mut sorted = magnitude.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let edge_threshold = percentile(&sorted, config.edge_percentile);
    let trash_threshold = percentile(&sorted, config.trash_edge_percentile);

    let edge_density = fraction(magnitude.iter(), |&&m| m > edge_threshold);

    // 直线度：平均梯度能量放大后截断 (道路、垃圾桶这类人造结构)
    let row_energy = gx_sum / (h * (w - 1)) as f64;
    let col_energy = gy_sum / ((h - 1) * w) as f64;
    let straightness = (config.straightness_scale * 0.5 * (row_energy + col_energy)).min(1.0);

    // --- 户外色 + 饱和度 ---
    let c = &config.colors;
    let saturation = mean(frame.rgb.iter().map(|&[r, g, b]| {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max > 0.0 {
            (max - min) / (max + 1e-6)
        } else {
            0.0
        }
    }));
    let outdoor_ratio = fraction(frame.rgb.iter(), |&&[r, g, b]| {
        let greenish = g > r && g > b && g > c.green_min;
        let brownish = r > c.brown_red_min && g > c.brown_green_min && b < c.brown_blue_max && r > b;
        greenish || brownish
    });

    // --- 森林惩罚 (有上限) ---
    let f = &config.forest;
    let forest_penalty = if outdoor_ratio > f.min_outdoor_ratio
        && saturation > f.min_saturation
        && edge_density < f.max_edge_density
    {
        f.cap.min(0.5 * outdoor_ratio + 0.5 * saturation)
    } else {
        0.0
    };

    // --- 暗区 (垃圾袋 / 沥青 / 箱体) ---
    let dark_ratio = fraction(frame.gray.iter(), |&&v| v < config.dark_threshold);

    // "垃圾线索"：暗像素与强梯度同时出现
    let mut trash_hits = 0usize;
    for y in 0..mh {
        for x in 0..mw {
            if frame.gray_at(x, y) < config.dark_threshold && magnitude[y * mw + x] > trash_threshold {
                trash_hits += 1;
            }
        }
    }
    let trash_cue = trash_hits as f64 / magnitude.len() as f64 * config.trash_cue_scale;

    let entropy = histogram_entropy(&frame.gray, config.entropy_bins);

    FeatureVector {
        edge_density,
        straightness,
        saturation,
        outdoor_ratio,
        forest_penalty,
        dark_ratio,
        trash_cue,
        entropy,
    }
}

/// 线性插值分位数 (输入必须已升序)
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn fraction<I, T, F>(values: I, pred: F) -> f64
where
    I: ExactSizeIterator<Item = T>,
    F: Fn(&T) -> bool,
{
    let total = values.len();
    if total == 0 {
        return 0.0;
    }
    values.filter(|v| pred(v)).count() as f64 / total as f64
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

/// 灰度直方图的香农熵 / log2(bins)，落在 [0,1]
pub fn histogram_entropy(gray: &[f64], bins: usize) -> f64 {
    if gray.is_empty() || bins < 2 {
        return 0.0;
    }

    let mut hist = vec![0usize; bins];
    for &v in gray {
        let idx = ((v.clamp(0.0, 1.0) * bins as f64) as usize).min(bins - 1);
        hist[idx] += 1;
    }

    let n = gray.len() as f64;
    let entropy: f64 = hist
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum();

    clamp_unit(entropy / (bins as f64).log2())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const EPS: f64 = 1e-9;

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 320, Rgb([r, g, b])))
    }

    #[test]
    fn uniform_gray_sits_on_the_floor() {
        let cfg = ScorerConfig::default();
        let scored = score_with_features(&solid(128, 128, 128), &ReportType::IllegalDumping, &cfg);
        assert_eq!(scored.features.edge_density, 0.0);
        assert_eq!(scored.features.entropy, 0.0);
        assert!((scored.score - cfg.floor).abs() < EPS);
    }

    #[test]
    fn dense_green_field_gets_forest_penalty() {
        let cfg = ScorerConfig::default();
        let features = extract_features(&solid(40, 160, 40), &cfg);
        assert_eq!(features.outdoor_ratio, 1.0);
        assert!(features.saturation > 0.7);
        assert!((features.forest_penalty - cfg.forest.cap).abs() < EPS);
    }

    #[test]
    fn busy_scene_has_no_forest_penalty() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(320, 320, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Rgb([40, 160, 40])
            } else {
                Rgb([10, 60, 10])
            }
        }));
        let features = extract_features(&img, &ScorerConfig::default());
        assert!(features.edge_density > 0.12);
        assert_eq!(features.forest_penalty, 0.0);
    }

    #[test]
    fn dumping_bonus_only_for_dumping_reports() {
        let cfg = ScorerConfig {
            floor: 0.0,
            ..Default::default()
        };
        let features = FeatureVector {
            edge_density: 0.5,
            dark_ratio: 0.5,
            ..Default::default()
        };
        let dumping = combine(&features, &ReportType::IllegalDumping, &cfg);
        let other = combine(&features, &ReportType::from("graffiti"), &cfg);
        assert!((dumping - other - cfg.dumping_bonus).abs() < EPS);
    }

    #[test]
    fn combine_is_capped_at_one() {
        let cfg = ScorerConfig::default();
        let features = FeatureVector {
            edge_density: 1.0,
            straightness: 1.0,
            outdoor_ratio: 1.0,
            dark_ratio: 1.0,
            entropy: 1.0,
            trash_cue: 1.5,
            ..Default::default()
        };
        assert_eq!(combine(&features, &ReportType::IllegalDumping, &cfg), 1.0);
    }

    #[test]
    fn alternate_weights_change_the_score() {
        let img = solid(20, 20, 20);
        let base = ScorerConfig::default();
        let heavy_dark = ScorerConfig {
            weights: FeatureWeights {
                dark_ratio: 0.60,
                ..Default::default()
            },
            ..Default::default()
        };
        let a = score_relevance(&img, &ReportType::IllegalDumping, &base);
        let b = score_relevance(&img, &ReportType::IllegalDumping, &heavy_dark);
        assert!((a - 0.23).abs() < 1e-6);
        assert!((b - 0.65).abs() < 1e-6);
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 60.0) - 2.4).abs() < EPS);
        assert!((percentile(&sorted, 100.0) - 4.0).abs() < EPS);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn entropy_bounds() {
        assert_eq!(histogram_entropy(&[0.5; 100], 32), 0.0);

        let spread: Vec<f64> = (0..32).map(|i| (i as f64 + 0.5) / 32.0).collect();
        assert!((histogram_entropy(&spread, 32) - 1.0).abs() < EPS);

        let two: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.1 } else { 0.9 }).collect();
        assert!((histogram_entropy(&two, 32) - 0.2).abs() < EPS);
    }

    #[test]
    fn scoring_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(500, 375, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x * y) % 239) as u8])
        }));
        let cfg = ScorerConfig::default();
        let a = score_with_features(&img, &ReportType::IllegalDumping, &cfg);
        let b = score_with_features(&img, &ReportType::IllegalDumping, &cfg);
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a.score));
    }
}
