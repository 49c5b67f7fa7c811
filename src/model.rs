//! 模型打分后端 (可选)
//!
//! 配置了分类器文件 + 类别映射并且能加载时，用它替代 (或按比例混合) 启发式分数。
//! 加载 / 推理失败一律返回 [`ModelError`]，由 [`crate::scorer::Scorer`] 回退到启发式，绝不阻塞提交。

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ModelError;
use crate::policy::clamp_unit;

/// 模型输入边长 (NCHW, 1x3xSxS, [0,1])
pub const MODEL_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 未设置 = 纯启发式模式
    pub model_path: Option<PathBuf>,
    pub class_map_path: Option<PathBuf>,
    /// 代表"有效提交"的类别名
    pub positive_label: String,
    /// 1.0 = 模型完全覆盖启发式；0.5 = 各占一半
    pub blend: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            class_map_path: None,
            positive_label: "valid".to_string(),
            blend: 1.0,
        }
    }
}

/// 类别下标 -> 类别名
///
/// 支持三种 JSON 写法：
/// - `["invalid", "valid"]`
/// - `{"invalid": 0, "valid": 1}` (名字 -> 下标)
/// - `{"0": "invalid", "1": "valid"}` (下标 -> 名字)
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    labels: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawClassMap {
    List(Vec<String>),
    ByName(BTreeMap<String, usize>),
    ByIndex(BTreeMap<String, String>),
}

impl ClassMap {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let raw: RawClassMap =
            serde_json::from_slice(bytes).map_err(|e| ModelError::ClassMap(e.to_string()))?;

        let pairs: Vec<(usize, String)> = match raw {
            RawClassMap::List(labels) => labels.into_iter().enumerate().collect(),
            RawClassMap::ByName(map) => map.into_iter().map(|(label, idx)| (idx, label)).collect(),
            RawClassMap::ByIndex(map) => map
                .into_iter()
                .map(|(idx, label)| {
                    idx.trim()
                        .parse::<usize>()
                        .map(|idx| (idx, label))
                        .map_err(|_| ModelError::ClassMap(format!("non-numeric class index {:?}", idx)))
                })
                .collect::<Result<_, _>>()?,
        };

        if pairs.is_empty() {
            return Err(ModelError::ClassMap("no classes".into()));
        }

        let mut labels = vec![String::new(); pairs.len()];
        for (idx, label) in pairs {
            let slot = labels
                .get_mut(idx)
                .ok_or_else(|| ModelError::ClassMap(format!("class index {} out of range", idx)))?;
            if !slot.is_empty() {
                return Err(ModelError::ClassMap(format!("duplicate class index {}", idx)));
            }
            *slot = label;
        }

        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.eq_ignore_ascii_case(label))
    }
}

/// 已加载、只读的分类器
///
/// 推理会话放在互斥锁里，多个请求可以共享同一个实例。
pub struct ModelScorer {
    version: String,
    positive_index: usize,
    class_count: usize,
    #[cfg(feature = "onnx")]
    session: std::sync::Mutex<ort::session::Session>,
}

impl std::fmt::Debug for ModelScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelScorer")
            .field("version", &self.version)
            .field("positive_index", &self.positive_index)
            .field("class_count", &self.class_count)
            .finish()
    }
}

impl ModelScorer {
    /// 加载模型文件和类别映射
    pub fn load(config: &ModelConfig) -> Result<Self, ModelError> {
        let model_path = config
            .model_path
            .as_deref()
            .ok_or_else(|| ModelError::Backend("no model path configured".into()))?;
        let model_bytes = read_artifact(model_path)?;

        let class_map_path = config
            .class_map_path
            .as_deref()
            .ok_or_else(|| ModelError::ClassMap("no class map path configured".into()))?;
        let class_map = ClassMap::from_json(&read_artifact(class_map_path)?)?;

        let positive_index = class_map.index_of(&config.positive_label).ok_or_else(|| {
            ModelError::ClassMap(format!("label {:?} not in class map", config.positive_label))
        })?;

        let version = artifact_version(&model_bytes);

        #[cfg(feature = "onnx")]
        {
            let session = ort::session::Session::builder()
                .and_then(|builder| builder.commit_from_memory(&model_bytes))
                .map_err(|e| ModelError::Backend(e.to_string()))?;

            info!(%version, classes = class_map.len(), "模型加载完成");
            Ok(Self {
                version,
                positive_index,
                class_count: class_map.len(),
                session: std::sync::Mutex::new(session),
            })
        }

        #[cfg(not(feature = "onnx"))]
        {
            info!(%version, positive_index, "模型文件可读，但未启用 onnx 特性");
            Err(ModelError::Backend(
                "built without the `onnx` feature".into(),
            ))
        }
    }

    /// 例如 `onnx-3f9a0c12ab45`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 正类的概率 (0..1)
    #[cfg(feature = "onnx")]
    pub fn score(&self, image: &DynamicImage) -> Result<f64, ModelError> {
        use ort::value::Tensor;

        let size = MODEL_INPUT_SIZE as usize;
        let input = Tensor::from_array(([1usize, 3, size, size], preprocess(image, MODEL_INPUT_SIZE)))
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let raw: Vec<f32> = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| ModelError::Inference("session lock poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| ModelError::Inference(e.to_string()))?;
            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Inference(e.to_string()))?;
            data.to_vec()
        };

        if raw.len() != self.class_count {
            return Err(ModelError::Inference(format!(
                "expected {} outputs, got {}",
                self.class_count,
                raw.len()
            )));
        }

        Ok(probabilities(&raw)[self.positive_index])
    }

    #[cfg(not(feature = "onnx"))]
    pub fn score(&self, _image: &DynamicImage) -> Result<f64, ModelError> {
        Err(ModelError::Backend("built without the `onnx` feature".into()))
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ModelError> {
    fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ModelError::Missing(path.to_path_buf()),
        _ => ModelError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// 用模型文件的 blake3 前缀标识具体是哪一个模型
pub fn artifact_version(model_bytes: &[u8]) -> String {
    let digest = blake3::hash(model_bytes);
    format!("onnx-{}", &hex::encode(digest.as_bytes())[..12])
}

/// 缩放到 size x size，转成 NCHW 排布的 [0,1] 浮点
pub fn preprocess(image: &DynamicImage, size: u32) -> Vec<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let plane = (size * size) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    out
}

/// 模型输出已经是概率就原样使用，否则做 softmax
pub fn probabilities(raw: &[f32]) -> Vec<f64> {
    let values: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
    let sum: f64 = values.iter().sum();
    let looks_like_probs = values.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() < 1e-3;
    if looks_like_probs {
        return values.into_iter().map(clamp_unit).collect();
    }

    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| clamp_unit(e / total)).collect()
}
