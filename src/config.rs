use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::duplicate::DuplicateConfig;
use crate::error::ConfigError;
use crate::heuristic::ScorerConfig;
use crate::metadata::MetadataConfig;
use crate::model::ModelConfig;
use crate::pipeline::PipelineConfig;
use crate::policy::PolicyConfig;

const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// EXIF 窗口上限：100 年 / 1 年
const MAX_EXIF_AGE_DAYS: i64 = 36_500;
const MAX_EXIF_FUTURE_HOURS: i64 = 8_760;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    /// 内存台账最多保留多少条提交
    pub ledger_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            model: ModelConfig::default(),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，未设置的键使用默认值
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let policy_defaults = PolicyConfig::default();
        let dup_defaults = DuplicateConfig::default();
        let meta_defaults = MetadataConfig::default();
        let model_defaults = ModelConfig::default();

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: vars.string("HOST").unwrap_or(server_defaults.host),
            port: vars
                .parse("PORT", "a port number")?
                .unwrap_or(server_defaults.port),
        };

        let policy = PolicyConfig {
            action_cutoff: vars
                .unit("PV_ACTION_CUTOFF")?
                .unwrap_or(policy_defaults.action_cutoff),
            duplicate_penalty: vars
                .unit("PV_DUP_PENALTY")?
                .unwrap_or(policy_defaults.duplicate_penalty),
            disable_duplicate_penalty: vars
                .flag("PV_DISABLE_DUP_PENALTY")?
                .unwrap_or(policy_defaults.disable_duplicate_penalty),
            strong_duplicate_distance: vars
                .parse("PV_STRONG_DUP_DISTANCE", "an unsigned integer")?
                .unwrap_or(policy_defaults.strong_duplicate_distance),
            ..policy_defaults
        };

        let scorer = ScorerConfig {
            floor: vars
                .unit("PV_HEURISTIC_FLOOR")?
                .unwrap_or(ScorerConfig::default().floor),
            ..ScorerConfig::default()
        };

        let max_distance: u32 = vars
            .parse("PV_DUP_MAX_DISTANCE", "an unsigned integer")?
            .unwrap_or(dup_defaults.max_distance);
        if max_distance > crate::fingerprint::HASH_BITS {
            return Err(ConfigError::OutOfRange {
                key: "PV_DUP_MAX_DISTANCE",
                value: max_distance.to_string(),
                range: "0..=64",
            });
        }
        let duplicates = DuplicateConfig {
            max_distance,
            window: vars.positive("PV_DUP_WINDOW")?.unwrap_or(dup_defaults.window),
        };

        let metadata = MetadataConfig {
            max_age_days: vars
                .bounded("PV_EXIF_MAX_AGE_DAYS", MAX_EXIF_AGE_DAYS, "0..=36500")?
                .unwrap_or(meta_defaults.max_age_days),
            max_future_hours: vars
                .bounded("PV_EXIF_MAX_FUTURE_HOURS", MAX_EXIF_FUTURE_HOURS, "0..=8760")?
                .unwrap_or(meta_defaults.max_future_hours),
        };

        let model = ModelConfig {
            model_path: vars.string("PV_MODEL_PATH").map(PathBuf::from),
            class_map_path: vars.string("PV_CLASS_MAP_PATH").map(PathBuf::from),
            positive_label: vars
                .string("PV_POSITIVE_LABEL")
                .unwrap_or(model_defaults.positive_label),
            blend: vars.unit("PV_MODEL_BLEND")?.unwrap_or(model_defaults.blend),
        };
        if model.model_path.is_some() && model.class_map_path.is_none() {
            return Err(ConfigError::Missing {
                key: "PV_CLASS_MAP_PATH",
                requires: "PV_MODEL_PATH",
            });
        }

        Ok(Self {
            server,
            pipeline: PipelineConfig {
                scorer,
                policy,
                duplicates,
                metadata,
            },
            model,
            ledger_capacity: vars
                .positive("PV_LEDGER_CAPACITY")?
                .unwrap_or(DEFAULT_LEDGER_CAPACITY),
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 空字符串等同于未设置
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError> {
        self.string(key)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::Invalid {
                    key,
                    value: value.clone(),
                    expected,
                })
            })
            .transpose()
    }

    /// [0,1] 内的有限浮点数
    fn unit(&self, key: &'static str) -> Result<Option<f64>, ConfigError> {
        let value: Option<f64> = self.parse(key, "a number")?;
        match value {
            Some(v) if !v.is_finite() || !(0.0..=1.0).contains(&v) => Err(ConfigError::OutOfRange {
                key,
                value: v.to_string(),
                range: "[0, 1]",
            }),
            other => Ok(other),
        }
    }

    fn positive(&self, key: &'static str) -> Result<Option<usize>, ConfigError> {
        match self.parse::<usize>(key, "an unsigned integer")? {
            Some(0) => Err(ConfigError::OutOfRange {
                key,
                value: "0".to_string(),
                range: ">= 1",
            }),
            other => Ok(other),
        }
    }

    /// 0..=max 的整数
    fn bounded(&self, key: &'static str, max: i64, range: &'static str) -> Result<Option<i64>, ConfigError> {
        match self.parse::<i64>(key, "an integer")? {
            Some(v) if !(0..=max).contains(&v) => Err(ConfigError::OutOfRange {
                key,
                value: v.to_string(),
                range,
            }),
            other => Ok(other),
        }
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        self.string(key)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value,
                    expected: "a boolean (1/0/true/false)",
                }),
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.pipeline.policy.action_cutoff, 0.50);
        assert_eq!(cfg.pipeline.policy.duplicate_penalty, 0.40);
        assert!(!cfg.pipeline.policy.disable_duplicate_penalty);
        assert_eq!(cfg.pipeline.scorer.floor, 0.08);
        assert_eq!(cfg.pipeline.duplicates.window, 200);
        assert_eq!(cfg.model.model_path, None);
        assert_eq!(cfg.ledger_capacity, 10_000);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("PV_ACTION_CUTOFF", "0.65"),
            ("PV_DUP_PENALTY", "0.25"),
            ("PV_DISABLE_DUP_PENALTY", "1"),
            ("PV_HEURISTIC_FLOOR", "0.1"),
            ("PV_DUP_MAX_DISTANCE", "6"),
            ("PV_MODEL_PATH", "ai/model.onnx"),
            ("PV_CLASS_MAP_PATH", "ai/class_map.json"),
            ("PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(cfg.pipeline.policy.action_cutoff, 0.65);
        assert_eq!(cfg.pipeline.policy.duplicate_penalty, 0.25);
        assert!(cfg.pipeline.policy.disable_duplicate_penalty);
        assert_eq!(cfg.pipeline.scorer.floor, 0.1);
        assert_eq!(cfg.pipeline.duplicates.max_distance, 6);
        assert_eq!(cfg.model.model_path, Some(PathBuf::from("ai/model.onnx")));
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn non_numeric_threshold_fails_at_load() {
        let err = load(&[("PV_ACTION_CUTOFF", "half")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PV_ACTION_CUTOFF", .. }));
    }

    #[test]
    fn out_of_range_values_fail() {
        assert!(matches!(
            load(&[("PV_DUP_PENALTY", "1.5")]),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            load(&[("PV_HEURISTIC_FLOOR", "NaN")]),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            load(&[("PV_DUP_MAX_DISTANCE", "65")]),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            load(&[("PV_DUP_WINDOW", "0")]),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn exif_window_is_bounded_at_load() {
        assert_eq!(
            load(&[("PV_EXIF_MAX_AGE_DAYS", "100000000")]).unwrap_err(),
            ConfigError::OutOfRange {
                key: "PV_EXIF_MAX_AGE_DAYS",
                value: "100000000".to_string(),
                range: "0..=36500",
            }
        );
        assert!(matches!(
            load(&[("PV_EXIF_MAX_FUTURE_HOURS", "8761")]),
            Err(ConfigError::OutOfRange { key: "PV_EXIF_MAX_FUTURE_HOURS", .. })
        ));
        assert!(matches!(
            load(&[("PV_EXIF_MAX_AGE_DAYS", "-1")]),
            Err(ConfigError::OutOfRange { .. })
        ));

        let cfg = load(&[("PV_EXIF_MAX_AGE_DAYS", "36500"), ("PV_EXIF_MAX_FUTURE_HOURS", "0")]).unwrap();
        assert_eq!(cfg.pipeline.metadata.max_age_days, 36_500);
        assert_eq!(cfg.pipeline.metadata.max_future_hours, 0);
    }

    #[test]
    fn bad_flag_fails() {
        assert!(load(&[("PV_DISABLE_DUP_PENALTY", "maybe")]).is_err());
        let cfg = load(&[("PV_DISABLE_DUP_PENALTY", "off")]).unwrap();
        assert!(!cfg.pipeline.policy.disable_duplicate_penalty);
    }

    #[test]
    fn model_path_requires_class_map() {
        assert_eq!(
            load(&[("PV_MODEL_PATH", "m.onnx")]).unwrap_err(),
            ConfigError::Missing {
                key: "PV_CLASS_MAP_PATH",
                requires: "PV_MODEL_PATH",
            }
        );
    }
}
