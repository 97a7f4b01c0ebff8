use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 默认的隐藏图层名模式（不区分大小写的正则）。
pub const DEFAULT_HIDDEN_LAYER_PATTERNS: &[&str] = &[
    "defpoints",
    "construction",
    "hidden",
    "auxiliary",
    "temp",
    "guide",
    "reference",
    "dimension",
    "text",
    "phantom",
    "^_",
];

/// 默认的可疑线型模式（不区分大小写的正则）。
pub const DEFAULT_SUSPICIOUS_LINE_TYPE_PATTERNS: &[&str] =
    &["hidden", "construction", "center", "phantom", "dashed"];

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `CUTLINE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("CUTLINE_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 伪实体过滤的全部可调参数。默认值沿用线上经验值，均为可调项而非推导结果。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 直线端点距原点小于该值即视为编码回声。
    pub origin_tolerance: f64,
    /// 坐标绝对值上限（图纸原生单位，通常为毫米）。
    pub coordinate_limit: f64,
    /// 短于该长度的实体按零长度处理。
    pub min_length: f64,
    /// 直线长度超过 `oversized_line_factor × max_dimension` 视为伪实体。
    pub oversized_line_factor: f64,
    /// 质心距设计质心超过 `distance_factor × max_dimension` 视为伪实体。
    pub distance_factor: f64,
    /// 轴对齐直线长度超过 `axis_aligned_factor × max_dimension` 视为伪实体。
    pub axis_aligned_factor: f64,
    pub axis_tolerance: f64,
    /// 几何一致性阈值 `mean + consistency_sigma × std`。
    pub consistency_sigma: f64,
    pub cluster_radius: f64,
    /// 邻居数至少达到候选总数的该比例才保留。
    pub neighbor_ratio: f64,
    /// 设计范围退化为 0 时使用的名义最大尺寸。
    pub nominal_max_dimension: f64,
    pub hidden_layer_patterns: Vec<String>,
    pub suspicious_line_type_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            origin_tolerance: 0.001,
            coordinate_limit: 10_000.0,
            min_length: 0.001,
            oversized_line_factor: 5.0,
            distance_factor: 3.0,
            axis_aligned_factor: 2.0,
            axis_tolerance: 0.001,
            consistency_sigma: 3.0,
            cluster_radius: 50.0,
            neighbor_ratio: 0.3,
            nominal_max_dimension: 100.0,
            hidden_layer_patterns: to_owned(DEFAULT_HIDDEN_LAYER_PATTERNS),
            suspicious_line_type_patterns: to_owned(DEFAULT_SUSPICIOUS_LINE_TYPE_PATTERNS),
        }
    }
}

fn to_owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

/// 报表相关的固定参数。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportConfig {
    /// 存在有效实体时报告的板材利用效率（经验常数，不做排样计算）。
    #[serde(default = "ReportConfig::default_efficiency")]
    pub efficiency: f64,
}

impl ReportConfig {
    fn default_efficiency() -> f64 {
        0.85
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            efficiency: Self::default_efficiency(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.filter.origin_tolerance, 0.001);
        assert_eq!(cfg.filter.coordinate_limit, 10_000.0);
        assert_eq!(cfg.filter.cluster_radius, 50.0);
        assert_eq!(cfg.filter.neighbor_ratio, 0.3);
        assert_eq!(cfg.filter.nominal_max_dimension, 100.0);
        assert!(cfg.filter.hidden_layer_patterns.iter().any(|p| p == "defpoints"));
        assert_eq!(cfg.filter.suspicious_line_type_patterns.len(), 5);
        assert_eq!(cfg.report.efficiency, 0.85);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [filter]
            cluster_radius = 75.5
            neighbor_ratio = 0.25
            hidden_layer_patterns = ["^COTAS$", "defpoints"]

            [report]
            efficiency = 0.9
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.filter.cluster_radius, 75.5);
        assert_eq!(cfg.filter.neighbor_ratio, 0.25);
        assert_eq!(cfg.filter.hidden_layer_patterns, ["^COTAS$", "defpoints"]);
        // 未出现的字段保持默认值
        assert_eq!(cfg.filter.origin_tolerance, 0.001);
        assert_eq!(cfg.filter.suspicious_line_type_patterns.len(), 5);
        assert_eq!(cfg.report.efficiency, 0.9);
    }

    #[test]
    fn shipped_default_file_matches_builtin_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/default.toml");
        let cfg = AppConfig::from_file(&path).expect("load shipped config");
        assert_eq!(cfg.filter, FilterConfig::default());
        assert_eq!(cfg.report, ReportConfig::default());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn parse_errors_carry_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[filter]\ncluster_radius = \"wide\"").unwrap();

        let err = AppConfig::from_file(file.path()).expect_err("type mismatch must fail");
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
