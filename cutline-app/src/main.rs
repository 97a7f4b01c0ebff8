use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cutline_config::{AppConfig, ConfigError};
use cutline_core::report::Metrics;
use cutline_engine::Pipeline;
use cutline_io::{DxfFacade, DxfSource};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 分析 DXF 切割图纸，输出切割长度、可用面积与过滤统计。
#[derive(Debug, Parser)]
#[command(name = "cutline", version, about)]
struct Cli {
    /// 配置文件路径，缺省时读取 `CUTLINE_CONFIG` 或 `./config/default.toml`。
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 板材宽度，与高度同时给出时计算覆盖率。
    #[arg(long, value_name = "MM")]
    sheet_width: Option<f64>,
    #[arg(long, value_name = "MM")]
    sheet_height: Option<f64>,
    /// 每个文件输出一行紧凑 JSON。
    #[arg(long)]
    compact: bool,
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    file: &'a Path,
    metrics: Metrics,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // 日志尚未初始化，直接写 stderr
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(&cli, &config) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "部分文件未能读取");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = ?err, "执行失败");
            ExitCode::FAILURE
        }
    }
}

/// 逐个分析文件并输出报表，返回读取失败的文件数量。
fn run(cli: &Cli, config: &AppConfig) -> Result<usize> {
    let pipeline = Pipeline::from_config(config).context("无法根据配置构建过滤流水线")?;
    let source = DxfFacade::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0;

    for path in &cli.files {
        let content = match source.read(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "跳过无法读取的文件");
                failed += 1;
                continue;
            }
        };
        info!(path = %path.display(), bytes = content.len(), "开始分析");
        let metrics = pipeline.analyze(&content, cli.sheet_width, cli.sheet_height);
        info!(
            path = %path.display(),
            valid = metrics.valid_entities,
            rejected = metrics.filter_statistics.total_rejected(),
            total_length = metrics.total_length,
            usable_area = metrics.usable_area,
            "分析完成"
        );
        let report = FileReport {
            file: path,
            metrics,
        };
        write_report(&mut out, &report, cli.compact)
            .with_context(|| format!("输出 {} 的结果失败", path.display()))?;
    }
    Ok(failed)
}

fn write_report(out: &mut impl Write, report: &FileReport<'_>, compact: bool) -> Result<()> {
    if compact {
        serde_json::to_writer(&mut *out, report)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, report)?;
    }
    writeln!(out)?;
    Ok(())
}

/// 显式指定的配置必须可用；自动发现的配置失败时回退到内建默认值。
fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = override_path {
        return AppConfig::from_file(path)
            .with_context(|| format!("加载指定配置 {} 失败", path.display()));
    }
    let config = match AppConfig::discover() {
        Ok(cfg) => cfg,
        Err(err) => {
            match &err {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    eprintln!("加载默认配置 {} 失败，使用内建默认值: {err}", path.display());
                }
                ConfigError::Context { .. } => {
                    eprintln!("加载默认配置失败，使用内建默认值: {err}");
                }
            }
            AppConfig::default()
        }
    };
    Ok(config)
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
