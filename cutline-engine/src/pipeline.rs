use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use cutline_config::{AppConfig, FilterConfig, ReportConfig};
use cutline_core::entity::ParsedEntity;
use cutline_core::report::{DiscardedEntities, FilterStatistics, Metrics};
use cutline_io::parse_entities;
use once_cell::sync::Lazy;
use tracing::{debug, error, info};

use crate::errors::EngineError;
use crate::filter::{
    ClusterFilter, ConsistencyFilter, FilterStage, PatternSet, RuleFilter, RuleThresholds,
    StageContext,
};
use crate::metrics::{FilterRun, MetricsAggregator, SheetSize};
use crate::stats::compute_design_statistics;

/// 使用默认配置构建的共享流水线，只在首次使用时编译模式。
static DEFAULT_PIPELINE: Lazy<Result<Pipeline, EngineError>> =
    Lazy::new(|| Pipeline::new(&FilterConfig::default(), &ReportConfig::default()));

/// 使用默认配置分析一份 DXF 文本。永不失败：内部错误记录日志并返回空结果。
pub fn analyze(content: &str, sheet_width: Option<f64>, sheet_height: Option<f64>) -> Metrics {
    match DEFAULT_PIPELINE.as_ref() {
        Ok(pipeline) => pipeline.analyze(content, sheet_width, sheet_height),
        Err(err) => {
            error!(error = %err, "默认流水线构建失败");
            Metrics::empty(FilterConfig::default().nominal_max_dimension)
        }
    }
}

/// 解析、统计、分阶段过滤与汇总组成的完整流水线。
///
/// 流水线本身不持有可变状态，可以在多个线程间共享，每次调用相互独立。
pub struct Pipeline {
    stages: Vec<Box<dyn FilterStage>>,
    aggregator: MetricsAggregator,
    nominal_max_dimension: f64,
}

impl Pipeline {
    pub fn new(filter: &FilterConfig, report: &ReportConfig) -> Result<Self, EngineError> {
        validate_thresholds(filter, report)?;

        let hidden_layers = PatternSet::compile("layer", &filter.hidden_layer_patterns)?;
        let line_types = PatternSet::compile("line type", &filter.suspicious_line_type_patterns)?;

        let stages: Vec<Box<dyn FilterStage>> = vec![
            Box::new(RuleFilter::new(
                hidden_layers.clone(),
                line_types,
                RuleThresholds::from(filter),
            )),
            Box::new(ConsistencyFilter::new(filter.consistency_sigma)),
            Box::new(ClusterFilter::new(
                filter.cluster_radius,
                filter.neighbor_ratio,
            )),
        ];

        Ok(Self {
            stages,
            aggregator: MetricsAggregator::new(hidden_layers, report.efficiency),
            nominal_max_dimension: filter.nominal_max_dimension,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, EngineError> {
        Self::new(&config.filter, &config.report)
    }

    /// 在现有阶段之后追加一个过滤阶段。
    pub fn register<S: FilterStage + 'static>(&mut self, stage: S) {
        self.stages.push(Box::new(stage));
    }

    /// 过滤阶段名称，按执行顺序排列。
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// 与 [`Pipeline::try_analyze`] 相同，但内部故障（包括 panic）会被记录并转为空结果。
    pub fn analyze(
        &self,
        content: &str,
        sheet_width: Option<f64>,
        sheet_height: Option<f64>,
    ) -> Metrics {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.try_analyze(content, sheet_width, sheet_height)
        }));
        match outcome {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(err)) => {
                error!(error = %err, "DXF 分析失败，返回空结果");
                Metrics::empty(self.nominal_max_dimension)
            }
            Err(_) => {
                error!("DXF 分析过程中发生内部故障，返回空结果");
                Metrics::empty(self.nominal_max_dimension)
            }
        }
    }

    pub fn try_analyze(
        &self,
        content: &str,
        sheet_width: Option<f64>,
        sheet_height: Option<f64>,
    ) -> Result<Metrics, EngineError> {
        let outcome = parse_entities(content);
        let entities = outcome.entities;
        let total_entities = entities.len();
        let layer_order = layers_in_order(&entities);
        let design = compute_design_statistics(&entities, self.nominal_max_dimension);

        let mut statistics = FilterStatistics::default();
        let mut context = StageContext {
            design: &design,
            statistics: &mut statistics,
        };
        let mut candidates = entities;
        for stage in &self.stages {
            let before = candidates.len();
            candidates = stage.apply(candidates, &mut context);
            debug!(
                stage = stage.name(),
                before,
                after = candidates.len(),
                "过滤阶段完成"
            );
        }

        let rejected = statistics.total_rejected();
        if candidates.len() + rejected != total_entities {
            return Err(EngineError::Invariant(format!(
                "保留 {} 个、剔除 {} 个，与解析出的 {} 个实体不一致",
                candidates.len(),
                rejected,
                total_entities
            )));
        }

        info!(
            total_entities,
            valid_entities = candidates.len(),
            rejected,
            "伪实体过滤完成"
        );

        let run = FilterRun {
            layer_order,
            survivors: candidates,
            statistics,
            design,
            total_entities,
            discarded: DiscardedEntities {
                empty: outcome.discarded_empty,
                malformed: outcome.discarded_malformed,
            },
        };
        let sheet = SheetSize::from_dimensions(sheet_width, sheet_height);
        Ok(self.aggregator.aggregate(run, sheet))
    }
}

fn layers_in_order(entities: &[ParsedEntity]) -> Vec<String> {
    let mut seen = HashSet::new();
    entities
        .iter()
        .map(ParsedEntity::layer)
        .filter(|layer| seen.insert(*layer))
        .map(str::to_string)
        .collect()
}

fn validate_thresholds(filter: &FilterConfig, report: &ReportConfig) -> Result<(), EngineError> {
    let non_negative = [
        ("origin_tolerance", filter.origin_tolerance),
        ("min_length", filter.min_length),
        ("axis_tolerance", filter.axis_tolerance),
        ("consistency_sigma", filter.consistency_sigma),
    ];
    let positive = [
        ("coordinate_limit", filter.coordinate_limit),
        ("oversized_line_factor", filter.oversized_line_factor),
        ("distance_factor", filter.distance_factor),
        ("axis_aligned_factor", filter.axis_aligned_factor),
        ("cluster_radius", filter.cluster_radius),
        ("nominal_max_dimension", filter.nominal_max_dimension),
    ];
    let unit = [
        ("neighbor_ratio", filter.neighbor_ratio),
        ("efficiency", report.efficiency),
    ];

    let invalid = non_negative
        .into_iter()
        .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
        .or_else(|| {
            positive
                .into_iter()
                .find(|(_, value)| !(value.is_finite() && *value > 0.0))
        })
        .or_else(|| {
            unit.into_iter()
                .find(|(_, value)| !(0.0..=1.0).contains(value))
        });

    match invalid {
        Some((name, value)) => Err(EngineError::InvalidThreshold { name, value }),
        None => Ok(()),
    }
}
