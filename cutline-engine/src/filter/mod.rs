use regex::RegexSet;
use tracing::debug;

use cutline_core::entity::ParsedEntity;
use cutline_core::report::{DesignStatistics, FilterStatistics, RejectionReason};

use crate::errors::EngineError;

mod cluster;
mod consistency;
mod rules;

pub use cluster::ClusterFilter;
pub use consistency::ConsistencyFilter;
pub use rules::{RuleFilter, RuleThresholds};

/// 不区分大小写的名称模式集合，用于图层名与线型名。
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: RegexSet,
}

impl PatternSet {
    pub fn compile(kind: &'static str, patterns: &[String]) -> Result<Self, EngineError> {
        for pattern in patterns {
            regex::Regex::new(pattern).map_err(|source| EngineError::InvalidPattern {
                kind,
                pattern: pattern.clone(),
                source,
            })?;
        }
        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}"))).map_err(
            |source| EngineError::InvalidPattern {
                kind,
                pattern: patterns.join(" | "),
                source,
            },
        )?;
        Ok(Self { set })
    }

    #[inline]
    pub fn matches(&self, text: &str) -> bool {
        self.set.is_match(text)
    }
}

/// 过滤阶段共享的上下文：原始设计统计量（不随过滤重新计算）与累计计数。
pub struct StageContext<'a> {
    pub design: &'a DesignStatistics,
    pub statistics: &'a mut FilterStatistics,
}

impl StageContext<'_> {
    pub fn reject(&mut self, stage: &'static str, entity: &ParsedEntity, reason: RejectionReason) {
        debug!(
            stage,
            kind = entity.kind().name(),
            layer = %entity.layer(),
            reason = ?reason,
            "实体被过滤"
        );
        self.statistics.record(reason);
    }
}

/// 有序过滤流水线中的一个阶段。输入为上一阶段的保留实体，返回本阶段保留的实体；
/// 被拒绝的实体必须通过 `StageContext::reject` 计数。
pub trait FilterStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(
        &self,
        candidates: Vec<ParsedEntity>,
        context: &mut StageContext<'_>,
    ) -> Vec<ParsedEntity>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use cutline_core::entity::{EntityAttributes, EntityKind, ParsedEntity};
    use cutline_core::geometry::Point3;

    pub fn entity_on(layer: &str, kind: EntityKind, coords: &[(f64, f64)]) -> ParsedEntity {
        ParsedEntity::new(
            kind,
            EntityAttributes::on_layer(layer),
            coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect(),
        )
    }

    pub fn line(a: (f64, f64), b: (f64, f64)) -> ParsedEntity {
        entity_on("CORTE", EntityKind::Line, &[a, b])
    }

    pub fn circle(center: (f64, f64), radius: f64) -> ParsedEntity {
        entity_on(
            "CORTE",
            EntityKind::Circle {
                radius: Some(radius),
            },
            &[center],
        )
    }
}
