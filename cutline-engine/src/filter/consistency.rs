use cutline_core::entity::ParsedEntity;
use cutline_core::report::RejectionReason;
use tracing::debug;

use super::{FilterStage, StageContext};

/// 几何一致性过滤：质心距设计质心超过 `mean + sigma × std` 的实体视为离群。
///
/// 阈值使用过滤前的设计统计量，不随前序阶段的剔除而更新。
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyFilter {
    sigma: f64,
}

impl ConsistencyFilter {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }
}

impl FilterStage for ConsistencyFilter {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn apply(
        &self,
        candidates: Vec<ParsedEntity>,
        context: &mut StageContext<'_>,
    ) -> Vec<ParsedEntity> {
        if candidates.len() < 2 {
            return candidates;
        }

        let design = context.design;
        let threshold = design.mean_distance + self.sigma * design.std_deviation;
        debug!(threshold, candidates = candidates.len(), "几何一致性阈值");

        let mut kept = Vec::with_capacity(candidates.len());
        for entity in candidates {
            let outlier = entity
                .centroid()
                .is_some_and(|c| c.distance(design.centroid) > threshold);
            if outlier {
                context.reject(self.name(), &entity, RejectionReason::GeometricInconsistent);
            } else {
                kept.push(entity);
            }
        }
        kept
    }
}
