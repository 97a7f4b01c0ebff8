use std::collections::HashMap;

use cutline_core::entity::ParsedEntity;
use cutline_core::geometry::Point2;
use cutline_core::report::RejectionReason;
use tracing::{debug, warn};

use super::{FilterStage, StageContext};

/// 密度聚类过滤：半径内邻居数不足候选总数一定比例的实体视为孤立点。
///
/// 若过滤会清空全部实体，则原样返回输入，不记录任何剔除。
#[derive(Debug, Clone, Copy)]
pub struct ClusterFilter {
    radius: f64,
    neighbor_ratio: f64,
}

impl ClusterFilter {
    pub fn new(radius: f64, neighbor_ratio: f64) -> Self {
        Self {
            radius,
            neighbor_ratio,
        }
    }

    /// 返回每个候选是否应当保留。
    fn survivors(&self, candidates: &[ParsedEntity]) -> Vec<bool> {
        let required = candidates.len() as f64 * self.neighbor_ratio;
        let grid = CentroidGrid::build(candidates, self.radius);
        candidates
            .iter()
            .enumerate()
            .map(|(index, entity)| match entity.centroid() {
                Some(center) => {
                    grid.count_neighbors(index, center, self.radius) as f64 >= required
                }
                None => true,
            })
            .collect()
    }
}

impl FilterStage for ClusterFilter {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn apply(
        &self,
        candidates: Vec<ParsedEntity>,
        context: &mut StageContext<'_>,
    ) -> Vec<ParsedEntity> {
        if candidates.len() < 3 {
            return candidates;
        }

        let keep = self.survivors(&candidates);
        if !keep.iter().any(|&k| k) {
            warn!(
                candidates = candidates.len(),
                radius = self.radius,
                "聚类过滤将清空所有实体，保留原始集合"
            );
            return candidates;
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for (entity, keep) in candidates.into_iter().zip(keep) {
            if keep {
                kept.push(entity);
            } else {
                context.reject(self.name(), &entity, RejectionReason::ClusterOutlier);
            }
        }
        debug!(kept = kept.len(), "聚类过滤完成");
        kept
    }
}

/// 以半径为边长的均匀网格，邻居查询只需检查相邻 3×3 个格子。
struct CentroidGrid {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<(usize, Point2)>>,
}

impl CentroidGrid {
    fn build(entities: &[ParsedEntity], radius: f64) -> Self {
        let cell = if radius > 0.0 { radius } else { 1.0 };
        let mut cells: HashMap<(i64, i64), Vec<(usize, Point2)>> = HashMap::new();
        for (index, entity) in entities.iter().enumerate() {
            if let Some(center) = entity.centroid() {
                cells
                    .entry(Self::key(cell, center))
                    .or_default()
                    .push((index, center));
            }
        }
        Self { cell, cells }
    }

    fn key(cell: f64, point: Point2) -> (i64, i64) {
        (
            (point.x() / cell).floor() as i64,
            (point.y() / cell).floor() as i64,
        )
    }

    fn count_neighbors(&self, index: usize, center: Point2, radius: f64) -> usize {
        let (cx, cy) = Self::key(self.cell, center);
        let mut count = 0;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                count += bucket
                    .iter()
                    .filter(|(other, point)| *other != index && point.distance(center) <= radius)
                    .count();
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use cutline_core::entity::EntityKind;
    use cutline_core::report::{DesignStatistics, FilterStatistics};

    use super::*;
    use crate::filter::test_support::{circle, entity_on};

    fn run(candidates: Vec<ParsedEntity>) -> (Vec<ParsedEntity>, FilterStatistics) {
        let design = DesignStatistics::empty(100.0);
        let mut statistics = FilterStatistics::default();
        let mut context = StageContext {
            design: &design,
            statistics: &mut statistics,
        };
        let kept = ClusterFilter::new(50.0, 0.3).apply(candidates, &mut context);
        (kept, statistics)
    }

    #[test]
    fn isolated_entity_is_rejected() {
        let (kept, statistics) = run(vec![
            circle((100.0, 100.0), 5.0),
            circle((120.0, 100.0), 5.0),
            circle((100.0, 130.0), 5.0),
            circle((600.0, 600.0), 5.0),
        ]);
        assert_eq!(kept.len(), 3);
        assert_eq!(statistics.cluster_outliers, 1);
        assert!(kept.iter().all(|e| e.centroid().is_some_and(|c| c.x() < 200.0)));
    }

    #[test]
    fn all_isolated_entities_are_returned_unchanged() {
        let (kept, statistics) = run(vec![
            circle((100.0, 100.0), 5.0),
            circle((400.0, 120.0), 5.0),
            circle((130.0, 420.0), 5.0),
            circle((380.0, 390.0), 5.0),
        ]);
        assert_eq!(kept.len(), 4);
        assert_eq!(statistics.cluster_outliers, 0);
    }

    #[test]
    fn fewer_than_three_candidates_skip_clustering() {
        let (kept, statistics) = run(vec![
            circle((0.0, 0.0), 5.0),
            circle((5_000.0, 0.0), 5.0),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(statistics.total_rejected(), 0);
    }

    #[test]
    fn neighbors_exactly_at_radius_count() {
        let (kept, _) = run(vec![
            circle((0.0, 0.0), 1.0),
            circle((50.0, 0.0), 1.0),
            circle((100.0, 0.0), 1.0),
        ]);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn entities_without_centroid_are_kept() {
        let (kept, statistics) = run(vec![
            entity_on("CORTE", EntityKind::Line, &[]),
            circle((10.0, 10.0), 2.0),
            circle((20.0, 10.0), 2.0),
            circle((15.0, 20.0), 2.0),
            circle((900.0, 900.0), 2.0),
        ]);
        assert_eq!(kept.len(), 4);
        assert_eq!(statistics.cluster_outliers, 1);
        assert!(kept[0].centroid().is_none());
    }

    #[test]
    fn grid_agrees_with_brute_force() {
        let candidates: Vec<ParsedEntity> = (0..40)
            .map(|i| {
                let x = (i * 37 % 400) as f64;
                let y = (i * 53 % 300) as f64;
                circle((x, y), 1.0)
            })
            .collect();
        let grid = CentroidGrid::build(&candidates, 50.0);
        for (index, entity) in candidates.iter().enumerate() {
            let center = entity.centroid().expect("circle has centroid");
            let brute = candidates
                .iter()
                .enumerate()
                .filter(|(other, e)| {
                    *other != index && e.centroid().is_some_and(|c| c.distance(center) <= 50.0)
                })
                .count();
            assert_eq!(grid.count_neighbors(index, center, 50.0), brute);
        }
    }
}
