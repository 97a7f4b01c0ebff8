use cutline_core::entity::ParsedEntity;
use cutline_core::geometry::{Bounds2D, Point2, centroid};
use cutline_core::report::DesignStatistics;
use tracing::debug;

/// 汇总全部实体的设计级统计量。
///
/// 质心取所有构成点的平均值而不是各实体质心的平均值，避免点数少的实体被过度加权。
/// 距离统计为总体统计（除以 N）。范围退化时 `max_dimension` 回退到名义值，
/// 保证后续阈值计算的分母不为 0。
pub fn compute_design_statistics(
    entities: &[ParsedEntity],
    nominal_max_dimension: f64,
) -> DesignStatistics {
    let points: Vec<Point2> = entities
        .iter()
        .flat_map(|entity| entity.points_2d().iter().copied())
        .collect();

    let (Some(center), Some(bounds)) = (centroid(&points), Bounds2D::from_points(&points)) else {
        let mut stats = DesignStatistics::empty(nominal_max_dimension);
        stats.entity_count = entities.len();
        return stats;
    };

    let width = bounds.width();
    let height = bounds.height();
    let extent = width.max(height);
    let max_dimension = if extent > 0.0 {
        extent
    } else {
        nominal_max_dimension
    };
    let area = width * height;
    let entity_density = if area > 0.0 {
        entities.len() as f64 / area
    } else {
        0.0
    };

    let distances: Vec<f64> = points.iter().map(|p| p.distance(center)).collect();
    let count = distances.len() as f64;
    let mean_distance = distances.iter().sum::<f64>() / count;
    let variance = distances
        .iter()
        .map(|d| (d - mean_distance).powi(2))
        .sum::<f64>()
        / count;
    let std_deviation = variance.sqrt();

    debug!(
        entities = entities.len(),
        points = points.len(),
        max_dimension,
        mean_distance,
        std_deviation,
        "设计统计完成"
    );

    DesignStatistics {
        centroid: center,
        bounds: Some(bounds),
        max_dimension,
        mean_distance,
        std_deviation,
        entity_density,
        entity_count: entities.len(),
        point_count: points.len(),
    }
}
