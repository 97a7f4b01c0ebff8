use cutline_config::FilterConfig;
use cutline_core::entity::{EntityKind, ParsedEntity};
use cutline_core::geometry::Point2;
use cutline_core::report::{DesignStatistics, PhantomKind, RejectionReason};

use super::{FilterStage, PatternSet, StageContext};

/// 规则过滤使用的数值阈值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleThresholds {
    pub origin_tolerance: f64,
    pub coordinate_limit: f64,
    pub min_length: f64,
    pub oversized_line_factor: f64,
    pub distance_factor: f64,
    pub axis_aligned_factor: f64,
    pub axis_tolerance: f64,
}

impl From<&FilterConfig> for RuleThresholds {
    fn from(config: &FilterConfig) -> Self {
        Self {
            origin_tolerance: config.origin_tolerance,
            coordinate_limit: config.coordinate_limit,
            min_length: config.min_length,
            oversized_line_factor: config.oversized_line_factor,
            distance_factor: config.distance_factor,
            axis_aligned_factor: config.axis_aligned_factor,
            axis_tolerance: config.axis_tolerance,
        }
    }
}

/// 逐实体规则过滤：按固定顺序检查，命中第一条即拒绝。
pub struct RuleFilter {
    hidden_layers: PatternSet,
    suspicious_line_types: PatternSet,
    thresholds: RuleThresholds,
}

impl RuleFilter {
    pub fn new(
        hidden_layers: PatternSet,
        suspicious_line_types: PatternSet,
        thresholds: RuleThresholds,
    ) -> Self {
        Self {
            hidden_layers,
            suspicious_line_types,
            thresholds,
        }
    }

    pub fn classify(
        &self,
        entity: &ParsedEntity,
        design: &DesignStatistics,
    ) -> Option<RejectionReason> {
        if self.hidden_layers.matches(entity.layer()) {
            return Some(RejectionReason::HiddenLayer);
        }
        if !entity.is_visible() {
            return Some(RejectionReason::Invisible);
        }
        if entity
            .line_type()
            .is_some_and(|line_type| self.suspicious_line_types.matches(line_type))
        {
            return Some(RejectionReason::SuspiciousLineType);
        }
        if !has_valid_geometry(entity) {
            return Some(RejectionReason::InvalidGeometry);
        }
        if entity.length() < self.thresholds.min_length {
            return Some(RejectionReason::ZeroLength);
        }
        self.phantom_kind(entity, design).map(RejectionReason::Phantom)
    }

    fn phantom_kind(
        &self,
        entity: &ParsedEntity,
        design: &DesignStatistics,
    ) -> Option<PhantomKind> {
        let t = &self.thresholds;
        let points = entity.points_2d();
        let is_line = entity.kind().is_line();
        let length = entity.length();

        if is_line {
            let endpoints = [points.first(), points.last()];
            if endpoints
                .into_iter()
                .flatten()
                .any(|p| p.distance(Point2::ORIGIN) < t.origin_tolerance)
            {
                return Some(PhantomKind::OriginEcho);
            }
        }

        if points
            .iter()
            .any(|p| p.x().abs() > t.coordinate_limit || p.y().abs() > t.coordinate_limit)
        {
            return Some(PhantomKind::CoordinateOverflow);
        }

        if is_line && length > t.oversized_line_factor * design.max_dimension {
            return Some(PhantomKind::OversizedLine);
        }

        if entity
            .centroid()
            .is_some_and(|c| c.distance(design.centroid) > t.distance_factor * design.max_dimension)
        {
            return Some(PhantomKind::DistantCentroid);
        }

        if is_line
            && length > t.axis_aligned_factor * design.max_dimension
            && is_axis_aligned(points, t.axis_tolerance)
        {
            return Some(PhantomKind::AxisAlignedOverlength);
        }

        None
    }
}

impl FilterStage for RuleFilter {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn apply(
        &self,
        candidates: Vec<ParsedEntity>,
        context: &mut StageContext<'_>,
    ) -> Vec<ParsedEntity> {
        let mut kept = Vec::with_capacity(candidates.len());
        for entity in candidates {
            match self.classify(&entity, context.design) {
                Some(reason) => context.reject(self.name(), &entity, reason),
                None => kept.push(entity),
            }
        }
        kept
    }
}

fn has_valid_geometry(entity: &ParsedEntity) -> bool {
    let vertex_count = entity.points_2d().len();
    match *entity.kind() {
        EntityKind::Line | EntityKind::Polyline { .. } => vertex_count >= 2,
        EntityKind::Circle { radius } => vertex_count >= 1 && radius.is_some_and(|r| r > 0.0),
        EntityKind::Arc {
            radius,
            start_angle,
            end_angle,
        } => {
            vertex_count >= 1
                && radius.is_some_and(|r| r > 0.0)
                && start_angle.is_some()
                && end_angle.is_some()
        }
    }
}

fn is_axis_aligned(points: &[Point2], tolerance: f64) -> bool {
    match points {
        [start, .., end] => {
            (start.x() - end.x()).abs() < tolerance || (start.y() - end.y()).abs() < tolerance
        }
        _ => false,
    }
}
