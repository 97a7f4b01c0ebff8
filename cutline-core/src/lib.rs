pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，单位沿用图纸原生单位（通常为毫米）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        pub const ORIGIN: Point2 = Point2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维点。DXF 顶点保留 Z 分量，过滤与统计只使用其二维投影。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        /// 投影到 XY 平面。
        #[inline]
        pub fn to_2d(self) -> Point2 {
            Point2(self.0.truncate())
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算设计范围与可用面积。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由点集构建边界框，点集为空时返回 None。
        pub fn from_points<'a, I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = &'a Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(*point);
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        #[inline]
        pub fn area(&self) -> f64 {
            self.width() * self.height()
        }
    }

    /// 点集的算术平均位置，空点集没有质心。
    pub fn centroid(points: &[Point2]) -> Option<Point2> {
        if points.is_empty() {
            return None;
        }
        let sum = points
            .iter()
            .fold(DVec2::ZERO, |acc, point| acc + point.as_vec2());
        Some(Point2::from_vec(sum / points.len() as f64))
    }
}

pub mod entity {
    use std::f64::consts::TAU;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Point3, centroid};

    /// 未指定图层时 DXF 约定的默认图层。
    pub const DEFAULT_LAYER: &str = "0";

    /// 流水线识别的几何类型。圆弧角度以弧度储存。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "camelCase")]
    pub enum EntityKind {
        Line,
        Polyline {
            closed: bool,
        },
        Circle {
            radius: Option<f64>,
        },
        Arc {
            radius: Option<f64>,
            start_angle: Option<f64>,
            end_angle: Option<f64>,
        },
    }

    impl EntityKind {
        pub fn name(&self) -> &'static str {
            match self {
                EntityKind::Line => "LINE",
                EntityKind::Polyline { .. } => "POLYLINE",
                EntityKind::Circle { .. } => "CIRCLE",
                EntityKind::Arc { .. } => "ARC",
            }
        }

        #[inline]
        pub fn is_line(&self) -> bool {
            matches!(self, EntityKind::Line)
        }

        /// 按类型计算切割长度：直线取前两点距离，多段线累加各段（闭合时补最后一段），
        /// 圆取周长，圆弧取 `r·Δθ`。
        pub fn length_of(&self, points: &[Point2]) -> f64 {
            match *self {
                EntityKind::Line => match points {
                    [start, end, ..] => start.distance(*end),
                    _ => 0.0,
                },
                EntityKind::Polyline { closed } => {
                    let open_length: f64 = points
                        .windows(2)
                        .map(|pair| pair[0].distance(pair[1]))
                        .sum();
                    match points {
                        [first, .., last] if closed && points.len() >= 3 => {
                            open_length + last.distance(*first)
                        }
                        _ => open_length,
                    }
                }
                EntityKind::Circle { radius } => match radius {
                    Some(r) if r > 0.0 => TAU * r,
                    _ => 0.0,
                },
                EntityKind::Arc {
                    radius,
                    start_angle,
                    end_angle,
                } => match (radius, start_angle, end_angle) {
                    (Some(r), Some(start), Some(end)) if r > 0.0 => {
                        let end = if end < start { end + TAU } else { end };
                        r * (end - start)
                    }
                    _ => 0.0,
                },
            }
        }
    }

    /// 实体的显示/分类属性，来自组码 8、62、6、60。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EntityAttributes {
        pub layer: String,
        pub color_index: Option<i32>,
        pub line_type: Option<String>,
        pub visible: bool,
    }

    impl Default for EntityAttributes {
        fn default() -> Self {
            Self {
                layer: DEFAULT_LAYER.to_string(),
                color_index: None,
                line_type: None,
                visible: true,
            }
        }
    }

    impl EntityAttributes {
        pub fn on_layer(layer: impl Into<String>) -> Self {
            Self {
                layer: layer.into(),
                ..Self::default()
            }
        }
    }

    /// 完成解析的实体。构造时一次性计算二维投影、长度与质心，之后不可修改。
    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ParsedEntity {
        kind: EntityKind,
        #[serde(flatten)]
        attributes: EntityAttributes,
        vertices: Vec<Point3>,
        points_2d: Vec<Point2>,
        length: f64,
        centroid: Option<Point2>,
    }

    impl ParsedEntity {
        pub fn new(kind: EntityKind, attributes: EntityAttributes, vertices: Vec<Point3>) -> Self {
            let points_2d: Vec<Point2> = vertices.iter().map(|v| v.to_2d()).collect();
            let length = kind.length_of(&points_2d);
            let centroid = centroid(&points_2d);
            Self {
                kind,
                attributes,
                vertices,
                points_2d,
                length,
                centroid,
            }
        }

        #[inline]
        pub fn kind(&self) -> &EntityKind {
            &self.kind
        }

        #[inline]
        pub fn layer(&self) -> &str {
            &self.attributes.layer
        }

        #[inline]
        pub fn color_index(&self) -> Option<i32> {
            self.attributes.color_index
        }

        #[inline]
        pub fn line_type(&self) -> Option<&str> {
            self.attributes.line_type.as_deref()
        }

        #[inline]
        pub fn is_visible(&self) -> bool {
            self.attributes.visible
        }

        #[inline]
        pub fn vertices(&self) -> &[Point3] {
            &self.vertices
        }

        #[inline]
        pub fn points_2d(&self) -> &[Point2] {
            &self.points_2d
        }

        #[inline]
        pub fn length(&self) -> f64 {
            self.length
        }

        #[inline]
        pub fn centroid(&self) -> Option<Point2> {
            self.centroid
        }
    }
}

pub mod report {
    use serde::{Deserialize, Serialize};

    use crate::entity::ParsedEntity;
    use crate::geometry::{Bounds2D, Point2};

    /// 过滤前基于全部实体计算的设计级统计量。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DesignStatistics {
        pub centroid: Point2,
        pub bounds: Option<Bounds2D>,
        pub max_dimension: f64,
        pub mean_distance: f64,
        pub std_deviation: f64,
        pub entity_density: f64,
        pub entity_count: usize,
        pub point_count: usize,
    }

    impl DesignStatistics {
        /// 没有任何点时的统计结果，`max_dimension` 取给定的名义值。
        pub fn empty(nominal_max_dimension: f64) -> Self {
            Self {
                centroid: Point2::ORIGIN,
                bounds: None,
                max_dimension: nominal_max_dimension,
                mean_distance: 0.0,
                std_deviation: 0.0,
                entity_density: 0.0,
                entity_count: 0,
                point_count: 0,
            }
        }
    }

    /// 启发式规则判定为伪实体的具体原因。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum PhantomKind {
        OriginEcho,
        CoordinateOverflow,
        OversizedLine,
        DistantCentroid,
        AxisAlignedOverlength,
    }

    /// 实体被过滤的原因，每个原因归入 `FilterStatistics` 的一个计数桶。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum RejectionReason {
        HiddenLayer,
        Invisible,
        SuspiciousLineType,
        InvalidGeometry,
        ZeroLength,
        Phantom(PhantomKind),
        GeometricInconsistent,
        ClusterOutlier,
    }

    /// 各类过滤计数，只增不减。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FilterStatistics {
        pub suspicious_lines: usize,
        pub hidden_layers: usize,
        pub zero_length: usize,
        pub phantom_entities: usize,
        pub geometric_inconsistent: usize,
        pub cluster_outliers: usize,
    }

    impl FilterStatistics {
        pub fn record(&mut self, reason: RejectionReason) {
            let bucket = match reason {
                RejectionReason::HiddenLayer | RejectionReason::Invisible => {
                    &mut self.hidden_layers
                }
                RejectionReason::SuspiciousLineType => &mut self.suspicious_lines,
                RejectionReason::InvalidGeometry | RejectionReason::ZeroLength => {
                    &mut self.zero_length
                }
                RejectionReason::Phantom(_) => &mut self.phantom_entities,
                RejectionReason::GeometricInconsistent => &mut self.geometric_inconsistent,
                RejectionReason::ClusterOutlier => &mut self.cluster_outliers,
            };
            *bucket += 1;
        }

        pub fn total_rejected(&self) -> usize {
            self.suspicious_lines
                + self.hidden_layers
                + self.zero_length
                + self.phantom_entities
                + self.geometric_inconsistent
                + self.cluster_outliers
        }
    }

    /// 过滤后的图层汇总。`is_hidden` 只由图层名决定，与是否有实体被过滤无关。
    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LayerSummary {
        pub name: String,
        pub entities: Vec<ParsedEntity>,
        pub vector_count: usize,
        pub total_length: f64,
        pub is_hidden: bool,
    }

    impl LayerSummary {
        pub fn new(name: impl Into<String>, is_hidden: bool) -> Self {
            Self {
                name: name.into(),
                entities: Vec::new(),
                vector_count: 0,
                total_length: 0.0,
                is_hidden,
            }
        }

        pub fn push(&mut self, entity: ParsedEntity) {
            self.vector_count += 1;
            self.total_length += entity.length();
            self.entities.push(entity);
        }
    }

    /// 板材覆盖率估算。效率是固定的经验值，不做排样计算。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MaterialUsage {
        pub sheet_width: f64,
        pub sheet_height: f64,
        pub sheet_area: f64,
        pub coverage_ratio: f64,
        pub efficiency: f64,
    }

    /// 解析器丢弃、未进入过滤流程的实体数量。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DiscardedEntities {
        pub empty: usize,
        pub malformed: usize,
    }

    /// 单次解析的最终结果快照。
    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Metrics {
        pub total_layers: usize,
        pub total_vectors: usize,
        pub total_length: f64,
        /// 解析器识别出的实体数：进入过滤的实体加上没有顶点的空实体。
        /// 数值损坏的实体无法确认完整结构，不计入。
        pub total_parsed: usize,
        /// 进入过滤阶段的实体数，等于保留数与各类剔除数之和。
        pub total_entities: usize,
        pub valid_entities: usize,
        pub discarded_entities: DiscardedEntities,
        pub bounds: Option<Bounds2D>,
        pub usable_area: f64,
        pub layers: Vec<LayerSummary>,
        pub layers_with_vectors: Vec<String>,
        pub filter_statistics: FilterStatistics,
        pub design_statistics: DesignStatistics,
        pub material: Option<MaterialUsage>,
    }

    impl Metrics {
        /// 空结果：所有计数为 0，没有图层。
        pub fn empty(nominal_max_dimension: f64) -> Self {
            Self {
                total_layers: 0,
                total_vectors: 0,
                total_length: 0.0,
                total_parsed: 0,
                total_entities: 0,
                valid_entities: 0,
                discarded_entities: DiscardedEntities::default(),
                bounds: None,
                usable_area: 0.0,
                layers: Vec::new(),
                layers_with_vectors: Vec::new(),
                filter_statistics: FilterStatistics::default(),
                design_statistics: DesignStatistics::empty(nominal_max_dimension),
                material: None,
            }
        }

        /// 过滤后保留的全部实体，按图层顺序返回。
        pub fn surviving_entities(&self) -> impl Iterator<Item = &ParsedEntity> + '_ {
            self.layers.iter().flat_map(|layer| layer.entities.iter())
        }
    }
}
