use std::collections::HashMap;

use cutline_core::entity::ParsedEntity;
use cutline_core::geometry::Bounds2D;
use cutline_core::report::{
    DesignStatistics, DiscardedEntities, FilterStatistics, LayerSummary, MaterialUsage, Metrics,
};
use tracing::debug;

use crate::filter::PatternSet;

/// 板材尺寸。两边都必须为正的有限值才参与覆盖率计算。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetSize {
    pub width: f64,
    pub height: f64,
}

impl SheetSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 两个尺寸都给出且有效时返回板材尺寸，否则不计算材料用量。
    pub fn from_dimensions(width: Option<f64>, height: Option<f64>) -> Option<Self> {
        match (width, height) {
            (Some(w), Some(h)) if is_positive(w) && is_positive(h) => Some(Self::new(w, h)),
            _ => None,
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// 过滤流程的产出，作为汇总的输入。
#[derive(Debug, Clone)]
pub struct FilterRun {
    /// 解析阶段出现过的全部图层，按首次出现顺序排列。
    pub layer_order: Vec<String>,
    pub survivors: Vec<ParsedEntity>,
    pub statistics: FilterStatistics,
    pub design: DesignStatistics,
    pub total_entities: usize,
    pub discarded: DiscardedEntities,
}

/// 把保留实体按图层归并，生成最终报表。
pub struct MetricsAggregator {
    hidden_layers: PatternSet,
    efficiency: f64,
}

impl MetricsAggregator {
    pub fn new(hidden_layers: PatternSet, efficiency: f64) -> Self {
        Self {
            hidden_layers,
            efficiency,
        }
    }

    pub fn aggregate(&self, run: FilterRun, sheet: Option<SheetSize>) -> Metrics {
        let FilterRun {
            layer_order,
            survivors,
            statistics,
            design,
            total_entities,
            discarded,
        } = run;

        let bounds = Bounds2D::from_points(survivors.iter().flat_map(|e| e.points_2d()));
        let usable_area = bounds.map_or(0.0, |b| b.area());
        let total_vectors = survivors.len();

        let mut layers: Vec<LayerSummary> = Vec::with_capacity(layer_order.len());
        let mut index_of: HashMap<String, usize> = HashMap::with_capacity(layer_order.len());
        for name in layer_order {
            if index_of.contains_key(&name) {
                continue;
            }
            let is_hidden = self.hidden_layers.matches(&name);
            index_of.insert(name.clone(), layers.len());
            layers.push(LayerSummary::new(name, is_hidden));
        }
        for entity in survivors {
            let index = match index_of.get(entity.layer()) {
                Some(&index) => index,
                None => {
                    let name = entity.layer().to_string();
                    let is_hidden = self.hidden_layers.matches(&name);
                    index_of.insert(name.clone(), layers.len());
                    layers.push(LayerSummary::new(name, is_hidden));
                    layers.len() - 1
                }
            };
            layers[index].push(entity);
        }

        let total_length = layers.iter().map(|layer| layer.total_length).sum();
        let layers_with_vectors = layers
            .iter()
            .filter(|layer| layer.vector_count > 0)
            .map(|layer| layer.name.clone())
            .collect();

        let material = sheet.map(|sheet| {
            let sheet_area = sheet.area();
            MaterialUsage {
                sheet_width: sheet.width,
                sheet_height: sheet.height,
                sheet_area,
                coverage_ratio: usable_area / sheet_area,
                efficiency: if total_vectors > 0 {
                    self.efficiency
                } else {
                    0.0
                },
            }
        });

        debug!(
            layers = layers.len(),
            total_vectors, total_length, usable_area, "指标汇总完成"
        );

        Metrics {
            total_layers: layers.len(),
            total_vectors,
            total_length,
            total_parsed: total_entities + discarded.empty,
            total_entities,
            valid_entities: total_vectors,
            discarded_entities: discarded,
            bounds,
            usable_area,
            layers,
            layers_with_vectors,
            filter_statistics: statistics,
            design_statistics: design,
            material,
        }
    }
}
