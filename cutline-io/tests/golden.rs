use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cutline_core::entity::EntityKind;
use cutline_io::ParseOutcome;

const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Serialize, Deserialize)]
pub struct GoldenOutcome {
    entities: Vec<GoldenEntity>,
    discarded_empty: usize,
    discarded_malformed: usize,
    skipped_types: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoldenEntity {
    kind: String,
    layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed: Option<bool>,
    vertices: Vec<[f64; 3]>,
    length: f64,
}

impl GoldenOutcome {
    fn from_outcome(outcome: &ParseOutcome) -> Self {
        let entities = outcome
            .entities
            .iter()
            .map(|entity| GoldenEntity {
                kind: entity.kind().name().to_string(),
                layer: entity.layer().to_string(),
                closed: match entity.kind() {
                    EntityKind::Polyline { closed } => Some(*closed),
                    _ => None,
                },
                vertices: entity
                    .vertices()
                    .iter()
                    .map(|v| [v.x(), v.y(), v.z()])
                    .collect(),
                length: entity.length(),
            })
            .collect();
        Self {
            entities,
            discarded_empty: outcome.discarded_empty,
            discarded_malformed: outcome.discarded_malformed,
            skipped_types: outcome.skipped_types.clone(),
        }
    }

    fn matches(&self, other: &GoldenOutcome) -> bool {
        self.discarded_empty == other.discarded_empty
            && self.discarded_malformed == other.discarded_malformed
            && self.skipped_types == other.skipped_types
            && self.entities.len() == other.entities.len()
            && self
                .entities
                .iter()
                .zip(&other.entities)
                .all(|(a, b)| a.matches(b))
    }
}

impl GoldenEntity {
    fn matches(&self, other: &GoldenEntity) -> bool {
        self.kind == other.kind
            && self.layer == other.layer
            && self.closed == other.closed
            && approx(self.length, other.length)
            && self.vertices.len() == other.vertices.len()
            && self
                .vertices
                .iter()
                .zip(&other.vertices)
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| approx(*x, *y)))
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

pub fn assert_golden(name: &str, outcome: &ParseOutcome) {
    let snapshot = GoldenOutcome::from_outcome(outcome);
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/golden");
    if let Err(err) = fs::create_dir_all(&base_dir) {
        panic!("无法创建黄金数据目录 {}: {err}", base_dir.display());
    }
    let golden_path = base_dir.join(format!("{name}.json"));
    let serialized = serde_json::to_string_pretty(&snapshot).expect("序列化黄金快照失败");

    if !golden_path.exists() {
        fs::write(&golden_path, &serialized)
            .unwrap_or_else(|err| panic!("写入黄金文件 {} 失败: {err}", golden_path.display()));
        panic!(
            "黄金文件 {} 不存在，已自动生成。请确认内容后重新运行测试。",
            golden_path.display()
        );
    }

    let expected_str = fs::read_to_string(&golden_path)
        .unwrap_or_else(|err| panic!("读取黄金文件 {} 失败: {err}", golden_path.display()));
    let expected: GoldenOutcome = serde_json::from_str(&expected_str)
        .unwrap_or_else(|err| panic!("解析黄金文件 {} 失败: {err}", golden_path.display()));

    if !expected.matches(&snapshot) {
        let diff_path = base_dir.join(format!("{name}.actual.json"));
        fs::write(&diff_path, &serialized).expect("写入差异文件失败");
        panic!(
            "黄金文件 {} 与当前解析结果不一致。已生成对照输出 {}。",
            golden_path.display(),
            diff_path.display()
        );
    }
}
