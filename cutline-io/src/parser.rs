use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace};

use cutline_core::entity::{EntityAttributes, EntityKind, ParsedEntity};
use cutline_core::geometry::Point3;

use crate::reader::{RawToken, TokenCursor};

/// Y/Z 伴随组码的最大前瞻记录数。
const COMPANION_WINDOW: usize = 2;

/// DXF 组码 60 中表示"不可见"的取值。
const INVISIBLE_FLAG: i32 = 1;

/// 一次解析的结果：完成的实体以及被丢弃实体的计数。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub entities: Vec<ParsedEntity>,
    pub discarded_empty: usize,
    pub discarded_malformed: usize,
    /// 未识别的实体类型及出现次数，这些实体的组码不会归入前一个实体。
    pub skipped_types: BTreeMap<String, usize>,
}

/// 单个实体内部的错误，只用于把当前实体标记为损坏，不会向外传播。
#[derive(Debug, Error)]
enum EntityError {
    #[error("第 {line} 行的组码无法解析为整数")]
    InvalidGroupCode { line: usize },
    #[error("第 {line} 行组码 {code} 的值 \"{value}\" 无法解析为数字")]
    InvalidNumber {
        code: i32,
        value: String,
        line: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraftKind {
    Line,
    LwPolyline,
    Polyline,
    Circle,
    Arc,
}

impl DraftKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "LINE" => Some(Self::Line),
            "LWPOLYLINE" => Some(Self::LwPolyline),
            "POLYLINE" => Some(Self::Polyline),
            "CIRCLE" => Some(Self::Circle),
            "ARC" => Some(Self::Arc),
            _ => None,
        }
    }
}

/// 解析中的实体。只在解析器内部存在，完成后通过 `finish` 消费为 `ParsedEntity`。
#[derive(Debug)]
struct EntityDraft {
    kind: DraftKind,
    attributes: EntityAttributes,
    vertices: Vec<Point3>,
    radius: Option<f64>,
    start_angle: Option<f64>,
    end_angle: Option<f64>,
    flags: i32,
    malformed: bool,
    /// 当前位于 POLYLINE 的 VERTEX 子记录中，只接受坐标组码。
    in_vertex: bool,
}

impl EntityDraft {
    fn new(kind: DraftKind) -> Self {
        Self {
            kind,
            attributes: EntityAttributes::default(),
            vertices: Vec::new(),
            radius: None,
            start_angle: None,
            end_angle: None,
            flags: 0,
            malformed: false,
            in_vertex: false,
        }
    }

    fn apply(
        &mut self,
        token: RawToken<'_>,
        cursor: &mut TokenCursor<'_>,
    ) -> Result<(), EntityError> {
        let Some(code) = token.code else {
            return Err(EntityError::InvalidGroupCode { line: token.line });
        };

        if self.in_vertex {
            if code == 10 {
                self.push_vertex(token, code, cursor)?;
            }
            return Ok(());
        }

        match code {
            8 => {
                if !token.value.is_empty() {
                    self.attributes.layer = token.value.to_string();
                }
            }
            62 => self.attributes.color_index = Some(parse_i32(token, code)?),
            6 => self.attributes.line_type = Some(token.value.to_string()),
            60 => self.attributes.visible = parse_i32(token, code)? != INVISIBLE_FLAG,
            // POLYLINE 头部的 10/20/30 是高程占位点，顶点来自 VERTEX 子记录
            10..=13 if self.kind != DraftKind::Polyline => {
                self.push_vertex(token, code, cursor)?;
            }
            40 => self.radius = Some(parse_f64(token, code)?),
            50 => self.start_angle = Some(parse_f64(token, code)?.to_radians()),
            51 => self.end_angle = Some(parse_f64(token, code)?.to_radians()),
            70 => self.flags = parse_i32(token, code)?,
            _ => {}
        }
        Ok(())
    }

    /// X 组码之后在前瞻窗口内寻找 Y（X+10），再寻找 Z（X+20）。缺少 Y 的 X 不构成顶点。
    fn push_vertex(
        &mut self,
        token: RawToken<'_>,
        code: i32,
        cursor: &mut TokenCursor<'_>,
    ) -> Result<(), EntityError> {
        let x = parse_f64(token, code)?;
        let Some(y_token) = cursor.take_companion(code + 10, COMPANION_WINDOW) else {
            trace!(line = token.line, code, "坐标缺少对应的 Y，忽略该点");
            return Ok(());
        };
        let y = parse_f64(y_token, code + 10)?;
        let z = match cursor.take_companion(code + 20, COMPANION_WINDOW) {
            Some(z_token) => parse_f64(z_token, code + 20)?,
            None => 0.0,
        };
        self.vertices.push(Point3::new(x, y, z));
        Ok(())
    }

    fn accepts_vertex_records(&self) -> bool {
        self.kind == DraftKind::Polyline && !self.malformed
    }

    fn finish(self) -> ParsedEntity {
        let kind = match self.kind {
            DraftKind::Line => EntityKind::Line,
            DraftKind::LwPolyline | DraftKind::Polyline => EntityKind::Polyline {
                closed: self.flags & 0x01 == 0x01,
            },
            DraftKind::Circle => EntityKind::Circle {
                radius: self.radius,
            },
            DraftKind::Arc => EntityKind::Arc {
                radius: self.radius,
                start_angle: self.start_angle,
                end_angle: self.end_angle,
            },
        };
        ParsedEntity::new(kind, self.attributes, self.vertices)
    }
}

/// 解析 DXF 文本中的第一个 ENTITIES 段。段外内容一律忽略；
/// 没有 ENTITIES 段时返回空结果而不是错误。
pub fn parse_entities(source: &str) -> ParseOutcome {
    let mut cursor = TokenCursor::new(source);
    let mut outcome = ParseOutcome::default();
    if !cursor.seek_section("ENTITIES") {
        debug!("DXF 中未找到 ENTITIES 段");
        return outcome;
    }

    let mut current: Option<EntityDraft> = None;
    while let Some(token) = cursor.next() {
        if token.is_boundary() {
            match token.value {
                "ENDSEC" | "EOF" => break,
                "VERTEX" if current.as_ref().is_some_and(EntityDraft::accepts_vertex_records) => {
                    if let Some(draft) = current.as_mut() {
                        draft.in_vertex = true;
                    }
                }
                "SEQEND" => finish_draft(current.take(), &mut outcome),
                other => {
                    finish_draft(current.take(), &mut outcome);
                    match DraftKind::from_type_name(other) {
                        Some(kind) => current = Some(EntityDraft::new(kind)),
                        None => {
                            trace!(kind = other, line = token.line, "跳过未识别的实体类型");
                            *outcome.skipped_types.entry(other.to_string()).or_insert(0) += 1;
                        }
                    }
                }
            }
            continue;
        }

        let Some(draft) = current.as_mut() else {
            continue;
        };
        if draft.malformed {
            continue;
        }
        if let Err(err) = draft.apply(token, &mut cursor) {
            debug!(error = %err, kind = ?draft.kind, "实体数据损坏，丢弃至下一个实体边界");
            draft.malformed = true;
        }
    }
    finish_draft(current.take(), &mut outcome);

    info!(
        entities = outcome.entities.len(),
        discarded_empty = outcome.discarded_empty,
        discarded_malformed = outcome.discarded_malformed,
        "DXF 实体解析完成"
    );
    outcome
}

fn finish_draft(draft: Option<EntityDraft>, outcome: &mut ParseOutcome) {
    let Some(draft) = draft else {
        return;
    };
    if draft.malformed {
        outcome.discarded_malformed += 1;
    } else if draft.vertices.is_empty() {
        trace!(kind = ?draft.kind, layer = %draft.attributes.layer, "实体没有顶点，丢弃");
        outcome.discarded_empty += 1;
    } else {
        outcome.entities.push(draft.finish());
    }
}

fn parse_f64(token: RawToken<'_>, code: i32) -> Result<f64, EntityError> {
    token
        .value
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid_number(token, code))
}

fn parse_i32(token: RawToken<'_>, code: i32) -> Result<i32, EntityError> {
    token
        .value
        .parse::<i32>()
        .map_err(|_| invalid_number(token, code))
}

fn invalid_number(token: RawToken<'_>, code: i32) -> EntityError {
    EntityError::InvalidNumber {
        code,
        value: token.value.to_string(),
        line: token.line,
    }
}
