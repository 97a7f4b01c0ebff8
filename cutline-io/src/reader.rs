use tracing::trace;

/// 单个组码/值对。组码行无法解析为整数时 `code` 为 None。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawToken<'a> {
    pub code: Option<i32>,
    pub value: &'a str,
    /// 组码所在行号（从 1 开始），用于诊断日志。
    pub line: usize,
}

impl<'a> RawToken<'a> {
    #[inline]
    pub fn is(&self, code: i32, value: &str) -> bool {
        self.code == Some(code) && self.value == value
    }

    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.code == Some(0)
    }
}

/// 把文本按行切分、去除首尾空白后两两配对。末尾落单的组码行被丢弃。
///
/// 开头的 UTF-8 BOM 会被忽略；`\r\n`、`\n` 与单独的 `\r` 都视为行结束符。
pub fn tokenize(source: &str) -> Vec<RawToken<'_>> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let lines: Vec<&str> = split_lines(source).map(str::trim).collect();
    if lines.len() % 2 != 0 {
        trace!(line_count = lines.len(), "DXF 行数为奇数，忽略最后一行");
    }
    lines
        .chunks_exact(2)
        .enumerate()
        .map(|(index, pair)| RawToken {
            code: pair[0].parse::<i32>().ok(),
            value: pair[1],
            line: index * 2 + 1,
        })
        .collect()
}

/// 与 `str::lines` 相同，但额外把单独的 `\r` 当作换行。空值行被保留。
fn split_lines(source: &str) -> impl Iterator<Item = &str> {
    let body = source
        .strip_suffix("\r\n")
        .or_else(|| source.strip_suffix('\n'))
        .or_else(|| source.strip_suffix('\r'))
        .unwrap_or(source);
    (!source.is_empty())
        .then_some(body)
        .into_iter()
        .flat_map(|body| body.split('\n'))
        .flat_map(|line| line.strip_suffix('\r').unwrap_or(line).split('\r'))
}

/// 基于预切分记录的前向游标。`peek(offset)` 与 `take_companion` 提供有限前瞻，
/// 被前瞻取走的记录在之后的 `next` 中自动跳过。
pub struct TokenCursor<'a> {
    tokens: Vec<Option<RawToken<'a>>>,
    position: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            tokens: tokenize(source).into_iter().map(Some).collect(),
            position: 0,
        }
    }

    pub fn next(&mut self) -> Option<RawToken<'a>> {
        while self.position < self.tokens.len() {
            let slot = self.tokens[self.position].take();
            self.position += 1;
            if slot.is_some() {
                return slot;
            }
        }
        None
    }

    /// 查看尚未消费的第 `offset` 条记录（0 表示下一条）。
    pub fn peek(&self, offset: usize) -> Option<&RawToken<'a>> {
        self.tokens[self.position.min(self.tokens.len())..]
            .iter()
            .flatten()
            .nth(offset)
    }

    /// 在接下来的 `window` 条记录内寻找指定组码并取走它。遇到组码 0 即停止，
    /// 前瞻不会跨越实体边界。
    pub fn take_companion(&mut self, code: i32, window: usize) -> Option<RawToken<'a>> {
        let mut seen = 0;
        let mut index = self.position;
        while index < self.tokens.len() && seen < window {
            if let Some(token) = self.tokens[index] {
                if token.is_boundary() {
                    return None;
                }
                if token.code == Some(code) {
                    return self.tokens[index].take();
                }
                seen += 1;
            }
            index += 1;
        }
        None
    }

    /// 移动到第一个 `0/SECTION` + `2/ENTITIES` 之后。未找到时返回 false，游标停在末尾。
    pub fn seek_section(&mut self, name: &str) -> bool {
        while let Some(token) = self.next() {
            if token.is(0, "SECTION") && self.peek(0).is_some_and(|next| next.is(2, name)) {
                self.next();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_trims_and_pairs_lines() {
        let tokens = tokenize("  0\r\nSECTION \n  2\nENTITIES\n999");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[0].is(0, "SECTION"));
        assert!(tokens[1].is(2, "ENTITIES"));
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn leading_bom_does_not_hide_first_group_code() {
        let source = "\u{feff}0\nSECTION\n2\nENTITIES\n0\nCIRCLE\n0\nENDSEC\n0\nEOF\n";
        let tokens = tokenize(source);
        assert!(tokens[0].is(0, "SECTION"), "BOM 不应污染第一个组码");

        let mut cursor = TokenCursor::new(source);
        assert!(cursor.seek_section("ENTITIES"));
        assert!(cursor.next().is_some_and(|t| t.is(0, "CIRCLE")));
    }

    #[test]
    fn carriage_return_only_line_endings_are_split() {
        let tokens = tokenize("0\rSECTION\r2\rENTITIES\r8\r\r0\rENDSEC\r");
        assert_eq!(tokens.len(), 4);
        assert!(tokens[0].is(0, "SECTION"));
        assert!(tokens[1].is(2, "ENTITIES"));
        // 空值行依然占据一行
        assert!(tokens[2].is(8, ""));
        assert!(tokens[3].is(0, "ENDSEC"));
        assert_eq!(tokens[3].line, 7);

        let mixed = tokenize("0\r\nSECTION\r2\nENTITIES");
        assert_eq!(mixed.len(), 2);
        assert!(mixed[1].is(2, "ENTITIES"));
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn non_numeric_group_code_is_preserved_as_none() {
        let tokens = tokenize("abc\nvalue\n8\nLAYER");
        assert_eq!(tokens[0].code, None);
        assert_eq!(tokens[1].code, Some(8));
    }

    #[test]
    fn peek_skips_consumed_tokens() {
        let mut cursor = TokenCursor::new("10\n1.0\n8\nA\n20\n2.0\n0\nLINE");
        let x = cursor.next().expect("first token");
        assert_eq!(x.code, Some(10));
        let y = cursor.take_companion(20, 2).expect("companion within window");
        assert_eq!(y.value, "2.0");
        assert_eq!(cursor.peek(0).and_then(|t| t.code), Some(8));
        assert_eq!(cursor.peek(1).and_then(|t| t.code), Some(0));
        assert!(cursor.peek(2).is_none());
        assert_eq!(cursor.next().and_then(|t| t.code), Some(8));
        assert!(cursor.next().is_some_and(|t| t.is(0, "LINE")));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn companion_search_stops_at_entity_boundary() {
        let mut cursor = TokenCursor::new("10\n1.0\n0\nLINE\n20\n2.0");
        cursor.next();
        assert!(cursor.take_companion(20, 4).is_none());
    }

    #[test]
    fn companion_search_respects_window() {
        let mut cursor = TokenCursor::new("10\n1.0\n8\nA\n62\n1\n20\n2.0");
        cursor.next();
        assert!(cursor.take_companion(20, 2).is_none());
        assert!(cursor.take_companion(20, 3).is_some());
    }

    #[test]
    fn seek_section_ignores_other_sections() {
        let source = "0\nSECTION\n2\nHEADER\n10\n5.0\n0\nENDSEC\n0\nSECTION\n2\nENTITIES\n0\nLINE";
        let mut cursor = TokenCursor::new(source);
        assert!(cursor.seek_section("ENTITIES"));
        assert!(cursor.next().is_some_and(|t| t.is(0, "LINE")));

        let mut missing = TokenCursor::new("0\nSECTION\n2\nHEADER\n0\nENDSEC");
        assert!(!missing.seek_section("ENTITIES"));
    }
}
