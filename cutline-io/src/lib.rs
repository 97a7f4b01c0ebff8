use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

mod parser;
pub mod reader;

pub use parser::{ParseOutcome, parse_entities};

/// DWG 二进制文件以版本标记 `AC10xx` 开头。
const DWG_MAGIC: &[u8] = b"AC10";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 把上传的设计文件读取为文本。流水线本身不做任何 I/O。
pub trait DxfSource {
    fn read(&self, path: &Path) -> Result<String, IoError>;
}

/// 基于本地文件系统的 DXF 读取器。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 读取并解析文件，便于只需要实体列表的调用方。
    pub fn load(&self, path: &Path) -> Result<ParseOutcome, IoError> {
        let content = self.read(path)?;
        Ok(parse_entities(&content))
    }
}

impl DxfSource for DxfFacade {
    fn read(&self, path: &Path) -> Result<String, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.starts_with(DWG_MAGIC) {
            return Err(IoError::UnsupportedFeature(format!(
                "{} 是 DWG 二进制文件，请先导出为 DXF",
                path.display()
            )));
        }
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                // 旧版 CAD 常输出 ANSI 代码页文本，坐标与组码仍是 ASCII
                warn!(path = %path.display(), "文件不是合法 UTF-8，按有损方式解码");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        debug!(path = %path.display(), bytes = content.len(), "读取设计文件");
        Ok(content)
    }
}
