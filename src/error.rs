use std::{fmt, io};

use quick_xml::{
    Error as QuickXmlErrorMain, encoding::EncodingError,
    events::attributes::AttrError as QuickXmlAttrError,
};
use thiserror::Error;

use crate::converter::types::LyricFormat;

/// 定义歌词转换和处理过程中可能发生的各种错误。
#[derive(Error, Debug)]
pub enum ConvertError {
    /// XML 生成错误，通常来自 `quick-xml` 库。
    #[error("生成 XML 错误: {0}")]
    Xml(#[from] QuickXmlErrorMain),
    /// XML 属性解析错误，通常来自 `quick-xml` 库。
    #[error("XML 属性错误: {0}")]
    Attribute(#[from] QuickXmlAttrError),
    /// XML 文本编码或解码错误。
    #[error("文本编码或解码错误: {0}")]
    Encoding(#[from] EncodingError),
    /// 整数解析错误。
    #[error("解析错误: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    /// 无效的时间格式字符串。
    #[error("无效的时间格式: {0}")]
    InvalidTime(String),
    /// 字符串格式化错误。
    #[error("格式错误: {0}")]
    Format(#[from] fmt::Error),
    /// 文件读写等IO错误。
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),
    /// JSON 解析或序列化错误。
    #[error("处理 JSON 内容失败: {0}")]
    JsonParse(#[from] serde_json::Error),
    /// 从字节序列转换为 UTF-8 字符串失败。
    #[error("UTF-8 转换错误: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    /// 不被支持的歌词格式标签。
    #[error("不支持的歌词格式: {0}")]
    UnsupportedFormat(String),
    /// 输入内容不符合声明格式的语法。
    #[error("解析 {format} 歌词失败: {reason}")]
    ParseError {
        /// 声明的源格式。
        format: LyricFormat,
        /// 具体原因，含行号或块编号等上下文。
        reason: String,
    },
    /// 文档内部混用了不同的计时粒度。
    #[error("第 {line} 行的计时粒度与文档的其余部分不一致")]
    InconsistentTiming {
        /// 第一个不一致行的 1 起始行号。
        line: usize,
    },
    /// 源文档可以表示，但目标格式无法承载当前内容。
    #[error("无法生成 {target} 格式: {reason}")]
    UnsupportedTarget {
        /// 请求的目标格式。
        target: LyricFormat,
        /// 具体原因。
        reason: String,
    },
    /// 内部逻辑错误或未明确分类的错误。
    #[error("错误: {0}")]
    Internal(String),
}

impl From<ConvertError> for io::Error {
    fn from(err: ConvertError) -> Self {
        Self::other(err)
    }
}
