//! # lyric_converter
//!
//! 在增强型 LRC、Apple Music 风格 TTML、SRT 与中立 JSON 之间
//! 转换带时间同步信息的歌词。
//!
//! 所有格式经由同一个规范中间表示 [`LyricDocument`] 互转：
//! 解析器产出文档，生成器只读消费文档，两侧互不感知。
//! 文档内混用计时粒度（逐字/逐行/无计时）会在解析阶段被拒绝。
//!
//! ```rust
//! use lyric_converter::convert;
//!
//! let lrc = "[00:10.000]Hello\n[00:12.000]World\n";
//! let output = convert("lrc", "srt", lrc)?;
//! assert!(output.text.starts_with("1\n00:00:10,000 --> 00:00:12,000\nHello"));
//! # Ok::<(), lyric_converter::ConvertError>(())
//! ```

pub mod converter;
pub mod error;

pub use converter::generators::{generate_lrc, generate_srt, generate_ttml};
pub use converter::parsers::{SrtParsingOptions, parse_lrc, parse_srt, parse_ttml};
pub use converter::types::{
    LineContent, LyricDocument, LyricFormat, LyricLine, LyricWord, TimingMode,
};
pub use converter::{ConversionOutput, convert, generate_document, parse_document};
pub use error::ConvertError;
