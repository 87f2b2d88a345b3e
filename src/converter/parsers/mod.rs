//! # 歌词格式解析器
//!
//! 每个解析器把一种文本格式解析为规范的 [`crate::converter::types::LyricDocument`]。

pub mod lrc_parser;
pub mod srt_parser;
pub mod ttml_parser;

pub use lrc_parser::parse_lrc;
pub use srt_parser::{SrtParsingOptions, parse_srt};
pub use ttml_parser::parse_ttml;
