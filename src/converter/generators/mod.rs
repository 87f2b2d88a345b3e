//! # 歌词格式生成器
//!
//! 每个生成器只读地消费规范的 [`crate::converter::types::LyricDocument`]。

pub mod lrc_generator;
pub mod srt_generator;
pub mod ttml_generator;

pub use lrc_generator::generate_lrc;
pub use srt_generator::generate_srt;
pub use ttml_generator::generate_ttml;
