//! # 转换调度器
//!
//! 把 `(源格式, 目标格式, 文本)` 映射为 `解析 -> LyricDocument -> 生成`。
//! 文档是唯一的耦合点：编解码器之间互不调用。

pub mod generators;
pub mod parsers;
pub mod time;
pub mod types;

use tracing::{debug, warn};

use crate::error::ConvertError;
use parsers::SrtParsingOptions;
use types::{LyricDocument, LyricFormat, TimingMode};

/// 一次成功转换的结果。
///
/// `warnings` 是调用方可见的提示通道，
/// 用于有损降级等不构成硬错误的情况。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversionOutput {
    /// 目标格式的文本。
    pub text: String,
    /// 转换过程中产生的提示信息。
    pub warnings: Vec<String>,
}

/// 在两种歌词格式之间转换。
///
/// 源格式与目标格式相同时原样返回输入，不做解析校验。
///
/// # Errors
///
/// * [`ConvertError::UnsupportedFormat`] - 格式标签不是
///   `lrc`/`ttml`/`srt`/`json` 之一。
/// * 解析与生成阶段的各类错误，见 [`ConvertError`]。
pub fn convert(
    from_format: &str,
    to_format: &str,
    content: &str,
) -> Result<ConversionOutput, ConvertError> {
    let from = LyricFormat::from_string(from_format)
        .ok_or_else(|| ConvertError::UnsupportedFormat(from_format.to_string()))?;
    let to = LyricFormat::from_string(to_format)
        .ok_or_else(|| ConvertError::UnsupportedFormat(to_format.to_string()))?;

    if from == to {
        return Ok(ConversionOutput {
            text: content.to_string(),
            warnings: Vec::new(),
        });
    }

    debug!("正在从 {from} 转换到 {to}");
    let document = parse_document(from, content)?;
    generate_document(to, &document)
}

/// 用指定格式的解析器解析文本。
///
/// # Errors
///
/// 透传对应解析器的错误；JSON 解码失败返回
/// [`ConvertError::JsonParse`]。
pub fn parse_document(format: LyricFormat, content: &str) -> Result<LyricDocument, ConvertError> {
    match format {
        LyricFormat::Lrc => parsers::parse_lrc(content),
        LyricFormat::Ttml => parsers::parse_ttml(content),
        LyricFormat::Srt => parsers::parse_srt(content, &SrtParsingOptions::default()),
        LyricFormat::Json => Ok(serde_json::from_str(content)?),
    }
}

/// 用指定格式的生成器写出文档。
///
/// SRT 前置条件在这里应用：无计时文档被拒绝，
/// 逐字文档降级为逐行并附带提示。
///
/// # Errors
///
/// * [`ConvertError::InconsistentTiming`] - 文档形状与计时粒度不符。
/// * [`ConvertError::UnsupportedTarget`] - 目标格式无法承载该文档。
pub fn generate_document(
    format: LyricFormat,
    document: &LyricDocument,
) -> Result<ConversionOutput, ConvertError> {
    document.validate()?;

    let mut warnings = Vec::new();
    let text = match format {
        LyricFormat::Lrc => generators::generate_lrc(document)?,
        LyricFormat::Ttml => generators::generate_ttml(document)?,
        LyricFormat::Srt => {
            match document.timing {
                TimingMode::None => {
                    return Err(ConvertError::UnsupportedTarget {
                        target: LyricFormat::Srt,
                        reason: "歌词缺少时间信息".to_string(),
                    });
                }
                TimingMode::Word => {
                    let message =
                        "歌词为逐字同步，SRT 格式不支持，已降级为逐行同步".to_string();
                    warn!("{message}");
                    warnings.push(message);
                }
                TimingMode::Line => {}
            }
            generators::generate_srt(document)?
        }
        LyricFormat::Json => serde_json::to_string(document)?,
    };
    Ok(ConversionOutput { text, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fast_path_skips_validation() {
        let garbage = "definitely not a lyric file";
        for format in ["lrc", "ttml", "srt", "json"] {
            let output = convert(format, format, garbage).unwrap();
            assert_eq!(output.text, garbage);
            assert!(output.warnings.is_empty());
        }
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let error = convert("docx", "lrc", "").unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedFormat(tag) if tag == "docx"));
        let error = convert("lrc", "docx", "").unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedFormat(tag) if tag == "docx"));
    }

    #[test]
    fn test_lrc_to_srt() {
        let output = convert("lrc", "srt", "[00:10.000]Hello\n[00:12.000]World\n").unwrap();
        assert!(output.text.starts_with("1\n00:00:10,000 --> 00:00:12,000\nHello"));
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_word_lrc_to_srt_reports_downgrade() {
        let content = "[00:01.000]<00:01.000>Hello<00:01.500> <00:01.500>world<00:02.000>\n";
        let output = convert("lrc", "srt", content).unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert!(output.text.contains("Hello world"));
    }

    #[test]
    fn test_untimed_lrc_to_srt_is_refused() {
        let error = convert("lrc", "srt", "plain text lyric\n").unwrap_err();
        assert!(matches!(
            error,
            ConvertError::UnsupportedTarget {
                target: LyricFormat::Srt,
                ..
            }
        ));
    }

    #[test]
    fn test_lrc_to_json_to_lrc() {
        let content = "[00:10.000]Hello\n[00:12.000]World\n";
        let json = convert("lrc", "json", content).unwrap();
        assert!(json.text.contains("\"timing\":\"Line\""));
        let back = convert("json", "lrc", &json.text).unwrap();
        assert_eq!(back.text, content);
    }

    #[test]
    fn test_invalid_json_document_shape_is_rejected() {
        // 声明逐字计时但内容是纯文本
        let json = r#"{"timing":"Word","lyrics":[{"begin":0,"end":1000,"content":"plain"}]}"#;
        let error = convert("json", "lrc", json).unwrap_err();
        assert!(matches!(error, ConvertError::InconsistentTiming { line: 1 }));
    }
}
