//! # 歌词转换器的核心数据结构
//!
//! 所有解析器都产出 [`LyricDocument`]，所有生成器都只读取它。
//! 该模型同时也是中立 JSON 格式的序列化形状。

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString};

use crate::error::ConvertError;

/// 枚举：表示支持的歌词格式。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Serialize, Deserialize, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum LyricFormat {
    /// 增强型 LRC 格式，支持逐字时间戳与背景人声括号。
    Lrc,
    /// `Timed Text Markup Language` 逐字歌词格式。
    #[default]
    Ttml,
    /// `SubRip` 字幕格式，仅逐行计时。
    Srt,
    /// 规范模型的中立 JSON 序列化。
    Json,
}

impl LyricFormat {
    /// 将歌词格式枚举转换为对应的文件扩展名字符串。
    #[must_use]
    pub const fn to_extension_str(self) -> &'static str {
        match self {
            Self::Lrc => "lrc",
            Self::Ttml => "ttml",
            Self::Srt => "srt",
            Self::Json => "json",
        }
    }

    /// 从字符串（通常是文件扩展名或用户输入）解析歌词格式枚举。
    /// 此方法不区分大小写，并会移除输入字符串中的空格和点。
    #[must_use]
    pub fn from_string(s: &str) -> Option<Self> {
        let normalized_s = s.to_uppercase().replace([' ', '.'], "");
        match normalized_s.as_str() {
            "LRC" => Some(Self::Lrc),
            "TTML" | "XML" => Some(Self::Ttml),
            "SRT" => Some(Self::Srt),
            "JSON" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LyricFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lrc => write!(f, "LRC"),
            Self::Ttml => write!(f, "TTML"),
            Self::Srt => write!(f, "SRT"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// 文档的计时粒度。整个文档只有一个值，
/// 并要求每一行的内容形状与之匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimingMode {
    /// 逐字计时：每行内容是一个单词列表。
    Word,
    /// 逐行计时：每行内容是纯文本，行自身带时间。
    Line,
    /// 无计时信息：每行内容是纯文本。
    #[default]
    None,
}

impl fmt::Display for TimingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word => write!(f, "Word"),
            Self::Line => write!(f, "Line"),
            Self::None => write!(f, "None"),
        }
    }
}

/// 逐字歌词中的一个单词。
///
/// `begin`/`end` 为相对于歌曲开始的毫秒数，仅在解析中途允许为空，
/// 解析器返回文档前必须全部补全。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LyricWord {
    /// 单词开始时间（毫秒）。
    #[serde(default)]
    pub begin: Option<u64>,
    /// 单词结束时间（毫秒）。
    #[serde(default)]
    pub end: Option<u64>,
    /// 为 `true` 时表示该词与下一个词直接相连，
    /// 生成时不在两者之间补空格。
    #[serde(default)]
    pub part: bool,
    /// 单词文本。不包含用于分词的空格。
    pub text: String,
}

/// 一行歌词的内容：纯文本或单词列表。
///
/// 显式的标签联合让所有编解码逻辑在此分支，
/// 而不是在运行时猜测内容类型。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineContent {
    /// 逐行或无计时歌词的纯文本。
    Text(String),
    /// 逐字歌词的单词列表。
    Words(Vec<LyricWord>),
}

impl Default for LineContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// 一行歌词。
///
/// 背景行紧跟在它所修饰的主行之后，保持原始（时间）顺序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LyricLine {
    /// 行开始时间（毫秒）。
    #[serde(default)]
    pub begin: Option<u64>,
    /// 行结束时间（毫秒）。
    #[serde(default)]
    pub end: Option<u64>,
    /// 可选的演唱者标识，例如 `"v1"`、`"v2"`。
    #[serde(default)]
    pub agent: Option<String>,
    /// 是否为背景/和声行。
    #[serde(default)]
    pub background: bool,
    /// 行内容。
    pub content: LineContent,
}

impl LyricLine {
    /// 将该行内容拼接为一个纯文本字符串。
    ///
    /// 单词列表按 `part` 标志决定是否补空格，与 SRT 降级输出一致。
    #[must_use]
    pub fn plain_text(&self) -> String {
        match &self.content {
            LineContent::Text(text) => text.clone(),
            LineContent::Words(words) => {
                let mut text = String::new();
                for (index, word) in words.iter().enumerate() {
                    text.push_str(&word.text);
                    if !word.part && index + 1 != words.len() {
                        text.push(' ');
                    }
                }
                text
            }
        }
    }
}

/// 一次转换的规范中间表示。
///
/// 由解析器构建、生成器只读消费，单次 `convert` 调用之外不携带状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LyricDocument {
    /// 文档的计时粒度。
    pub timing: TimingMode,
    /// 按时间顺序排列的歌词行。
    pub lyrics: Vec<LyricLine>,
}

impl LyricDocument {
    /// 校验每一行的内容形状与文档计时粒度一致。
    ///
    /// 该不变量只在文档边界检查一次，编解码逻辑可以据此放心分支。
    ///
    /// # Errors
    ///
    /// 形状不匹配时返回 [`ConvertError::InconsistentTiming`]，
    /// 行号为第一个不一致行在 `lyrics` 中的 1 起始序号。
    pub fn validate(&self) -> Result<(), ConvertError> {
        for (index, line) in self.lyrics.iter().enumerate() {
            let is_word_list = matches!(line.content, LineContent::Words(_));
            let expects_word_list = self.timing == TimingMode::Word;
            if is_word_list != expects_word_list {
                return Err(ConvertError::InconsistentTiming { line: index + 1 });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_string() {
        assert_eq!(LyricFormat::from_string("lrc"), Some(LyricFormat::Lrc));
        assert_eq!(LyricFormat::from_string(".TTML"), Some(LyricFormat::Ttml));
        assert_eq!(LyricFormat::from_string("Srt"), Some(LyricFormat::Srt));
        assert_eq!(LyricFormat::from_string("json"), Some(LyricFormat::Json));
        assert_eq!(LyricFormat::from_string("docx"), None);
    }

    #[test]
    fn test_line_plain_text_respects_part_flag() {
        let line = LyricLine {
            content: LineContent::Words(vec![
                LyricWord {
                    part: true,
                    text: "Hel".to_string(),
                    ..Default::default()
                },
                LyricWord {
                    part: false,
                    text: "lo".to_string(),
                    ..Default::default()
                },
                LyricWord {
                    part: true,
                    text: "world".to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        assert_eq!(line.plain_text(), "Hello world");
    }

    #[test]
    fn test_validate_rejects_mixed_shapes() {
        let document = LyricDocument {
            timing: TimingMode::Word,
            lyrics: vec![LyricLine {
                content: LineContent::Text("plain".to_string()),
                ..Default::default()
            }],
        };
        assert!(matches!(
            document.validate(),
            Err(ConvertError::InconsistentTiming { line: 1 })
        ));
    }

    #[test]
    fn test_document_json_shape() {
        let document = LyricDocument {
            timing: TimingMode::Line,
            lyrics: vec![LyricLine {
                begin: Some(10000),
                end: None,
                agent: Some("v1".to_string()),
                background: false,
                content: LineContent::Text("Hello".to_string()),
            }],
        };
        let json = serde_json::to_string(&document).unwrap();
        assert!(json.contains("\"timing\":\"Line\""));
        assert!(json.contains("\"content\":\"Hello\""));
        let decoded: LyricDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, document);
    }
}
