//! # TTML 歌词解析器
//!
//! 面向 Apple Music 风格的歌词 TTML：`<tt>` 根元素上的 `itunes:timing`
//! 决定计时模式，逐字模式下每个 `<span>` 是一个单词，
//! `ttm:role="x-bg"` 标记背景人声。
//! 真实世界的歌词源并不总是合法 XML，解析前先修复裸露的 `&`。

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use tracing::warn;

use crate::converter::time::parse_time;
use crate::converter::types::{
    LineContent, LyricDocument, LyricFormat, LyricLine, LyricWord, TimingMode,
};
use crate::error::ConvertError;

/// 匹配不属于任何合法实体的裸 `&`。
static BARE_AMPERSAND_REGEX: LazyLock<fancy_regex::Regex> = LazyLock::new(|| {
    fancy_regex::Regex::new(r"&(?!#?[a-zA-Z0-9]+;)").expect("未能编译 BARE_AMPERSAND_REGEX")
});

const TAG_TT: &[u8] = b"tt";
const TAG_P: &[u8] = b"p";
const TAG_SPAN: &[u8] = b"span";

const ATTR_BEGIN: &[u8] = b"begin";
const ATTR_END: &[u8] = b"end";
const ATTR_AGENT: &[u8] = b"ttm:agent";
const ATTR_AGENT_ALIAS: &[u8] = b"agent";
const ATTR_ROLE: &[u8] = b"ttm:role";
const ATTR_ROLE_ALIAS: &[u8] = b"role";
const ATTR_ITUNES_TIMING: &[u8] = b"itunes:timing";
const ATTR_TIMING_ALIAS: &[u8] = b"timing";

const ROLE_BACKGROUND: &str = "x-bg";

/// 正在解析的 `<span>` 的累积数据。
struct SpanData {
    begin: Option<u64>,
    end: Option<u64>,
    background: bool,
    text: String,
    words: Vec<LyricWord>,
    source_line: usize,
}

/// 正在解析的 `<p>` 的累积数据。
#[derive(Default)]
struct PElementData {
    begin: Option<u64>,
    end: Option<u64>,
    agent: Option<String>,
    background: bool,
    text: String,
    words: Vec<LyricWord>,
    bg_children: Vec<LyricLine>,
    source_line: usize,
}

#[derive(Default)]
struct ParserState {
    timing: TimingMode,
    current_p: Option<PElementData>,
    span_stack: Vec<SpanData>,
    /// 上一个事件是否刚刚提交了一个单词（用于把尾随空格归属到该词）。
    last_was_word: bool,
    lines: Vec<LyricLine>,
}

/// 解析 TTML 内容为规范文档。
///
/// # Errors
///
/// * [`ConvertError::ParseError`] - XML 结构损坏、缺少 `<tt>` 根元素、
///   `<p>` 缺少必要的时间属性等。
/// * [`ConvertError::InconsistentTiming`] - 元素形状与声明的计时模式冲突。
pub fn parse_ttml(content: &str) -> Result<LyricDocument, ConvertError> {
    let repaired = repair_bare_ampersands(content);
    // 预扫描辅助判断未声明计时模式时的粒度
    let has_timed_span = repaired.contains("<span") && repaired.contains("begin=");
    let has_timed_p = repaired.contains("<p") && repaired.contains("begin=");

    let mut reader = Reader::from_str(&repaired);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut state = ParserState::default();
    let mut saw_tt = false;
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(ConvertError::ParseError {
                    format: LyricFormat::Ttml,
                    reason: format!("XML 解析失败（位置 {}）: {e}", reader.error_position()),
                });
            }
        };
        match event {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                TAG_TT => {
                    saw_tt = true;
                    state.timing = resolve_timing(&e, &reader, has_timed_span, has_timed_p)?;
                }
                TAG_P => handle_p_start(&e, &reader, &repaired, &mut state)?,
                TAG_SPAN => handle_span_start(&e, &reader, &repaired, &mut state)?,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                TAG_P => state.finish_p()?,
                TAG_SPAN => state.finish_span()?,
                _ => {}
            },
            Event::Text(e) => {
                let text = e
                    .xml_content()
                    .map_err(|err| ConvertError::Internal(format!("解码文本失败: {err}")))?;
                state.append_text(&text);
            }
            Event::GeneralRef(e) => {
                let name = std::str::from_utf8(e.as_ref())
                    .map_err(|err| ConvertError::Internal(format!("无法解码实体名: {err}")))?;
                if let Some(decoded) = decode_entity(name) {
                    state.append_text(&decoded.to_string());
                } else {
                    warn!("忽略了未知的 XML 实体 '&{name};'");
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_tt {
        return Err(ConvertError::ParseError {
            format: LyricFormat::Ttml,
            reason: "未找到 <tt> 根元素".to_string(),
        });
    }

    Ok(LyricDocument {
        timing: state.timing,
        lyrics: state.lines,
    })
}

/// 把不构成合法实体的 `&` 替换为 `&amp;`。
fn repair_bare_ampersands(content: &str) -> Cow<'_, str> {
    BARE_AMPERSAND_REGEX.replace_all(content, "&amp;")
}

/// 解码一个 XML 实体引用，支持命名实体和数字实体。
fn decode_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let (radix, digits) = numeric
            .strip_prefix('x')
            .map_or((10, numeric), |stripped| (16, stripped));
        return u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// 读取 `<tt>` 上的计时模式声明；缺失时按内容启发式判断。
fn resolve_timing(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    has_timed_span: bool,
    has_timed_p: bool,
) -> Result<TimingMode, ConvertError> {
    let value = get_string_attribute(e, reader, &[ATTR_ITUNES_TIMING, ATTR_TIMING_ALIAS])?;
    match value.as_deref() {
        Some(v) if v.eq_ignore_ascii_case("word") || v.eq_ignore_ascii_case("syllable") => {
            Ok(TimingMode::Word)
        }
        Some(v) if v.eq_ignore_ascii_case("line") => Ok(TimingMode::Line),
        Some(v) if v.eq_ignore_ascii_case("none") => Ok(TimingMode::None),
        Some(v) => Err(ConvertError::ParseError {
            format: LyricFormat::Ttml,
            reason: format!("无法识别的计时模式: '{v}'"),
        }),
        None if has_timed_span => Ok(TimingMode::Word),
        None if has_timed_p => Ok(TimingMode::Line),
        None => Ok(TimingMode::None),
    }
}

fn handle_p_start(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    source: &str,
    state: &mut ParserState,
) -> Result<(), ConvertError> {
    if state.current_p.is_some() {
        warn!("忽略了嵌套的 <p> 元素");
        return Ok(());
    }
    let mut data = PElementData {
        source_line: line_number_at(source, reader_position(reader)),
        ..Default::default()
    };
    if state.timing != TimingMode::None {
        data.begin = get_time_attribute(e, reader, &[ATTR_BEGIN])?;
        data.end = get_time_attribute(e, reader, &[ATTR_END])?;
        data.agent = get_string_attribute(e, reader, &[ATTR_AGENT, ATTR_AGENT_ALIAS])?;
        data.background = matches!(
            get_string_attribute(e, reader, &[ATTR_ROLE, ATTR_ROLE_ALIAS])?.as_deref(),
            Some(ROLE_BACKGROUND)
        );
    }
    state.current_p = Some(data);
    state.last_was_word = false;
    Ok(())
}

fn handle_span_start(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    source: &str,
    state: &mut ParserState,
) -> Result<(), ConvertError> {
    if state.current_p.is_none() {
        return Ok(());
    }
    match state.timing {
        TimingMode::Word => {
            let background = matches!(
                get_string_attribute(e, reader, &[ATTR_ROLE, ATTR_ROLE_ALIAS])?.as_deref(),
                Some(ROLE_BACKGROUND)
            );
            state.span_stack.push(SpanData {
                begin: get_time_attribute(e, reader, &[ATTR_BEGIN])?,
                end: get_time_attribute(e, reader, &[ATTR_END])?,
                background,
                text: String::new(),
                words: Vec::new(),
                source_line: line_number_at(source, reader_position(reader)),
            });
            state.last_was_word = false;
        }
        TimingMode::Line => {
            // 逐行文档里出现带时间的 span 即为粒度混用
            if get_time_attribute(e, reader, &[ATTR_BEGIN])?.is_some() {
                return Err(ConvertError::InconsistentTiming {
                    line: line_number_at(source, reader_position(reader)),
                });
            }
        }
        TimingMode::None => {}
    }
    Ok(())
}

impl ParserState {
    /// 把一段文本归属到当前上下文：span 内部、词尾空格或 `<p>` 正文。
    fn append_text(&mut self, text: &str) {
        let Some(p) = self.current_p.as_mut() else {
            return;
        };
        if let Some(top) = self.span_stack.last_mut() {
            if top.background && self.last_was_word {
                apply_tail(&mut top.words, text);
                if text.chars().all(char::is_whitespace) {
                    return;
                }
            }
            top.text.push_str(text);
        } else {
            if self.last_was_word {
                apply_tail(&mut p.words, text);
                if text.chars().all(char::is_whitespace) {
                    return;
                }
            }
            p.text.push_str(text);
        }
    }

    fn finish_span(&mut self) -> Result<(), ConvertError> {
        if self.timing != TimingMode::Word {
            return Ok(());
        }
        let Some(span) = self.span_stack.pop() else {
            return Ok(());
        };
        let Some(p) = self.current_p.as_mut() else {
            return Ok(());
        };

        if span.background {
            if let Some(line) = finalize_background_span(span)? {
                p.bg_children.push(line);
            }
            self.last_was_word = false;
            return Ok(());
        }

        let raw = span.text;
        let trimmed = raw.trim();
        let target_words = match self.span_stack.last_mut() {
            Some(parent) if parent.background => &mut parent.words,
            _ => &mut p.words,
        };
        if trimmed.is_empty() {
            // 只含空白的 span 等价于词间空格
            if raw.contains(' ') {
                apply_tail(target_words, " ");
            }
            return Ok(());
        }
        if raw.starts_with(' ') {
            apply_tail(target_words, " ");
        }
        target_words.push(LyricWord {
            begin: span.begin,
            end: span.end,
            part: !raw.ends_with(' '),
            text: trimmed.to_string(),
        });
        self.last_was_word = true;
        Ok(())
    }

    fn finish_p(&mut self) -> Result<(), ConvertError> {
        self.span_stack.clear();
        self.last_was_word = false;
        let Some(p) = self.current_p.take() else {
            return Ok(());
        };
        match self.timing {
            TimingMode::None => {
                self.lines.push(LyricLine {
                    content: LineContent::Text(p.text.trim().to_string()),
                    ..Default::default()
                });
            }
            TimingMode::Line => {
                if p.begin.is_none() {
                    return Err(ConvertError::ParseError {
                        format: LyricFormat::Ttml,
                        reason: format!("第 {} 行: <p> 元素缺少 begin 属性", p.source_line),
                    });
                }
                self.lines.push(LyricLine {
                    begin: p.begin,
                    end: p.end,
                    agent: p.agent,
                    background: p.background,
                    content: LineContent::Text(p.text.trim().to_string()),
                });
            }
            TimingMode::Word => {
                let (line, bg_children) = finalize_word_p(p)?;
                if let Some(line) = line {
                    self.lines.push(line);
                }
                self.lines.extend(bg_children);
            }
        }
        Ok(())
    }
}

/// 逐字模式下结束一个 `<p>`：补全词级时间并派生行级时间。
fn finalize_word_p(
    mut p: PElementData,
) -> Result<(Option<LyricLine>, Vec<LyricLine>), ConvertError> {
    if p.words.is_empty() {
        if p.background {
            // 背景行没有逐字内容时，必须自带 begin/end 才合法
            if p.begin.is_some() && p.end.is_some() {
                let text = p.text.trim();
                let line = (!text.is_empty()).then(|| LyricLine {
                    begin: p.begin,
                    end: p.end,
                    agent: p.agent,
                    background: true,
                    content: LineContent::Text(text.to_string()),
                });
                return Ok((line, p.bg_children));
            }
            return Err(ConvertError::ParseError {
                format: LyricFormat::Ttml,
                reason: format!(
                    "第 {} 行: 背景元素缺少 begin/end 属性且没有逐字内容",
                    p.source_line
                ),
            });
        }
        if !p.text.trim().is_empty() {
            return Err(ConvertError::InconsistentTiming {
                line: p.source_line,
            });
        }
        if p.begin.is_none() && p.end.is_none() && p.bg_children.is_empty() {
            return Err(ConvertError::ParseError {
                format: LyricFormat::Ttml,
                reason: format!("第 {} 行: <p> 元素缺少 begin/end 属性", p.source_line),
            });
        }
        // 带时间属性但没有内容的空行，跳过
        return Ok((None, p.bg_children));
    }

    resolve_word_times(&mut p.words, p.begin, p.end, p.source_line)?;
    let begin = p.begin.or_else(|| p.words.first().and_then(|w| w.begin));
    let end = p.end.or_else(|| p.words.last().and_then(|w| w.end));
    Ok((
        Some(LyricLine {
            begin,
            end,
            agent: p.agent,
            background: p.background,
            content: LineContent::Words(p.words),
        }),
        p.bg_children,
    ))
}

/// 结束一个 `x-bg` 容器 span，产出一条背景行。
fn finalize_background_span(mut span: SpanData) -> Result<Option<LyricLine>, ConvertError> {
    if span.words.is_empty() {
        let text = span.text.trim();
        if span.begin.is_some() && span.end.is_some() {
            if text.is_empty() {
                return Ok(None);
            }
            return Ok(Some(LyricLine {
                begin: span.begin,
                end: span.end,
                agent: None,
                background: true,
                content: LineContent::Text(text.to_string()),
            }));
        }
        return Err(ConvertError::ParseError {
            format: LyricFormat::Ttml,
            reason: format!(
                "第 {} 行: 背景元素缺少 begin/end 属性且没有逐字内容",
                span.source_line
            ),
        });
    }
    resolve_word_times(&mut span.words, span.begin, span.end, span.source_line)?;
    let begin = span.begin.or_else(|| span.words.first().and_then(|w| w.begin));
    let end = span.end.or_else(|| span.words.last().and_then(|w| w.end));
    Ok(Some(LyricLine {
        begin,
        end,
        agent: None,
        background: true,
        content: LineContent::Words(span.words),
    }))
}

/// 用相邻单词和所属元素的时间补全缺失的词级时间戳。
/// 补不全即为结构错误，模型不允许返回未解析的时间。
fn resolve_word_times(
    words: &mut [LyricWord],
    element_begin: Option<u64>,
    element_end: Option<u64>,
    source_line: usize,
) -> Result<(), ConvertError> {
    for index in (0..words.len()).rev() {
        if words[index].end.is_none() {
            words[index].end = if index + 1 < words.len() {
                words[index + 1].begin
            } else {
                element_end
            };
        }
    }
    let mut previous_end = element_begin;
    for word in words.iter_mut() {
        if word.begin.is_none() {
            word.begin = previous_end;
        }
        previous_end = word.end;
    }
    if let Some(word) = words
        .iter()
        .find(|word| word.begin.is_none() || word.end.is_none())
    {
        return Err(ConvertError::ParseError {
            format: LyricFormat::Ttml,
            reason: format!(
                "第 {source_line} 行: 无法补全单词 '{}' 的时间戳",
                word.text
            ),
        });
    }
    Ok(())
}

/// 词后的文本含有空格时，取消上一个词的黏连标记。
fn apply_tail(words: &mut [LyricWord], tail: &str) {
    if tail.contains(' ')
        && let Some(last) = words.last_mut()
    {
        last.part = false;
    }
}

fn get_string_attribute(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    attr_names: &[&[u8]],
) -> Result<Option<String>, ConvertError> {
    for &name in attr_names {
        if let Some(attr) = e.try_get_attribute(name)? {
            let value = attr.decode_and_unescape_value(reader.decoder())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn get_time_attribute(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    attr_names: &[&[u8]],
) -> Result<Option<u64>, ConvertError> {
    match get_string_attribute(e, reader, attr_names)? {
        Some(value) => match parse_time(&value, false) {
            Ok(ms) => Ok(Some(ms)),
            Err(err) => {
                warn!("时间戳 '{value}' 解析失败 ({err})，该时间戳将被忽略");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

fn reader_position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// 把字节偏移换算为 1 起始的行号。
fn line_number_at(content: &str, byte_offset: usize) -> usize {
    let clamped = byte_offset.min(content.len());
    content.as_bytes()[..clamped]
        .iter()
        .filter(|&&byte| byte == b'\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "xmlns=\"http://www.w3.org/ns/ttml\" xmlns:ttm=\"http://www.w3.org/ns/ttml#metadata\" xmlns:itunes=\"http://music.apple.com/lyric-ttml-internal\"";

    #[test]
    fn test_word_timing_parse() {
        let content = format!(
            "<tt {NS} itunes:timing=\"Word\"><body><div><p begin=\"00:01.000\" end=\"00:01.800\"><span begin=\"00:01.000\" end=\"00:01.200\">Hel</span><span begin=\"00:01.200\" end=\"00:01.400\">lo</span> <span begin=\"00:01.600\" end=\"00:01.800\">world</span></p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(document.timing, TimingMode::Word);
        assert_eq!(document.lyrics.len(), 1);
        let LineContent::Words(words) = &document.lyrics[0].content else {
            panic!("expected word list");
        };
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hel");
        assert!(words[0].part);
        assert_eq!(words[1].text, "lo");
        assert!(!words[1].part);
        assert_eq!(words[2].text, "world");
        assert_eq!(words[2].begin, Some(1600));
        assert_eq!(document.lyrics[0].begin, Some(1000));
        assert_eq!(document.lyrics[0].end, Some(1800));
    }

    #[test]
    fn test_line_timing_parse() {
        let content = format!(
            "<tt {NS} itunes:timing=\"Line\"><body><div><p begin=\"00:10.000\" end=\"00:12.000\" ttm:agent=\"v1\">Hello</p><p begin=\"00:12.000\" end=\"00:14.000\" ttm:role=\"x-bg\">Echo</p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(document.timing, TimingMode::Line);
        assert_eq!(document.lyrics[0].agent.as_deref(), Some("v1"));
        assert_eq!(
            document.lyrics[0].content,
            LineContent::Text("Hello".to_string())
        );
        assert!(document.lyrics[1].background);
    }

    #[test]
    fn test_none_timing_parse() {
        let content = format!(
            "<tt {NS} itunes:timing=\"None\"><body><div><p>Hello</p><p>World</p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(document.timing, TimingMode::None);
        assert_eq!(document.lyrics.len(), 2);
        assert_eq!(document.lyrics[0].begin, None);
    }

    #[test]
    fn test_bare_ampersand_is_repaired() {
        let content = format!(
            "<tt {NS} itunes:timing=\"Line\"><body><div><p begin=\"00:10.000\" end=\"00:12.000\">Rock & Roll &amp; more</p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(
            document.lyrics[0].content,
            LineContent::Text("Rock & Roll & more".to_string())
        );
    }

    #[test]
    fn test_background_span_is_pulled_out() {
        let content = format!(
            "<tt {NS} itunes:timing=\"Word\"><body><div><p begin=\"00:10.000\" end=\"00:12.000\"><span begin=\"00:10.000\" end=\"00:11.000\">Lead</span><span ttm:role=\"x-bg\"><span begin=\"00:10.000\" end=\"00:10.500\">Echo</span></span></p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(document.lyrics.len(), 2);
        assert!(!document.lyrics[0].background);
        assert!(document.lyrics[1].background);
        assert_eq!(document.lyrics[1].begin, Some(10000));
        assert_eq!(document.lyrics[1].end, Some(10500));
    }

    #[test]
    fn test_word_mode_plain_text_p_is_inconsistent() {
        let content = format!(
            "<tt {NS} itunes:timing=\"Word\"><body><div><p begin=\"00:10.000\" end=\"00:12.000\">plain text</p></div></body></tt>"
        );
        let error = parse_ttml(&content).unwrap_err();
        assert!(matches!(error, ConvertError::InconsistentTiming { .. }));
    }

    #[test]
    fn test_line_mode_p_without_begin_is_error() {
        let content =
            format!("<tt {NS} itunes:timing=\"Line\"><body><div><p>Hello</p></div></body></tt>");
        let error = parse_ttml(&content).unwrap_err();
        assert!(matches!(error, ConvertError::ParseError { .. }));
    }

    #[test]
    fn test_missing_root_is_error() {
        let error = parse_ttml("[00:10.000]not xml at all").unwrap_err();
        assert!(matches!(error, ConvertError::ParseError { .. }));
    }

    #[test]
    fn test_timing_heuristic_without_declaration() {
        let content = format!(
            "<tt {NS}><body><div><p begin=\"00:10.000\" end=\"00:12.000\">Hello</p></div></body></tt>"
        );
        let document = parse_ttml(&content).unwrap();
        assert_eq!(document.timing, TimingMode::Line);
    }

    #[test]
    fn test_line_number_at() {
        assert_eq!(line_number_at("a\nb\nc", 0), 1);
        assert_eq!(line_number_at("a\nb\nc", 2), 2);
        assert_eq!(line_number_at("a\nb\nc", 4), 3);
    }
}
