//! Rename template engine.
//!
//! A template is literal text interleaved with `{tag}` or `{tag:format}`
//! tokens. This is deliberately a tiny parser over literal runs and tokens,
//! not an expression language: tags come from a fixed catalog, and date or
//! time formats accept only the documented letters (`Y M D h m s`, with the
//! conventional doubled spellings). Unknown letters in a format pass
//! through verbatim, so `{capture_date:YYYY-MM-DD}` keeps its dashes.
//!
//! `{seq:N}` renders a 1-based per-run counter zero-padded to N digits.

use crate::types::TemplateTagInfo;
use chrono::{Datelike, NaiveDateTime, Timelike};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Tag(Tag),
}

#[derive(Debug, Clone, PartialEq)]
enum Tag {
    CaptureDate(String),
    CaptureTime(String),
    ExecDate(String),
    ExecTime(String),
    Seq(usize),
    Orig,
    Ext,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Tag {
    fn needs_capture(&self) -> bool {
        matches!(
            self,
            Tag::CaptureDate(_)
                | Tag::CaptureTime(_)
                | Tag::Year
                | Tag::Month
                | Tag::Day
                | Tag::Hour
                | Tag::Minute
                | Tag::Second
        )
    }
}

/// A parsed rename template, ready to render per file.
#[derive(Debug, Clone)]
pub struct Template {
    tokens: Vec<Token>,
}

/// Per-file values a template renders from.
pub struct RenderContext<'a> {
    /// Resolved datetime for this file (capture, modified or shared current
    /// time depending on the request). `None` when unavailable.
    pub timestamp: Option<NaiveDateTime>,
    /// Timestamp of the run itself; identical for every item.
    pub executed_at: NaiveDateTime,
    /// 1-based position in plan order.
    pub seq: usize,
    /// Source file stem, extension excluded.
    pub orig: &'a str,
    /// Source extension, lowercased, no dot.
    pub ext: &'a str,
}

impl Template {
    pub fn parse(template: &str) -> Result<Self, String> {
        let chars: Vec<char> = template.chars().collect();
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut index = 0usize;

        while index < chars.len() {
            if chars[index] != '{' {
                literal.push(chars[index]);
                index += 1;
                continue;
            }
            let mut end = index + 1;
            while end < chars.len() && chars[end] != '}' {
                end += 1;
            }
            if end >= chars.len() {
                return Err("template has an unclosed `{`".to_string());
            }
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let body: String = chars[index + 1..end].iter().collect();
            tokens.push(Token::Tag(parse_tag(&body)?));
            index = end + 1;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self { tokens })
    }

    /// True when any tag needs the per-file timestamp.
    pub fn requires_timestamp(&self) -> bool {
        self.tokens.iter().any(|token| match token {
            Token::Tag(tag) => tag.needs_capture(),
            Token::Literal(_) => false,
        })
    }

    /// True when the template writes the extension itself, so the renderer
    /// must not append one.
    pub fn uses_ext(&self) -> bool {
        self.tokens
            .iter()
            .any(|token| matches!(token, Token::Tag(Tag::Ext)))
    }

    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, String> {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Tag(tag) => out.push_str(&render_tag(tag, ctx)?),
            }
        }
        Ok(out)
    }
}

fn parse_tag(body: &str) -> Result<Tag, String> {
    let (key, arg) = body
        .split_once(':')
        .map_or((body, None), |(k, v)| (k, Some(v)));

    match key {
        "capture_date" => Ok(Tag::CaptureDate(arg.unwrap_or("YYYYMMDD").to_string())),
        "capture_time" => Ok(Tag::CaptureTime(arg.unwrap_or("HHmmss").to_string())),
        "exec_date" => Ok(Tag::ExecDate(arg.unwrap_or("YYYYMMDD").to_string())),
        "exec_time" => Ok(Tag::ExecTime(arg.unwrap_or("HHmmss").to_string())),
        "seq" => {
            let width: usize = arg
                .unwrap_or("1")
                .parse()
                .map_err(|_| "seq width must be a positive integer".to_string())?;
            if width == 0 {
                return Err("seq width must be at least 1".to_string());
            }
            Ok(Tag::Seq(width))
        }
        "orig" => Ok(Tag::Orig),
        "ext" => Ok(Tag::Ext),
        "year" => Ok(Tag::Year),
        "month" => Ok(Tag::Month),
        "day" => Ok(Tag::Day),
        "hour" => Ok(Tag::Hour),
        "minute" => Ok(Tag::Minute),
        "second" => Ok(Tag::Second),
        _ => Err(format!("unknown template tag: {{{body}}}")),
    }
}

fn render_tag(tag: &Tag, ctx: &RenderContext<'_>) -> Result<String, String> {
    let timestamp = || {
        ctx.timestamp
            .ok_or_else(|| "no datetime available for this file".to_string())
    };
    Ok(match tag {
        Tag::CaptureDate(pattern) | Tag::CaptureTime(pattern) => {
            format_datetime(&timestamp()?, pattern)
        }
        Tag::ExecDate(pattern) | Tag::ExecTime(pattern) => {
            format_datetime(&ctx.executed_at, pattern)
        }
        Tag::Seq(width) => format!("{:0width$}", ctx.seq, width = width),
        Tag::Orig => ctx.orig.to_string(),
        Tag::Ext => ctx.ext.to_string(),
        Tag::Year => format!("{:04}", timestamp()?.year()),
        Tag::Month => format!("{:02}", timestamp()?.month()),
        Tag::Day => format!("{:02}", timestamp()?.day()),
        Tag::Hour => format!("{:02}", timestamp()?.hour()),
        Tag::Minute => format!("{:02}", timestamp()?.minute()),
        Tag::Second => format!("{:02}", timestamp()?.second()),
    })
}

/// Expand a date/time pattern against a timestamp. Recognized runs:
/// `YYYY`, `YY`, `MM`, `DD`, `HH`/`hh`, `mm`, `ss`. Anything else is
/// copied through unchanged.
fn format_datetime(dt: &NaiveDateTime, pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0usize;

    let run_len = |chars: &[char], i: usize, c: char| {
        chars[i..].iter().take_while(|&&x| x == c).count()
    };

    while i < chars.len() {
        let c = chars[i];
        let run = run_len(&chars, i, c);
        match c {
            'Y' if run >= 4 => {
                out.push_str(&format!("{:04}", dt.year()));
                i += 4;
            }
            'Y' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.year() % 100));
                i += 2;
            }
            'M' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.month()));
                i += 2;
            }
            'D' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.day()));
                i += 2;
            }
            'H' | 'h' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.hour()));
                i += 2;
            }
            'm' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.minute()));
                i += 2;
            }
            's' if run >= 2 => {
                out.push_str(&format!("{:02}", dt.second()));
                i += 2;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// The documented tag catalog, for shells that render a tag palette.
pub fn tag_catalog() -> Vec<TemplateTagInfo> {
    let info = |token: &str, label: &str, description: &str| TemplateTagInfo {
        token: token.to_string(),
        label: label.to_string(),
        description: description.to_string(),
    };
    vec![
        info(
            "{capture_date:YYYYMMDD}",
            "Capture date",
            "Date portion of the capture datetime",
        ),
        info(
            "{capture_time:HHmmss}",
            "Capture time",
            "Time portion of the capture datetime",
        ),
        info(
            "{exec_date:YYYYMMDD}",
            "Run date",
            "Date when the rename was executed",
        ),
        info(
            "{exec_time:HHmmss}",
            "Run time",
            "Time when the rename was executed",
        ),
        info("{seq:3}", "Sequence", "Zero-padded per-run counter"),
        info("{orig}", "Original name", "Source filename without extension"),
        info("{ext}", "Extension", "Source extension, lowercased"),
        info("{year}", "Year", "Four-digit year of the capture datetime"),
        info("{month}", "Month", "Two-digit month of the capture datetime"),
        info("{day}", "Day", "Two-digit day of the capture datetime"),
        info("{hour}", "Hour", "Two-digit hour of the capture datetime"),
        info("{minute}", "Minute", "Two-digit minute of the capture datetime"),
        info("{second}", "Second", "Two-digit second of the capture datetime"),
    ]
}
