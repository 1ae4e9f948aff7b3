//! MOTD parsing and rendering
//!
//! Servers send their message of the day either as a legacy string with `§`
//! formatting codes (Bedrock, old Java servers) or as a JSON chat component
//! (modern Java). Both are flattened into styled [`Segment`]s and rendered in
//! the four forms stored with every snapshot.

use serde_json::Value;
use std::fmt::Write as _;

use crate::models::Motd;

const SECTION: char = '§';

/// One of the sixteen named chat colors, or an arbitrary RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Named(NamedColor),
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

impl NamedColor {
    const ALL: [Self; 16] = [
        Self::Black,
        Self::DarkBlue,
        Self::DarkGreen,
        Self::DarkAqua,
        Self::DarkRed,
        Self::DarkPurple,
        Self::Gold,
        Self::Gray,
        Self::DarkGray,
        Self::Blue,
        Self::Green,
        Self::Aqua,
        Self::Red,
        Self::LightPurple,
        Self::Yellow,
        Self::White,
    ];

    fn code(&self) -> char {
        let index = Self::ALL.iter().position(|c| c == self).unwrap_or(15);
        std::char::from_digit(index as u32, 16).unwrap_or('f')
    }

    fn from_code(code: char) -> Option<Self> {
        code.to_digit(16).map(|i| Self::ALL[i as usize])
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::DarkBlue => "dark_blue",
            Self::DarkGreen => "dark_green",
            Self::DarkAqua => "dark_aqua",
            Self::DarkRed => "dark_red",
            Self::DarkPurple => "dark_purple",
            Self::Gold => "gold",
            Self::Gray => "gray",
            Self::DarkGray => "dark_gray",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Aqua => "aqua",
            Self::Red => "red",
            Self::LightPurple => "light_purple",
            Self::Yellow => "yellow",
            Self::White => "white",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::Black => (0x00, 0x00, 0x00),
            Self::DarkBlue => (0x00, 0x00, 0xAA),
            Self::DarkGreen => (0x00, 0xAA, 0x00),
            Self::DarkAqua => (0x00, 0xAA, 0xAA),
            Self::DarkRed => (0xAA, 0x00, 0x00),
            Self::DarkPurple => (0xAA, 0x00, 0xAA),
            Self::Gold => (0xFF, 0xAA, 0x00),
            Self::Gray => (0xAA, 0xAA, 0xAA),
            Self::DarkGray => (0x55, 0x55, 0x55),
            Self::Blue => (0x55, 0x55, 0xFF),
            Self::Green => (0x55, 0xFF, 0x55),
            Self::Aqua => (0x55, 0xFF, 0xFF),
            Self::Red => (0xFF, 0x55, 0x55),
            Self::LightPurple => (0xFF, 0x55, 0xFF),
            Self::Yellow => (0xFF, 0xFF, 0x55),
            Self::White => (0xFF, 0xFF, 0xFF),
        }
    }
}

impl Color {
    fn parse(value: &str) -> Option<Self> {
        if let Some(hex) = value.strip_prefix('#') {
            if hex.len() != 6 {
                return None;
            }
            let rgb = u32::from_str_radix(hex, 16).ok()?;
            return Some(Self::Rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8));
        }
        NamedColor::from_name(value).map(Self::Named)
    }

    fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::Named(named) => named.rgb(),
            Self::Rgb(r, g, b) => (*r, *g, *b),
        }
    }

    /// Closest legacy code; RGB colors map to the nearest named color
    fn legacy_code(&self) -> char {
        match self {
            Self::Named(named) => named.code(),
            Self::Rgb(r, g, b) => {
                let distance = |c: &NamedColor| {
                    let (cr, cg, cb) = c.rgb();
                    let dr = i32::from(cr) - i32::from(*r);
                    let dg = i32::from(cg) - i32::from(*g);
                    let db = i32::from(cb) - i32::from(*b);
                    dr * dr + dg * dg + db * db
                };
                NamedColor::ALL
                    .iter()
                    .min_by_key(|c| distance(*c))
                    .map(NamedColor::code)
                    .unwrap_or('f')
            }
        }
    }
}

/// Text decorations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub color: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

impl Style {
    fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

/// Parse a legacy `§`-coded string
pub fn parse_legacy(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut style = Style::default();
    let mut text = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != SECTION {
            text.push(c);
            continue;
        }

        let Some(code) = chars.next() else {
            break;
        };

        if !text.is_empty() {
            segments.push(Segment {
                text: std::mem::take(&mut text),
                style,
            });
        }

        match code.to_ascii_lowercase() {
            'k' => style.obfuscated = true,
            'l' => style.bold = true,
            'm' => style.strikethrough = true,
            'n' => style.underlined = true,
            'o' => style.italic = true,
            'r' => style = Style::default(),
            other => {
                // A color code resets formatting, as in the vanilla client
                if let Some(named) = NamedColor::from_code(other) {
                    style = Style {
                        color: Some(Color::Named(named)),
                        ..Style::default()
                    };
                }
            }
        }
    }

    if !text.is_empty() {
        segments.push(Segment { text, style });
    }

    segments
}

/// Parse a JSON chat component (or a bare string)
pub fn parse_component(value: &Value) -> Vec<Segment> {
    let mut segments = Vec::new();
    walk_component(value, Style::default(), &mut segments);
    segments
}

fn walk_component(value: &Value, inherited: Style, out: &mut Vec<Segment>) {
    match value {
        Value::String(text) => push_text(text, inherited, out),
        Value::Array(parts) => {
            for part in parts {
                walk_component(part, inherited, out);
            }
        }
        Value::Object(map) => {
            let mut style = inherited;
            if let Some(color) = map.get("color").and_then(Value::as_str).and_then(Color::parse) {
                style.color = Some(color);
            }
            let flag = |key: &str, current: bool| map.get(key).and_then(Value::as_bool).unwrap_or(current);
            style.bold = flag("bold", style.bold);
            style.italic = flag("italic", style.italic);
            style.underlined = flag("underlined", style.underlined);
            style.strikethrough = flag("strikethrough", style.strikethrough);
            style.obfuscated = flag("obfuscated", style.obfuscated);

            if let Some(text) = map.get("text").and_then(Value::as_str) {
                push_text(text, style, out);
            }
            if let Some(extra) = map.get("extra") {
                walk_component(extra, style, out);
            }
        }
        _ => {}
    }
}

fn push_text(text: &str, style: Style, out: &mut Vec<Segment>) {
    if text.contains(SECTION) {
        // Legacy codes embedded in a component; they apply on top of the component style
        for mut segment in parse_legacy(text) {
            if segment.style.is_plain() {
                segment.style = style;
            }
            out.push(segment);
        }
    } else if !text.is_empty() {
        out.push(Segment {
            text: text.to_string(),
            style,
        });
    }
}

/// Text with every code stripped
pub fn to_plain(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Legacy `§`-coded string
pub fn to_minecraft(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut current = Style::default();

    for segment in segments {
        if segment.style != current {
            if !current.is_plain() {
                out.push(SECTION);
                out.push('r');
            }
            if let Some(color) = segment.style.color {
                out.push(SECTION);
                out.push(color.legacy_code());
            }
            for (enabled, code) in [
                (segment.style.obfuscated, 'k'),
                (segment.style.bold, 'l'),
                (segment.style.strikethrough, 'm'),
                (segment.style.underlined, 'n'),
                (segment.style.italic, 'o'),
            ] {
                if enabled {
                    out.push(SECTION);
                    out.push(code);
                }
            }
            current = segment.style;
        }
        out.push_str(&segment.text);
    }

    out
}

/// HTML fragment with one styled `<span>` per segment
pub fn to_html(segments: &[Segment]) -> String {
    let mut out = String::from("<p>");

    for segment in segments {
        let text = html_escape::encode_text(&segment.text).replace('\n', "<br>");
        let style = &segment.style;

        if style.is_plain() {
            out.push_str(&text);
            continue;
        }

        let mut css = Vec::new();
        if let Some(color) = style.color {
            let (r, g, b) = color.rgb();
            css.push(format!("color: #{r:02X}{g:02X}{b:02X}"));
        }
        if style.bold {
            css.push("font-weight: bold".to_string());
        }
        if style.italic {
            css.push("font-style: italic".to_string());
        }
        match (style.underlined, style.strikethrough) {
            (true, true) => css.push("text-decoration: underline line-through".to_string()),
            (true, false) => css.push("text-decoration: underline".to_string()),
            (false, true) => css.push("text-decoration: line-through".to_string()),
            (false, false) => {}
        }

        let class = if style.obfuscated {
            " class=\"obfuscated\""
        } else {
            ""
        };
        let _ = write!(out, "<span{class} style=\"{}\">{text}</span>", css.join("; "));
    }

    out.push_str("</p>");
    out
}

/// Terminal rendering with 24-bit SGR escapes
pub fn to_ansi(segments: &[Segment]) -> String {
    let mut out = String::new();

    for segment in segments {
        out.push_str("\x1b[0m");
        let style = &segment.style;
        if let Some(color) = style.color {
            let (r, g, b) = color.rgb();
            let _ = write!(out, "\x1b[38;2;{r};{g};{b}m");
        }
        for (enabled, sgr) in [
            (style.bold, 1),
            (style.italic, 3),
            (style.underlined, 4),
            (style.obfuscated, 5),
            (style.strikethrough, 9),
        ] {
            if enabled {
                let _ = write!(out, "\x1b[{sgr}m");
            }
        }
        out.push_str(&segment.text);
    }

    out.push_str("\x1b[0m");
    out
}

/// Render all four MOTD forms
pub fn render(segments: &[Segment]) -> Motd {
    Motd {
        plain: to_plain(segments),
        html: to_html(segments),
        minecraft: to_minecraft(segments),
        ansi: to_ansi(segments),
    }
}
