//! Answer text rendering
//!
//! Text between single asterisks is emphasized and newlines become line
//! breaks. Emphasis never spans a line.

use once_cell::sync::Lazy;
use regex::Regex;

static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("emphasis pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Emphasis(String),
    LineBreak,
}

/// Split answer text into display segments
pub fn format_answer(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();

    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            segments.push(Segment::LineBreak);
        }

        let mut last = 0;
        for caps in EMPHASIS.captures_iter(line) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(line[last..whole.start()].to_string()));
            }
            segments.push(Segment::Emphasis(inner.as_str().to_string()));
            last = whole.end();
        }
        if last < line.len() {
            segments.push(Segment::Text(line[last..].to_string()));
        }
    }

    segments
}

/// Render segments as HTML with `<strong>` emphasis and `<br />` breaks
pub fn render_html(segments: &[Segment]) -> String {
    let mut html = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => html.push_str(&escape_html(text)),
            Segment::Emphasis(text) => {
                html.push_str("<strong class=\"highlighted-text\">");
                html.push_str(&escape_html(text));
                html.push_str("</strong>");
            }
            Segment::LineBreak => html.push_str("<br />"),
        }
    }
    html
}

/// Render segments for a terminal: emphasis in bold escape codes
pub fn render_ansi(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Emphasis(text) => {
                out.push_str("\x1b[1m");
                out.push_str(text);
                out.push_str("\x1b[0m");
            }
            Segment::LineBreak => out.push('\n'),
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emphasis_then_break() {
        assert_eq!(
            format_answer("*x*\ny"),
            vec![
                Segment::Emphasis("x".into()),
                Segment::LineBreak,
                Segment::Text("y".into()),
            ]
        );
        assert_eq!(
            render_html(&format_answer("*x*\ny")),
            "<strong class=\"highlighted-text\">x</strong><br />y"
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        let text = "Ghee supports digestion.";
        assert_eq!(format_answer(text), vec![Segment::Text(text.into())]);
        assert_eq!(render_html(&format_answer(text)), text);
    }

    #[test]
    fn test_emphasis_is_non_greedy() {
        assert_eq!(
            format_answer("The three *doshas* are *Vata*, Pitta"),
            vec![
                Segment::Text("The three ".into()),
                Segment::Emphasis("doshas".into()),
                Segment::Text(" are ".into()),
                Segment::Emphasis("Vata".into()),
                Segment::Text(", Pitta".into()),
            ]
        );
    }

    #[test]
    fn test_emphasis_does_not_cross_lines() {
        assert_eq!(
            format_answer("*a\nb*"),
            vec![
                Segment::Text("*a".into()),
                Segment::LineBreak,
                Segment::Text("b*".into()),
            ]
        );
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(format_answer("").is_empty());
        assert_eq!(format_answer("\n"), vec![Segment::LineBreak]);
    }

    #[test]
    fn test_ansi_rendering() {
        assert_eq!(render_ansi(&format_answer("*Kapha*")), "\x1b[1mKapha\x1b[0m");
    }
}
