//! Slide fragment normalization.
//!
//! Generated fragments arrive as whatever the model produced: usually a
//! `<div class="slide">` container, sometimes fenced in a markdown code
//! block, occasionally bare text. Normalization strips the fences and
//! guarantees every fragment carries the slide marker class plus a
//! positional id, so the assembled deck can style and count slides.
//!
//! Malformed markup is never an error here. The scan degrades to
//! whatever it managed to read, and a fragment we cannot make sense of
//! is wrapped whole in a synthetic container.

use std::sync::OnceLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

/// Class name that marks a slide container in the generated markup.
pub const SLIDE_CLASS: &str = "slide";

/// Matches fence markers with an optional `html` tag and trailing newline.
fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("```(?:html)?\n?").expect("valid fence regex"))
}

/// Removes markdown fence markers from a streamed chunk.
///
/// Newlines are left alone; chunk boundaries fall anywhere, so a marker
/// and its newline may arrive in different chunks.
pub fn clean_chunk(text: &str) -> String {
    text.replace("```html", "").replace("```", "")
}

/// Removes fence markers (and the newline right after each) from a
/// complete document, then trims surrounding whitespace.
pub fn clean_document(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

/// Cleans one generated fragment and guarantees a slide container.
///
/// Fences are stripped and the result trimmed. If no tag anywhere in the
/// fragment carries the slide marker class, the class and an id derived
/// from `slide_number` (1-based) are injected into the first element tag;
/// a fragment with no markup at all is wrapped in a synthetic container.
pub fn normalize_fragment(raw: &str, slide_number: usize) -> String {
    let cleaned = clean_document(raw);
    if has_slide_class(&cleaned) {
        return cleaned;
    }
    match parse_first_tag(&cleaned) {
        Some(tag) => {
            let rebuilt = rebuild_tag(&tag, slide_number);
            format!("{}{}{}", &cleaned[..tag.start], rebuilt, &cleaned[tag.end + 1..])
        }
        None => wrap_fragment(&cleaned, slide_number),
    }
}

fn wrap_fragment(content: &str, slide_number: usize) -> String {
    format!("<div class=\"{SLIDE_CLASS}\" id=\"slide{slide_number}\">\n{content}\n</div>")
}

/// Builds a reader tolerant of the tag soup models emit.
fn html_reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    reader.check_end_names(false);
    reader
}

/// Returns the `class` attribute of a tag, raw and undecoded.
fn tag_class(tag: &BytesStart<'_>) -> Option<String> {
    tag.attributes().flatten().find_map(|attr| {
        attr.key
            .as_ref()
            .eq_ignore_ascii_case(b"class")
            .then(|| String::from_utf8_lossy(&attr.value).into_owned())
    })
}

fn class_has_slide(value: &str) -> bool {
    value.split_ascii_whitespace().any(|token| token == SLIDE_CLASS)
}

/// Scans every tag for the slide marker class.
///
/// Stops at the first read error and reports what it saw up to there.
fn has_slide_class(html: &str) -> bool {
    let mut reader = html_reader(html);
    loop {
        match reader.read_event() {
            Ok(Event::Start(tag) | Event::Empty(tag)) => {
                if tag_class(&tag).is_some_and(|class| class_has_slide(&class)) {
                    return true;
                }
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

/// First element tag of a fragment, located and decomposed.
struct FirstTag {
    /// Byte offset of the opening `<`.
    start: usize,
    /// Byte offset of the closing `>`.
    end: usize,
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

fn parse_first_tag(html: &str) -> Option<FirstTag> {
    let start = first_tag_start(html)?;
    let end = tag_close(html, start)?;
    let mut reader = html_reader(&html[start..=end]);
    let (tag, self_closing) = match reader.read_event() {
        Ok(Event::Start(tag)) => (tag, false),
        Ok(Event::Empty(tag)) => (tag, true),
        _ => return None,
    };
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.ok()?;
        attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            String::from_utf8_lossy(&attr.value).into_owned(),
        ));
    }
    Some(FirstTag {
        start,
        end,
        name,
        attrs,
        self_closing,
    })
}

/// Finds the `<` opening the first element tag, skipping comments,
/// doctypes, closing tags and stray `<` in text.
fn first_tag_start(html: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(rel) = html[search_from..].find('<') {
        let open = search_from + rel;
        let rest = &html[open..];
        if rest.starts_with("<!--") {
            search_from = open + rest.find("-->")? + 3;
        } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Some(open);
        } else {
            search_from = open + 1;
        }
    }
    None
}

/// Finds the `>` closing the tag opened at `open`, ignoring `>` inside
/// quoted attribute values.
fn tag_close(html: &str, open: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &byte) in html.as_bytes().iter().enumerate().skip(open + 1) {
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Re-serializes the first tag with the slide class merged in and a
/// positional id added when the tag has none of its own.
fn rebuild_tag(tag: &FirstTag, slide_number: usize) -> String {
    let mut out = format!("<{}", tag.name);
    let mut has_class = false;
    let mut has_id = false;
    for (key, value) in &tag.attrs {
        let value = value.replace('"', "&quot;");
        if key.eq_ignore_ascii_case("class") {
            has_class = true;
            let merged = if value.trim().is_empty() {
                SLIDE_CLASS.to_string()
            } else {
                format!("{value} {SLIDE_CLASS}")
            };
            out.push_str(&format!(" class=\"{merged}\""));
        } else {
            if key.eq_ignore_ascii_case("id") {
                has_id = true;
            }
            out.push_str(&format!(" {key}=\"{value}\""));
        }
    }
    if !has_class {
        out.push_str(&format!(" class=\"{SLIDE_CLASS}\""));
    }
    if !has_id {
        out.push_str(&format!(" id=\"slide{slide_number}\""));
    }
    out.push_str(if tag.self_closing { "/>" } else { ">" });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_chunk_strips_fence_markers_only() {
        assert_eq!(clean_chunk("```html\n<div>"), "\n<div>");
        assert_eq!(clean_chunk("</div>\n```"), "</div>\n");
        assert_eq!(clean_chunk("no fences"), "no fences");
    }

    #[test]
    fn test_clean_document_strips_fences_and_trims() {
        let raw = "```html\n<html><body>x</body></html>\n```\n";
        assert_eq!(clean_document(raw), "<html><body>x</body></html>");
    }

    #[test]
    fn test_clean_document_handles_untagged_fences() {
        assert_eq!(clean_document("```\n<p>x</p>\n```"), "<p>x</p>");
    }

    #[test]
    fn test_normalize_passthrough_when_slide_class_present() {
        let html = r#"<div class="slide" id="slide3"><h1>T</h1></div>"#;
        assert_eq!(normalize_fragment(html, 3), html);
    }

    #[test]
    fn test_normalize_passthrough_when_slide_class_nested() {
        let html = r#"<section><div class="fancy slide">x</div></section>"#;
        assert_eq!(normalize_fragment(html, 1), html);
    }

    #[test]
    fn test_normalize_injects_class_and_id_into_first_tag() {
        let html = r#"<div style="color:red"><h1>T</h1></div>"#;
        assert_eq!(
            normalize_fragment(html, 2),
            r#"<div style="color:red" class="slide" id="slide2"><h1>T</h1></div>"#
        );
    }

    #[test]
    fn test_normalize_merges_existing_class() {
        let html = r#"<div class="card dark">x</div>"#;
        assert_eq!(
            normalize_fragment(html, 1),
            r#"<div class="card dark slide" id="slide1">x</div>"#
        );
    }

    #[test]
    fn test_normalize_keeps_existing_id() {
        let html = r#"<div id="intro">x</div>"#;
        assert_eq!(
            normalize_fragment(html, 4),
            r#"<div id="intro" class="slide">x</div>"#
        );
    }

    #[test]
    fn test_normalize_requires_exact_class_token() {
        let html = r#"<div class="slideshow">x</div>"#;
        assert_eq!(
            normalize_fragment(html, 1),
            r#"<div class="slideshow slide" id="slide1">x</div>"#
        );
    }

    #[test]
    fn test_normalize_wraps_plain_text() {
        assert_eq!(
            normalize_fragment("Just some notes", 5),
            "<div class=\"slide\" id=\"slide5\">\nJust some notes\n</div>"
        );
    }

    #[test]
    fn test_normalize_wraps_empty_fragment() {
        assert_eq!(
            normalize_fragment("", 1),
            "<div class=\"slide\" id=\"slide1\">\n\n</div>"
        );
    }

    #[test]
    fn test_normalize_strips_fences_before_injection() {
        let raw = "```html\n<div><p>x</p></div>\n```";
        assert_eq!(
            normalize_fragment(raw, 1),
            r#"<div class="slide" id="slide1"><p>x</p></div>"#
        );
    }

    #[test]
    fn test_normalize_skips_leading_comment() {
        let html = "<!-- generated --><div>x</div>";
        assert_eq!(
            normalize_fragment(html, 1),
            r#"<!-- generated --><div class="slide" id="slide1">x</div>"#
        );
    }

    #[test]
    fn test_normalize_tolerates_unbalanced_markup() {
        // The void <br> never closes; the scan must still see the class.
        let html = r#"<div class="slide"><br><p>x</p></div>"#;
        assert_eq!(normalize_fragment(html, 1), html);
    }

    #[test]
    fn test_normalize_injects_into_self_closing_tag() {
        assert_eq!(
            normalize_fragment(r#"<img src="x.png"/>"#, 2),
            r#"<img src="x.png" class="slide" id="slide2"/>"#
        );
    }

    #[test]
    fn test_tag_close_ignores_bracket_inside_quotes() {
        let html = r#"<div title="a > b">x</div>"#;
        assert_eq!(tag_close(html, 0), Some(18));
    }
}
