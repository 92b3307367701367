//! Outline parsing into per-slide blocks.
//!
//! Outlines arrive as freeform markdown-ish text. The only structure we
//! rely on is heading lines that mark where a slide starts; everything
//! between two headings belongs to the earlier one.

use std::sync::OnceLock;

use regex::Regex;

/// One slide's worth of outline text, heading line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideBlock {
    /// Zero-based position within the outline.
    pub index: usize,
    /// Block text from its heading line up to the next heading.
    pub content: String,
}

/// Matches slide heading lines such as `## Slide 1:`, `# Page 2:` or `## 3:`.
///
/// One or two leading `#`, an optional `Slide`/`Page` label in any case,
/// then a number and an ASCII or full-width colon.
fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^##?\s*(?:(?:slide|page)\s*)?\d+[:：]").expect("valid heading regex")
    })
}

/// Splits a raw outline into per-slide blocks.
///
/// Each block starts at a recognized heading line and runs up to the next
/// heading (exclusive). Text before the first heading is dropped. An
/// outline with no recognized headings yields a single block holding the
/// whole input, so generation still has something to work with.
pub fn segment(outline: &str) -> Vec<SlideBlock> {
    let starts: Vec<usize> = heading_regex()
        .find_iter(outline)
        .map(|m| m.start())
        .collect();

    if starts.is_empty() {
        return vec![SlideBlock {
            index: 0,
            content: outline.to_string(),
        }];
    }

    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = starts.get(index + 1).copied().unwrap_or(outline.len());
            SlideBlock {
                index,
                content: outline[start..end].to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_splits_on_slide_headings() {
        let outline = "## Slide 1: Intro\n- a\n## Slide 2: Details\n- b\n- c";
        let blocks = segment(outline);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].index, 0);
        assert_eq!(blocks[0].content, "## Slide 1: Intro\n- a\n");
        assert_eq!(blocks[1].index, 1);
        assert_eq!(blocks[1].content, "## Slide 2: Details\n- b\n- c");
    }

    #[test]
    fn test_segment_drops_text_before_first_heading() {
        let outline = "# Presentation Outline\nsome preamble\n## Slide 1: Only\n- x";
        let blocks = segment(outline);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "## Slide 1: Only\n- x");
    }

    #[test]
    fn test_segment_no_headings_yields_whole_input() {
        let outline = "just a paragraph\nwith no structure";
        let blocks = segment(outline);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].index, 0);
        assert_eq!(blocks[0].content, outline);
    }

    #[test]
    fn test_segment_accepts_page_label_and_bare_numbers() {
        let outline = "# Page 1: One\nbody\n## 2: Two\nbody\n# slide 3: Three\nbody";
        let blocks = segment(outline);

        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].content.starts_with("# Page 1:"));
        assert!(blocks[1].content.starts_with("## 2:"));
        assert!(blocks[2].content.starts_with("# slide 3:"));
    }

    #[test]
    fn test_segment_accepts_full_width_colon() {
        let outline = "## Slide 1：导入\n- 内容\n## Slide 2：细节\n- 内容";
        let blocks = segment(outline);

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].content.starts_with("## Slide 1："));
    }

    #[test]
    fn test_segment_ignores_deep_headings_and_mid_line_markers() {
        let outline = "### Slide 1: Too deep\n- a\ntext ## Slide 2: inline\n- b";
        let blocks = segment(outline);

        // Neither line is a valid slide marker, so the whole input is one block.
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, outline);
    }

    #[test]
    fn test_segment_empty_input_yields_single_empty_block() {
        let blocks = segment("");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "");
    }

    #[test]
    fn test_segment_is_deterministic() {
        let outline = "## Slide 1: A\n- x\n## Slide 2: B\n- y";
        assert_eq!(segment(outline), segment(outline));
    }
}
