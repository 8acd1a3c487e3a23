//! Structured rich text as delivered by the content API, and its HTML rendering.
//!
//! Body text arrives as a flat list of typed blocks. Inline formatting is
//! expressed as spans with character offsets into the block text, so the
//! renderer walks characters rather than bytes.

/// One block of a post body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(RichText),
    Heading { level: u8, text: RichText },
    ListItem(RichText),
    OrderedListItem(RichText),
    Preformatted(RichText),
    Image { url: String, alt: Option<String> },
}

impl Block {
    /// Text content with all markup stripped. Images contribute nothing.
    pub fn plain_text(&self) -> &str {
        match self {
            Block::Paragraph(rich)
            | Block::ListItem(rich)
            | Block::OrderedListItem(rich)
            | Block::Preformatted(rich)
            | Block::Heading { text: rich, .. } => rich.text.as_str(),
            Block::Image { .. } => "",
        }
    }
}

/// Text plus inline formatting spans. Span offsets count characters.
#[derive(Debug, Clone, PartialEq)]
pub struct RichText {
    pub text: String,
    pub spans: Vec<Span>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }
}

/// Inline formatting over `[start, end)` character offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpanKind {
    Strong,
    Em,
    Hyperlink { url: String },
}

/// Render a block sequence to HTML. Consecutive list items are grouped into
/// a single `<ul>` or `<ol>`.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut html = String::new();
    let mut index = 0;

    while index < blocks.len() {
        match &blocks[index] {
            Block::Paragraph(rich) => {
                html.push_str("<p>");
                html.push_str(&render_rich_text(rich));
                html.push_str("</p>");
                index += 1;
            }
            Block::Heading { level, text } => {
                let level = (*level).clamp(1, 6);
                html.push_str(&format!("<h{level}>"));
                html.push_str(&render_rich_text(text));
                html.push_str(&format!("</h{level}>"));
                index += 1;
            }
            Block::ListItem(_) => {
                html.push_str("<ul>");
                while let Some(Block::ListItem(item)) = blocks.get(index) {
                    html.push_str("<li>");
                    html.push_str(&render_rich_text(item));
                    html.push_str("</li>");
                    index += 1;
                }
                html.push_str("</ul>");
            }
            Block::OrderedListItem(_) => {
                html.push_str("<ol>");
                while let Some(Block::OrderedListItem(item)) = blocks.get(index) {
                    html.push_str("<li>");
                    html.push_str(&render_rich_text(item));
                    html.push_str("</li>");
                    index += 1;
                }
                html.push_str("</ol>");
            }
            Block::Preformatted(rich) => {
                // Inline spans are not honored inside preformatted text.
                html.push_str("<pre>");
                push_escaped_str(&mut html, &rich.text);
                html.push_str("</pre>");
                index += 1;
            }
            Block::Image { url, alt } => {
                html.push_str("<img src=\"");
                push_escaped_str(&mut html, url);
                html.push_str("\" alt=\"");
                if let Some(alt) = alt {
                    push_escaped_str(&mut html, alt);
                }
                html.push_str("\">");
                index += 1;
            }
        }
    }

    html
}

/// Render one rich-text value to inline HTML.
///
/// Spans are tolerated in any shape the editor can produce: zero-width and
/// out-of-range spans are dropped, spans running past the text are clamped,
/// and overlapping spans are split so the output stays well formed.
pub fn render_rich_text(rich: &RichText) -> String {
    let chars: Vec<char> = rich.text.chars().collect();
    let len = chars.len();

    let mut spans: Vec<&Span> = rich
        .spans
        .iter()
        .filter(|span| span.start < span.end && span.start < len)
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut html = String::with_capacity(rich.text.len());
    let mut open: Vec<(usize, &SpanKind)> = Vec::new();
    let mut pending = spans.into_iter().peekable();

    for (pos, ch) in chars.iter().enumerate() {
        close_finished(&mut html, &mut open, pos);
        while let Some(span) = pending.next_if(|span| span.start == pos) {
            push_open_tag(&mut html, &span.kind);
            open.push((span.end.min(len), &span.kind));
        }
        push_escaped(&mut html, *ch);
    }
    close_finished(&mut html, &mut open, len);

    html
}

fn close_finished<'a>(html: &mut String, open: &mut Vec<(usize, &'a SpanKind)>, pos: usize) {
    while open.iter().any(|(end, _)| *end <= pos) {
        // Close down to the finished span, then reopen the survivors so
        // nesting stays valid even for overlapping spans.
        let mut reopen = Vec::new();
        while let Some((end, kind)) = open.pop() {
            push_close_tag(html, kind);
            if end <= pos {
                break;
            }
            reopen.push((end, kind));
        }
        for (end, kind) in reopen.into_iter().rev() {
            push_open_tag(html, kind);
            open.push((end, kind));
        }
    }
}

fn push_open_tag(html: &mut String, kind: &SpanKind) {
    match kind {
        SpanKind::Strong => html.push_str("<strong>"),
        SpanKind::Em => html.push_str("<em>"),
        SpanKind::Hyperlink { url } => {
            html.push_str("<a href=\"");
            push_escaped_str(html, url);
            html.push_str("\">");
        }
    }
}

fn push_close_tag(html: &mut String, kind: &SpanKind) {
    match kind {
        SpanKind::Strong => html.push_str("</strong>"),
        SpanKind::Em => html.push_str("</em>"),
        SpanKind::Hyperlink { .. } => html.push_str("</a>"),
    }
}

fn push_escaped(html: &mut String, ch: char) {
    match ch {
        '&' => html.push_str("&amp;"),
        '<' => html.push_str("&lt;"),
        '>' => html.push_str("&gt;"),
        '"' => html.push_str("&quot;"),
        '\'' => html.push_str("&#39;"),
        other => html.push(other),
    }
}

fn push_escaped_str(html: &mut String, value: &str) {
    for ch in value.chars() {
        push_escaped(html, ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spanned(text: &str, spans: Vec<Span>) -> RichText {
        RichText {
            text: text.to_string(),
            spans,
        }
    }

    fn span(start: usize, end: usize, kind: SpanKind) -> Span {
        Span { start, end, kind }
    }

    #[test]
    fn escapes_markup_in_plain_paragraphs() {
        let html = render_blocks(&[Block::Paragraph(RichText::plain("a < b & \"c\""))]);
        assert_eq!(html, "<p>a &lt; b &amp; &quot;c&quot;</p>");
    }

    #[test]
    fn span_offsets_count_characters_not_bytes() {
        let rich = spanned("héllo wörld", vec![span(0, 5, SpanKind::Strong)]);
        assert_eq!(render_rich_text(&rich), "<strong>héllo</strong> wörld");
    }

    #[test]
    fn nested_spans_render_nested_tags() {
        let rich = spanned(
            "bold and italic",
            vec![
                span(0, 15, SpanKind::Strong),
                span(9, 15, SpanKind::Em),
            ],
        );
        assert_eq!(
            render_rich_text(&rich),
            "<strong>bold and <em>italic</em></strong>"
        );
    }

    #[test]
    fn overlapping_spans_stay_well_formed() {
        let rich = spanned(
            "abcdefgh",
            vec![
                span(0, 5, SpanKind::Strong),
                span(3, 8, SpanKind::Em),
            ],
        );
        assert_eq!(
            render_rich_text(&rich),
            "<strong>abc<em>de</em></strong><em>fgh</em>"
        );
    }

    #[test]
    fn hyperlink_urls_are_escaped() {
        let rich = spanned(
            "here",
            vec![span(
                0,
                4,
                SpanKind::Hyperlink {
                    url: "https://example.com/?a=1&b=\"2\"".to_string(),
                },
            )],
        );
        assert_eq!(
            render_rich_text(&rich),
            "<a href=\"https://example.com/?a=1&amp;b=&quot;2&quot;\">here</a>"
        );
    }

    #[test]
    fn spans_past_the_text_are_clamped() {
        let rich = spanned("tiny", vec![span(2, 40, SpanKind::Em)]);
        assert_eq!(render_rich_text(&rich), "ti<em>ny</em>");
    }

    #[test]
    fn degenerate_spans_are_ignored() {
        let rich = spanned(
            "text",
            vec![span(2, 2, SpanKind::Strong), span(9, 12, SpanKind::Em)],
        );
        assert_eq!(render_rich_text(&rich), "text");
    }

    #[test]
    fn consecutive_list_items_share_one_list() {
        let html = render_blocks(&[
            Block::ListItem(RichText::plain("first")),
            Block::ListItem(RichText::plain("second")),
            Block::Paragraph(RichText::plain("after")),
        ]);
        assert_eq!(
            html,
            "<ul><li>first</li><li>second</li></ul><p>after</p>"
        );
    }

    #[test]
    fn ordered_and_unordered_runs_stay_separate() {
        let html = render_blocks(&[
            Block::OrderedListItem(RichText::plain("one")),
            Block::OrderedListItem(RichText::plain("two")),
            Block::ListItem(RichText::plain("bullet")),
        ]);
        assert_eq!(html, "<ol><li>one</li><li>two</li></ol><ul><li>bullet</li></ul>");
    }

    #[test]
    fn heading_levels_are_clamped_to_html_range() {
        let html = render_blocks(&[
            Block::Heading {
                level: 9,
                text: RichText::plain("deep"),
            },
            Block::Heading {
                level: 0,
                text: RichText::plain("shallow"),
            },
        ]);
        assert_eq!(html, "<h6>deep</h6><h1>shallow</h1>");
    }

    #[test]
    fn preformatted_text_keeps_no_inline_markup() {
        let rich = spanned("let x = 1;", vec![span(0, 3, SpanKind::Strong)]);
        let html = render_blocks(&[Block::Preformatted(rich)]);
        assert_eq!(html, "<pre>let x = 1;</pre>");
    }

    #[test]
    fn images_render_with_escaped_attributes() {
        let html = render_blocks(&[Block::Image {
            url: "https://img.example/x.png".to_string(),
            alt: Some("a \"photo\"".to_string()),
        }]);
        assert_eq!(
            html,
            "<img src=\"https://img.example/x.png\" alt=\"a &quot;photo&quot;\">"
        );
    }

    #[test]
    fn images_contribute_no_plain_text() {
        let image = Block::Image {
            url: "https://img.example/x.png".to_string(),
            alt: None,
        };
        assert_eq!(image.plain_text(), "");
    }
}
