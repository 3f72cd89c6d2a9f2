//! Line-oriented block parser.
//!
//! The source is split into trimmed lines carrying their absolute 1-based
//! line numbers, and parsed recursively: every container (list item, block
//! quote, directive content, table cell, footnote body) re-enters
//! [`BlockParser::parse_blocks`] with a dedented slice. Section nesting is
//! signalled by a returned stop index rather than unwinding: when a title of
//! an enclosing level is met, the current call returns the index where it
//! stopped and the caller picks up from there.

pub mod explicit;
pub mod lists;
pub mod sections;
pub mod tables;

use log::debug;

use crate::config::Config;
use crate::error::Diagnostic;
use crate::inline::InlineScanner;
use crate::namespace::{ConversionTable, Namespace};
use crate::nodes::{Node, NodeKind};
use sections::SectionOutcome;

/// Characters usable for section adornments and transitions.
pub(crate) const ADORNMENT_CHARS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

#[derive(Debug, Clone)]
pub(crate) struct BlockLine {
    pub text: String,
    /// 1-based source line.
    pub abs: usize,
}

/// Section adornment styles seen so far, in nesting order.
pub(crate) struct Ctx {
    pub styles: Vec<(char, bool)>,
}

pub(crate) fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

pub(crate) fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start_matches(' ').len()
}

/// The character of an all-same-adornment line, if it is one.
pub(crate) fn is_adornment(text: &str) -> Option<char> {
    let trimmed = text.trim_end();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    if !ADORNMENT_CHARS.contains(first) {
        return None;
    }
    chars.all(|c| c == first).then_some(first)
}

fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if c == '\t' {
            let col = out.chars().count();
            let pad = 8 - col % 8;
            out.extend(std::iter::repeat_n(' ', pad));
        } else {
            out.push(c);
        }
    }
    out
}

/// Collect the run of blank-or-indented lines from `start`, dedented by the
/// minimum indent of the non-blank ones; trailing blanks are dropped but the
/// returned index is past them.
pub(crate) fn get_indented(lines: &[BlockLine], start: usize) -> (Vec<BlockLine>, usize) {
    let mut end = start;
    while end < lines.len() && (is_blank(&lines[end].text) || indent_of(&lines[end].text) > 0) {
        end += 1;
    }
    let mut block: Vec<BlockLine> = lines[start..end].to_vec();
    while block.last().is_some_and(|l| is_blank(&l.text)) {
        block.pop();
    }
    let min_indent = block
        .iter()
        .filter(|l| !is_blank(&l.text))
        .map(|l| indent_of(&l.text))
        .min()
        .unwrap_or(0);
    for line in &mut block {
        if is_blank(&line.text) {
            line.text.clear();
        } else {
            line.text = line.text[min_indent..].to_string();
        }
    }
    (block, end)
}

pub(crate) enum TextOutcome {
    /// An enclosing section starts at this index.
    Stop(usize),
    Consumed(usize),
}

pub struct BlockParser<'a> {
    pub(crate) namespace: &'a Namespace,
    pub(crate) conversions: &'a ConversionTable,
    pub(crate) inline: InlineScanner,
}

impl<'a> BlockParser<'a> {
    pub fn new(
        config: &'a Config,
        namespace: &'a Namespace,
        conversions: &'a ConversionTable,
    ) -> Self {
        Self {
            namespace,
            conversions,
            inline: InlineScanner::new(config),
        }
    }

    /// Parse a whole source into a `Document` node.
    pub fn parse(&self, text: &str, diagnostics: &mut Vec<Diagnostic>) -> Node {
        let lines: Vec<BlockLine> = text
            .lines()
            .enumerate()
            .map(|(idx, line)| BlockLine {
                text: expand_tabs(line).trim_end().to_string(),
                abs: idx + 1,
            })
            .collect();
        let mut document = Node::new(NodeKind::Document, 1);
        let mut ctx = Ctx { styles: Vec::new() };
        self.parse_blocks(&lines, &mut document, 0, true, &mut ctx, diagnostics);
        document
    }

    /// Parse a slice of lines into `parent`. Returns the index at which an
    /// enclosing section begins, or `lines.len()` when fully consumed.
    pub(crate) fn parse_blocks(
        &self,
        lines: &[BlockLine],
        parent: &mut Node,
        level: usize,
        allow_titles: bool,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> usize {
        let mut i = 0;
        while i < lines.len() {
            if is_blank(&lines[i].text) {
                i += 1;
                continue;
            }
            if indent_of(&lines[i].text) > 0 {
                i = self.parse_block_quote(lines, i, parent, ctx, diags);
                continue;
            }
            if allow_titles
                && let Some(outcome) =
                    self.try_parse_overline_title(lines, i, parent, level, ctx, diags)
            {
                match outcome {
                    SectionOutcome::Stop(at) => return at,
                    SectionOutcome::Consumed(next) => {
                        i = next;
                        continue;
                    }
                }
            }
            if let Some(next) = self.try_parse_transition(lines, i, parent) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_doctest(lines, i, parent) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_bullet_list(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_enumerated_list(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_field_list(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_option_list(lines, i, parent) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_line_block(lines, i, parent) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_grid_table(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_simple_table(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            if let Some(next) = self.try_parse_explicit(lines, i, parent, ctx, diags) {
                i = next;
                continue;
            }
            match self.parse_text(lines, i, parent, level, allow_titles, ctx, diags) {
                TextOutcome::Stop(at) => return at,
                TextOutcome::Consumed(next) => i = next,
            }
        }
        lines.len()
    }

    pub(crate) fn inline_children(
        &self,
        text: &str,
        abs: usize,
        diags: &mut Vec<Diagnostic>,
    ) -> Vec<Node> {
        self.inline.parse(text, abs, diags)
    }

    /// Plain text: an underlined title, a definition list, or a paragraph
    /// (possibly introducing a literal block with `::`).
    fn parse_text(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        level: usize,
        allow_titles: bool,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> TextOutcome {
        if allow_titles
            && i + 1 < lines.len()
            && let Some(outcome) =
                self.try_parse_underline_title(lines, i, parent, level, ctx, diags)
        {
            return match outcome {
                SectionOutcome::Stop(at) => TextOutcome::Stop(at),
                SectionOutcome::Consumed(next) => TextOutcome::Consumed(next),
            };
        }
        if i + 1 < lines.len()
            && !is_blank(&lines[i + 1].text)
            && indent_of(&lines[i + 1].text) > 0
        {
            return TextOutcome::Consumed(self.parse_definition_list(lines, i, parent, ctx, diags));
        }

        let mut end = i;
        while end < lines.len() && !is_blank(&lines[end].text) && indent_of(&lines[end].text) == 0
        {
            end += 1;
        }
        let abs = lines[i].abs;
        let joined = lines[i..end]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut literal_follows = false;
        let text = if let Some(base) = joined.strip_suffix("::") {
            literal_follows = true;
            if base.trim().is_empty() {
                String::new()
            } else if base.ends_with(' ') {
                base.trim_end().to_string()
            } else {
                format!("{base}:")
            }
        } else {
            joined.clone()
        };

        if !text.is_empty() {
            let mut paragraph = Node::with_raw(NodeKind::Paragraph, &joined, abs);
            paragraph.children = self.inline_children(&text, abs, diags);
            parent.push(paragraph);
        }

        let mut next = end;
        if literal_follows {
            while next < lines.len() && is_blank(&lines[next].text) {
                next += 1;
            }
            if next < lines.len() && indent_of(&lines[next].text) > 0 {
                let literal_abs = lines[next].abs;
                let (block, after) = get_indented(lines, next);
                let content = block
                    .iter()
                    .map(|l| l.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                debug!("literal block at line {literal_abs}");
                let mut literal = Node::with_raw(
                    NodeKind::LiteralBlock { language: None },
                    content.clone(),
                    literal_abs,
                );
                literal.push(Node::text(content, literal_abs));
                parent.push(literal);
                next = after;
            } else {
                next = end;
            }
        }
        TextOutcome::Consumed(next)
    }

    /// Indented block at body level: a block quote, with an optional
    /// trailing `-- name` attribution.
    fn parse_block_quote(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> usize {
        let abs = lines[i].abs;
        let (mut body, next) = get_indented(lines, i);
        debug!("block quote at line {abs}");
        let mut quote = Node::new(NodeKind::BlockQuote, abs);

        let mut attribution: Option<Vec<BlockLine>> = None;
        let last_blank = body.iter().rposition(|l| is_blank(&l.text));
        if let Some(pos) = last_blank
            && pos + 1 < body.len()
            && attribution_text(&body[pos + 1].text).is_some()
        {
            attribution = Some(body.split_off(pos + 1));
            body.pop();
        }

        self.parse_blocks(&body, &mut quote, 0, false, ctx, diags);
        if let Some(attr_lines) = attribution {
            let attr_abs = attr_lines[0].abs;
            let first = attribution_text(&attr_lines[0].text).expect("checked above");
            let mut parts = vec![first.to_string()];
            parts.extend(attr_lines[1..].iter().map(|l| l.text.trim().to_string()));
            let text = parts.join("\n");
            let mut attr = Node::with_raw(NodeKind::Attribution, &text, attr_abs);
            attr.children = self.inline_children(&text, attr_abs, diags);
            quote.push(attr);
        }
        parent.push(quote);
        next
    }

    /// `>>> ` blocks become literal blocks, ended by the first blank line.
    fn try_parse_doctest(&self, lines: &[BlockLine], i: usize, parent: &mut Node) -> Option<usize> {
        if !lines[i].text.starts_with(">>> ") {
            return None;
        }
        let abs = lines[i].abs;
        let mut end = i;
        while end < lines.len() && !is_blank(&lines[end].text) {
            end += 1;
        }
        let content = lines[i..end]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!("doctest block at line {abs}");
        let mut node =
            Node::with_raw(NodeKind::LiteralBlock { language: None }, content.clone(), abs);
        node.push(Node::text(content, abs));
        parent.push(node);
        Some(end)
    }
}

/// Attribution text after a `--`, `---` or em-dash marker.
fn attribution_text(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("---")
        .filter(|r| !r.starts_with('-'))
        .or_else(|| line.strip_prefix("--").filter(|r| !r.starts_with('-')))
        .or_else(|| line.strip_prefix('\u{2014}'))?;
    let rest = rest.strip_prefix(' ')?;
    let trimmed = rest.trim_start();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Node, Vec<Diagnostic>) {
        crate::init_logger();
        let config = Config::default();
        let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
        let conversions = ConversionTable::default();
        let parser = BlockParser::new(&config, &namespace, &conversions);
        let mut diags = Vec::new();
        let doc = parser.parse(text, &mut diags);
        (doc, diags)
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let (doc, diags) = parse("one\ntwo\n\nthree\n");
        assert!(diags.is_empty());
        assert_eq!(doc.children.len(), 2);
        assert!(matches!(doc.children[0].kind, NodeKind::Paragraph));
        assert_eq!(doc.children[0].astext(), "one\ntwo");
        assert_eq!(doc.children[1].astext(), "three");
    }

    #[test]
    fn literal_block_after_double_colon() {
        let (doc, _) = parse("Code::\n\n    x = 1\n    y = 2\n\nafter\n");
        assert_eq!(doc.children.len(), 3);
        assert_eq!(doc.children[0].astext(), "Code:");
        match &doc.children[1].kind {
            NodeKind::LiteralBlock { .. } => {
                assert_eq!(doc.children[1].astext(), "x = 1\ny = 2");
            }
            other => panic!("expected literal block, got {other:?}"),
        }
    }

    #[test]
    fn bare_double_colon_leaves_no_paragraph() {
        let (doc, _) = parse("::\n\n    literal\n");
        assert_eq!(doc.children.len(), 1);
        assert!(matches!(doc.children[0].kind, NodeKind::LiteralBlock { .. }));
    }

    #[test]
    fn spaced_double_colon_is_dropped() {
        let (doc, _) = parse("Code ::\n\n    x\n");
        assert_eq!(doc.children[0].astext(), "Code");
    }

    #[test]
    fn block_quote_with_attribution() {
        let (doc, _) = parse("quote me\n\n    wise words\n\n    -- someone\n");
        let quote = &doc.children[1];
        assert!(matches!(quote.kind, NodeKind::BlockQuote));
        assert_eq!(quote.children.len(), 2);
        assert!(matches!(quote.children[0].kind, NodeKind::Paragraph));
        assert!(matches!(quote.children[1].kind, NodeKind::Attribution));
        assert_eq!(quote.children[1].astext(), "someone");
    }

    #[test]
    fn doctest_block() {
        let (doc, _) = parse(">>> 1 + 1\n2\n\nafter\n");
        assert!(matches!(doc.children[0].kind, NodeKind::LiteralBlock { .. }));
        assert_eq!(doc.children[0].astext(), ">>> 1 + 1\n2");
    }

    #[test]
    fn transition_line() {
        let (doc, _) = parse("before\n\n----\n\nafter\n");
        assert!(matches!(doc.children[1].kind, NodeKind::Transition));
    }

    #[test]
    fn sections_nest_by_adornment_style() {
        let (doc, _) = parse(
            "Top\n===\n\nintro\n\nSub\n---\n\nbody\n\nOther\n=====\n\ntail\n",
        );
        assert_eq!(doc.children.len(), 2);
        let top = &doc.children[0];
        assert!(matches!(&top.kind, NodeKind::Section { names } if names == &["top".to_string()]));
        assert!(matches!(top.children[0].kind, NodeKind::Title { level: 1 }));
        // intro paragraph then nested subsection
        assert!(matches!(top.children[1].kind, NodeKind::Paragraph));
        let sub = &top.children[2];
        assert!(matches!(sub.kind, NodeKind::Section { .. }));
        assert!(matches!(sub.children[0].kind, NodeKind::Title { level: 2 }));
        let other = &doc.children[1];
        assert!(matches!(other.children[0].kind, NodeKind::Title { level: 1 }));
    }

    #[test]
    fn overline_title() {
        let (doc, _) = parse("#####\nTitle\n#####\n\nbody\n");
        let section = &doc.children[0];
        assert!(matches!(section.kind, NodeKind::Section { .. }));
        assert_eq!(section.children[0].astext(), "Title");
    }

    #[test]
    fn tab_expansion() {
        assert_eq!(expand_tabs("\tx"), "        x");
        assert_eq!(expand_tabs("ab\tx"), "ab      x");
    }

    #[test]
    fn attribution_markers() {
        assert_eq!(attribution_text("-- Author"), Some("Author"));
        assert_eq!(attribution_text("--- Author"), Some("Author"));
        assert_eq!(attribution_text("\u{2014} Author"), Some("Author"));
        assert_eq!(attribution_text("---- nope"), None);
        assert_eq!(attribution_text("plain"), None);
    }
}
