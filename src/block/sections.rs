//! Section titles and transitions.
//!
//! Adornment styles are recorded in order of first appearance; a style's
//! position determines its heading level for the rest of the document.

use log::debug;

use crate::error::Diagnostic;
use crate::nodes::{fully_normalize_name, Node, NodeKind};

use super::{is_adornment, is_blank, BlockLine, BlockParser, Ctx};

pub(crate) enum SectionOutcome {
    /// A section at or above the current nesting level starts at this index;
    /// the enclosing call must close and resume there.
    Stop(usize),
    Consumed(usize),
}

impl BlockParser<'_> {
    /// `=====` / `Title` / `=====` form.
    pub(crate) fn try_parse_overline_title(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        level: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<SectionOutcome> {
        let ch = is_adornment(&lines[i].text)?;
        if i + 2 >= lines.len()
            || is_blank(&lines[i + 1].text)
            || is_adornment(&lines[i + 1].text).is_some()
            || is_adornment(&lines[i + 2].text) != Some(ch)
        {
            return None;
        }
        let title_text = lines[i + 1].text.trim().to_string();
        if lines[i].text.chars().count() < title_text.chars().count() {
            diags.push(Diagnostic::warning(
                format!("Title overline too short: {:?}.", title_text),
                lines[i].abs,
            ));
        }
        Some(self.make_section(lines, i, i + 3, title_text, (ch, true), parent, level, ctx, diags))
    }

    /// `Title` / `=====` form. The caller has checked that `lines[i]` is
    /// ordinary unindented text and that a next line exists.
    pub(crate) fn try_parse_underline_title(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        level: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<SectionOutcome> {
        let ch = is_adornment(&lines[i + 1].text)?;
        let title_text = lines[i].text.trim_end().to_string();
        let under_len = lines[i + 1].text.chars().count();
        if under_len < title_text.chars().count() {
            if under_len < 4 {
                // too short to be an underline; leave it to the paragraph
                return None;
            }
            diags.push(Diagnostic::warning(
                format!("Title underline too short: {:?}.", title_text),
                lines[i + 1].abs,
            ));
        }
        Some(self.make_section(lines, i, i + 2, title_text, (ch, false), parent, level, ctx, diags))
    }

    #[allow(clippy::too_many_arguments)]
    fn make_section(
        &self,
        lines: &[BlockLine],
        i: usize,
        body_start: usize,
        title_text: String,
        style: (char, bool),
        parent: &mut Node,
        level: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> SectionOutcome {
        let title_level = match ctx.styles.iter().position(|s| *s == style) {
            Some(pos) => pos + 1,
            None => {
                ctx.styles.push(style);
                ctx.styles.len()
            }
        };
        if title_level <= level {
            return SectionOutcome::Stop(i);
        }
        if title_level > level + 1 {
            diags.push(Diagnostic::warning(
                format!(
                    "Title level inconsistent: jumped to level {title_level} from level {level}."
                ),
                lines[i].abs,
            ));
        }
        let abs = lines[i].abs;
        debug!("section {title_text:?} level {title_level} at line {abs}");
        let mut section = Node::new(
            NodeKind::Section {
                names: vec![fully_normalize_name(&title_text)],
            },
            abs,
        );
        let mut title = Node::with_raw(NodeKind::Title { level: title_level }, &title_text, abs);
        title.children = self.inline_children(&title_text, abs, diags);
        section.push(title);
        let stopped = self.parse_blocks(&lines[body_start..], &mut section, title_level, true, ctx, diags);
        parent.push(section);
        SectionOutcome::Consumed(body_start + stopped)
    }

    /// A lone adornment line of four or more characters followed by a blank
    /// line or the end of input.
    pub(crate) fn try_parse_transition(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
    ) -> Option<usize> {
        is_adornment(&lines[i].text)?;
        if lines[i].text.chars().count() < 4 {
            return None;
        }
        if i + 1 < lines.len() && !is_blank(&lines[i + 1].text) {
            return None;
        }
        parent.push(Node::with_raw(NodeKind::Transition, &lines[i].text, lines[i].abs));
        Some(i + 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::namespace::{ConversionTable, Namespace};
    use crate::nodes::NodeKind;

    use super::super::BlockParser;

    fn parse(text: &str) -> crate::nodes::Node {
        crate::init_logger();
        let config = Config::default();
        let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
        let conversions = ConversionTable::default();
        let parser = BlockParser::new(&config, &namespace, &conversions);
        let mut diags = Vec::new();
        parser.parse(text, &mut diags)
    }

    #[test]
    fn short_underline_is_not_a_title() {
        let doc = parse("A long paragraph line\n--\nmore text\n");
        assert_eq!(doc.children.len(), 1);
        assert!(matches!(doc.children[0].kind, NodeKind::Paragraph));
    }

    #[test]
    fn same_style_reuses_level() {
        let doc = parse("One\n===\n\nTwo\n===\n");
        assert_eq!(doc.children.len(), 2);
        for section in &doc.children {
            assert!(matches!(section.children[0].kind, NodeKind::Title { level: 1 }));
        }
    }

    #[test]
    fn transition_requires_four_chars() {
        let doc = parse("a\n\n---\n\nb\n");
        assert!(!doc
            .children
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Transition)));
    }
}
