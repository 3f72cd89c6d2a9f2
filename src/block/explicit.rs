//! Explicit markup blocks: footnotes, citations, hyperlink targets,
//! directives, substitution definitions and comments.
//!
//! A directive whose type is unknown, whose conversion strategy is the
//! verbatim fallback, or whose block fails to parse is kept as a
//! [`NodeKind::VerbatimBlock`] carrying its raw text.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::error::Diagnostic;
use crate::inline::patterns::SIMPLENAME;
use crate::inline::{escape2null, unescape};
use crate::namespace::{ConversionStrategy, DirectiveSpec};
use crate::nodes::{
    fully_normalize_name, whitespace_normalize_name, AutoLabel, Node, NodeKind,
};

use super::lists::FIELD_MARKER;
use super::{get_indented, indent_of, is_blank, BlockLine, BlockParser, Ctx};

static FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\.\. +\[(?P<label>[0-9]+|\#(?:{SIMPLENAME})?|\*)\](?: +|$)"
    ))
    .expect("footnote marker")
});

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\.\. +\[(?P<label>{SIMPLENAME})\](?: +|$)")).expect("citation marker")
});

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\.\. +(?P<name>{SIMPLENAME}) ?::(?: +(?P<first>.*))?$"
    ))
    .expect("directive marker")
});

static SUBSTITUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.\. +\|(?P<name>[^| ](?:[^|]*[^| ])?)\|(?: +(?P<rest>.*))?$")
        .expect("substitution marker")
});

/// Embedded directive on the first content line of a substitution
/// definition.
static EMBEDDED_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<name>{SIMPLENAME})::(?: +(?P<first>.*))?$"))
        .expect("embedded directive")
});

static ANON_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^__(?: +(?P<link>.*))?$").expect("anonymous target"));

impl BlockParser<'_> {
    pub(crate) fn try_parse_explicit(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        let text = lines[i].text.clone();
        let abs = lines[i].abs;

        if let Some(caps) = ANON_TARGET.captures(&text) {
            let link = caps
                .name("link")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            parent.push(make_target(None, true, &link, &text, abs, diags));
            return Some(i + 1);
        }
        if text != ".." && !text.starts_with(".. ") {
            return None;
        }

        let (indented, next) = get_indented(lines, i + 1);
        let raw_end = lines[i..next]
            .iter()
            .rposition(|l| !is_blank(&l.text))
            .map(|p| i + p + 1)
            .unwrap_or(i + 1);
        let raw = lines[i..raw_end]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(caps) = FOOTNOTE.captures(&text) {
            let rest = &text[caps.get(0).map(|m| m.end()).unwrap_or(text.len())..];
            let node = self.footnote(&caps["label"], rest, &indented, &raw, abs, ctx, diags);
            parent.push(node);
            return Some(next);
        }
        if let Some(caps) = CITATION.captures(&text) {
            let rest = &text[caps.get(0).map(|m| m.end()).unwrap_or(text.len())..];
            let node = self.citation(&caps["label"], rest, &indented, &raw, abs, ctx, diags);
            parent.push(node);
            return Some(next);
        }
        if text.starts_with(".. _") {
            let node = self.hyperlink_target(&text[4..], &indented, &raw, abs, diags);
            parent.push(node);
            return Some(next);
        }
        if SUBSTITUTION.is_match(&text) || text.starts_with(".. |") {
            let node = self.substitution_definition(&text, &indented, &raw, abs, ctx, diags);
            parent.push(node);
            return Some(next);
        }
        if let Some(caps) = DIRECTIVE.captures(&text) {
            let first = caps.name("first").map(|m| m.as_str());
            let node =
                self.parse_directive(&caps["name"], first, &indented, &raw, abs, ctx, diags);
            parent.push(node);
            return Some(next);
        }

        // anything else is a comment
        let mut content_lines: Vec<&str> = Vec::new();
        if let Some(rest) = text.strip_prefix(".. ")
            && !rest.trim().is_empty()
        {
            content_lines.push(rest);
        }
        content_lines.extend(indented.iter().map(|l| l.text.as_str()));
        let content = content_lines.join("\n");
        debug!("comment at line {abs}");
        let mut comment = Node::with_raw(NodeKind::Comment, &raw, abs);
        if !content.is_empty() {
            comment.push(Node::text(content, abs));
        }
        parent.push(comment);
        Some(next)
    }

    #[allow(clippy::too_many_arguments)]
    fn footnote(
        &self,
        label: &str,
        rest: &str,
        indented: &[BlockLine],
        raw: &str,
        abs: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        let (names, auto) = match label {
            "*" => (Vec::new(), Some(AutoLabel::Symbol)),
            "#" => (Vec::new(), Some(AutoLabel::Number)),
            l if l.starts_with('#') => {
                (vec![fully_normalize_name(&l[1..])], Some(AutoLabel::Number))
            }
            l => (vec![l.to_string()], None),
        };
        debug!("footnote {label:?} at line {abs}");
        let mut node = Node::with_raw(
            NodeKind::Footnote {
                names: names.clone(),
                ids: names,
                auto,
            },
            raw,
            abs,
        );
        let mut label_node = Node::new(NodeKind::Label, abs);
        label_node.push(Node::text(label, abs));
        node.push(label_node);
        let content = content_block(rest, indented, abs);
        self.parse_blocks(&content, &mut node, 0, false, ctx, diags);
        node
    }

    #[allow(clippy::too_many_arguments)]
    fn citation(
        &self,
        label: &str,
        rest: &str,
        indented: &[BlockLine],
        raw: &str,
        abs: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        debug!("citation {label:?} at line {abs}");
        let mut node = Node::with_raw(
            NodeKind::Citation {
                names: vec![fully_normalize_name(label)],
            },
            raw,
            abs,
        );
        let mut label_node = Node::new(NodeKind::Label, abs);
        label_node.push(Node::text(label, abs));
        node.push(label_node);
        let content = content_block(rest, indented, abs);
        self.parse_blocks(&content, &mut node, 0, false, ctx, diags);
        node
    }

    /// `.. _name: link` and its phrase, anonymous and indirect variants.
    fn hyperlink_target(
        &self,
        rest: &str,
        indented: &[BlockLine],
        raw: &str,
        abs: usize,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        let (name, anonymous, link_start) = if let Some(after) = rest.strip_prefix("_:") {
            (None, true, after)
        } else if let Some(inner) = rest.strip_prefix('`') {
            match inner.find("`:") {
                Some(pos) => (Some(inner[..pos].to_string()), false, &inner[pos + 2..]),
                None => (Some(inner.to_string()), false, ""),
            }
        } else {
            match find_unescaped_colon(rest) {
                Some(pos) => (Some(rest[..pos].to_string()), false, &rest[pos + 1..]),
                None => (Some(rest.to_string()), false, ""),
            }
        };
        let mut link = link_start.trim().to_string();
        for line in indented {
            link.push_str(line.text.trim());
        }
        make_target(name, anonymous, &link, raw, abs, diags)
    }

    /// `.. |name| directive:: ...`
    #[allow(clippy::too_many_arguments)]
    fn substitution_definition(
        &self,
        marker_line: &str,
        indented: &[BlockLine],
        raw: &str,
        abs: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        // the |name| part may span lines; join until the marker matches
        let mut joined = marker_line.to_string();
        let mut consumed = 0usize;
        let caps = loop {
            if let Some(caps) = SUBSTITUTION.captures(&joined) {
                break Some(caps);
            }
            if consumed >= indented.len() {
                break None;
            }
            joined = format!("{} {}", joined.trim_end(), indented[consumed].text.trim());
            consumed += 1;
        };
        let Some(caps) = caps else {
            diags.push(Diagnostic::markup_error(
                "malformed substitution definition.",
                abs,
            ));
            let mut comment = Node::with_raw(NodeKind::Comment, raw, abs);
            comment.push(Node::text(raw.trim_start_matches(". ").trim(), abs));
            return comment;
        };
        let name = caps["name"].to_string();
        let rest = caps
            .name("rest")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let remaining = &indented[consumed..];
        if rest.trim().is_empty() && remaining.iter().all(|l| is_blank(&l.text)) {
            diags.push(Diagnostic::markup_error(
                format!("Substitution definition {name:?} missing contents."),
                abs,
            ));
            return Node::with_raw(NodeKind::Comment, raw, abs);
        }

        let (dir_name, dir_first, dir_following) = if let Some(dcaps) =
            EMBEDDED_DIRECTIVE.captures(rest.trim_end())
        {
            let first = dcaps.name("first").map(|m| m.as_str().to_string());
            (dcaps["name"].to_string(), first, remaining.to_vec())
        } else if let Some(first_line) = remaining.first()
            && rest.trim().is_empty()
            && let Some(dcaps) = EMBEDDED_DIRECTIVE.captures(first_line.text.trim_end())
        {
            let first = dcaps.name("first").map(|m| m.as_str().to_string());
            (dcaps["name"].to_string(), first, remaining[1..].to_vec())
        } else {
            diags.push(Diagnostic::markup_error(
                format!("Substitution definition {name:?} must contain a directive."),
                abs,
            ));
            let mut comment = Node::with_raw(NodeKind::Comment, raw, abs);
            comment.push(Node::text(rest, abs));
            return comment;
        };

        debug!("substitution definition {name:?} ({dir_name}) at line {abs}");
        let mut node = Node::with_raw(
            NodeKind::SubstitutionDef {
                names: vec![whitespace_normalize_name(&name)],
            },
            raw,
            abs,
        );
        let directive = self.parse_directive(
            &dir_name,
            dir_first.as_deref(),
            &dir_following,
            raw,
            abs,
            ctx,
            diags,
        );
        node.push(directive);
        node
    }

    /// Capture a directive per its registered argument/content shape and
    /// conversion strategy.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn parse_directive(
        &self,
        name: &str,
        first_rest: Option<&str>,
        following: &[BlockLine],
        raw: &str,
        abs: usize,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        let type_name = name.to_lowercase();
        let Some(spec) = self.namespace.directive(&type_name) else {
            debug!("unknown directive {type_name:?} at line {abs}, keeping verbatim");
            return verbatim_block(&type_name, raw, abs);
        };
        let strategy = self.conversions.strategy(&spec.implementation);
        if matches!(strategy, ConversionStrategy::VerbatimFallback) {
            debug!("directive {type_name:?} at line {abs} kept verbatim by strategy");
            return verbatim_block(&type_name, raw, abs);
        }

        let mut indented: Vec<BlockLine> = Vec::new();
        if let Some(first) = first_rest
            && !first.trim().is_empty()
        {
            indented.push(BlockLine {
                text: first.trim_end().to_string(),
                abs,
            });
        }
        indented.extend(following.iter().cloned());

        let (arg_block, options, content) = match split_directive_block(indented, spec) {
            Ok(parts) => parts,
            Err(message) => {
                diags.push(Diagnostic::markup_error(
                    format!("Error in {type_name:?} directive: {message}"),
                    abs,
                ));
                return verbatim_block(&type_name, raw, abs);
            }
        };

        debug!("directive {type_name:?} at line {abs} ({strategy:?})");
        let mut node = Node::with_raw(
            NodeKind::Directive {
                name: type_name.clone(),
                implementation: Some(spec.implementation.clone()),
                strategy,
                options,
                fence: 3,
            },
            raw,
            abs,
        );
        if spec.max_arguments() > 0 {
            let arg_text = arg_block
                .iter()
                .map(|l| l.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let mut arg = Node::new(NodeKind::DirectiveArgument, abs);
            if matches!(
                strategy,
                ConversionStrategy::ParseArgument | ConversionStrategy::ParseAll
            ) {
                if !arg_text.is_empty() {
                    arg.children = self.inline_children(&arg_text, abs, diags);
                }
            } else if !arg_text.is_empty() {
                arg.push(Node::text(arg_text, abs));
            }
            node.push(arg);
        }
        if spec.has_content {
            let content_abs = content.first().map(|l| l.abs).unwrap_or(abs);
            let mut body = Node::new(NodeKind::DirectiveContent, content_abs);
            match strategy {
                ConversionStrategy::ParseContent
                | ConversionStrategy::ParseContentAndTitles
                | ConversionStrategy::ParseAll => {
                    let titles = matches!(strategy, ConversionStrategy::ParseContentAndTitles);
                    self.parse_blocks(&content, &mut body, 0, titles, ctx, diags);
                }
                _ => {
                    let text = content
                        .iter()
                        .map(|l| l.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !text.is_empty() {
                        body.push(Node::text(text, content_abs));
                    }
                }
            }
            node.push(body);
        }
        node
    }
}

fn content_block(rest: &str, indented: &[BlockLine], abs: usize) -> Vec<BlockLine> {
    let mut block = Vec::new();
    let rest = rest.trim_end();
    if !rest.is_empty() {
        block.push(BlockLine {
            text: rest.to_string(),
            abs,
        });
    }
    block.extend(indented.iter().cloned());
    block
}

/// First `:` not preceded by a backslash.
fn find_unescaped_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b':' => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

/// Classify a target's link as internal, indirect (`name_`) or a URI.
fn make_target(
    name: Option<String>,
    anonymous: bool,
    link: &str,
    raw: &str,
    abs: usize,
    _diags: &mut [Diagnostic],
) -> Node {
    let names = name
        .map(|n| vec![fully_normalize_name(&n)])
        .unwrap_or_default();
    let kind = if link.is_empty() {
        NodeKind::Target {
            names,
            refname: None,
            refuri: None,
            refid: None,
            anonymous,
            inline: false,
        }
    } else if link.ends_with('_') && !link.ends_with("\\_") {
        let inner = link[..link.len() - 1]
            .trim_matches('`')
            .to_string();
        NodeKind::Target {
            names,
            refname: Some(fully_normalize_name(&inner)),
            refuri: None,
            refid: None,
            anonymous,
            inline: false,
        }
    } else {
        let nulled = escape2null(link);
        let squeezed: String = nulled.split_whitespace().collect::<Vec<_>>().concat();
        NodeKind::Target {
            names,
            refname: None,
            refuri: Some(unescape(&squeezed, false)),
            refid: None,
            anonymous,
            inline: false,
        }
    };
    debug!("target at line {abs}: {kind:?}");
    Node::with_raw(kind, raw, abs)
}

/// Split a dedented directive block into argument lines, options and
/// content, mirroring the argument-then-options-then-content layout.
#[allow(clippy::type_complexity)]
fn split_directive_block(
    mut indented: Vec<BlockLine>,
    spec: &DirectiveSpec,
) -> Result<(Vec<BlockLine>, Vec<(String, Option<String>)>, Vec<BlockLine>), String> {
    if indented.first().is_some_and(|l| is_blank(&l.text)) {
        indented.remove(0);
    }
    while indented.last().is_some_and(|l| is_blank(&l.text)) {
        indented.pop();
    }
    let split = indented
        .iter()
        .position(|l| is_blank(&l.text))
        .unwrap_or(indented.len());
    let mut arg_block: Vec<BlockLine> = indented[..split].to_vec();
    let mut content: Vec<BlockLine> = indented[split..].to_vec();

    let (options, rest) = parse_option_block(&arg_block)?;
    arg_block = rest;

    if !arg_block.is_empty() && spec.max_arguments() == 0 {
        // arguments not allowed: the leading lines are content
        arg_block.extend(content);
        content = std::mem::take(&mut arg_block);
    }
    while content.first().is_some_and(|l| is_blank(&l.text)) {
        content.remove(0);
    }
    Ok((arg_block, options, content))
}

/// Parse `:name: value` option fields from the tail of the argument block.
#[allow(clippy::type_complexity)]
fn parse_option_block(
    arg_block: &[BlockLine],
) -> Result<(Vec<(String, Option<String>)>, Vec<BlockLine>), String> {
    let Some(idx) = arg_block
        .iter()
        .position(|l| FIELD_MARKER.is_match(&l.text))
    else {
        return Ok((Vec::new(), arg_block.to_vec()));
    };
    let args = arg_block[..idx].to_vec();
    let mut options = Vec::new();
    let mut k = idx;
    while k < arg_block.len() {
        let line = &arg_block[k];
        let Some(caps) = FIELD_MARKER.captures(&line.text) else {
            return Err("invalid option block".to_string());
        };
        let name = caps["name"].trim().to_string();
        if name.split_whitespace().count() > 1 {
            return Err(format!("invalid option name {name:?}"));
        }
        let mut parts: Vec<String> = Vec::new();
        if let Some(rest) = caps.name("rest") {
            let trimmed = rest.as_str().trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        k += 1;
        while k < arg_block.len() && indent_of(&arg_block[k].text) > 0 {
            parts.push(arg_block[k].text.trim().to_string());
            k += 1;
        }
        let value = if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        };
        options.push((name, value));
    }
    Ok((options, args))
}

/// Keep a directive as verbatim reStructuredText.
pub(crate) fn verbatim_block(name: &str, raw: &str, abs: usize) -> Node {
    let raw = if raw.starts_with("..") {
        raw.to_string()
    } else {
        format!(".. {raw}")
    };
    Node::with_raw(NodeKind::VerbatimBlock { name: name.to_string() }, raw, abs)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::namespace::{ConversionTable, Namespace};
    use crate::nodes::{AutoLabel, Node, NodeKind};

    use super::super::BlockParser;

    fn parse(text: &str) -> (Node, Vec<crate::error::Diagnostic>) {
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
    fn numbered_footnote() {
        let (doc, _) = parse(".. [1] The footnote text.\n");
        let footnote = &doc.children[0];
        match &footnote.kind {
            NodeKind::Footnote { names, auto, .. } => {
                assert_eq!(names, &["1".to_string()]);
                assert!(auto.is_none());
            }
            other => panic!("expected footnote, got {other:?}"),
        }
        assert!(matches!(footnote.children[0].kind, NodeKind::Label));
        assert!(matches!(footnote.children[1].kind, NodeKind::Paragraph));
    }

    #[test]
    fn auto_numbered_named_footnote() {
        let (doc, _) = parse(".. [#note] Auto numbered.\n");
        match &doc.children[0].kind {
            NodeKind::Footnote { names, auto, .. } => {
                assert_eq!(names, &["note".to_string()]);
                assert_eq!(*auto, Some(AutoLabel::Number));
            }
            other => panic!("expected footnote, got {other:?}"),
        }
    }

    #[test]
    fn citation() {
        let (doc, _) = parse(".. [CIT2002] A citation.\n");
        match &doc.children[0].kind {
            NodeKind::Citation { names } => assert_eq!(names, &["cit2002".to_string()]),
            other => panic!("expected citation, got {other:?}"),
        }
    }

    #[test]
    fn external_target() {
        let (doc, _) = parse(".. _docs: https://example.com/a%20b\n");
        match &doc.children[0].kind {
            NodeKind::Target { names, refuri, .. } => {
                assert_eq!(names, &["docs".to_string()]);
                assert_eq!(refuri.as_deref(), Some("https://example.com/a%20b"));
            }
            other => panic!("expected target, got {other:?}"),
        }
    }

    #[test]
    fn multiline_target_uri_joined() {
        let (doc, _) = parse(".. _long: https://example.com/\n   very/long/path\n");
        match &doc.children[0].kind {
            NodeKind::Target { refuri, .. } => {
                assert_eq!(refuri.as_deref(), Some("https://example.com/very/long/path"));
            }
            other => panic!("expected target, got {other:?}"),
        }
    }

    #[test]
    fn internal_and_indirect_targets() {
        let (doc, _) = parse(".. _here:\n\n.. _alias: here_\n");
        match &doc.children[0].kind {
            NodeKind::Target { names, refuri, refname, .. } => {
                assert_eq!(names, &["here".to_string()]);
                assert!(refuri.is_none() && refname.is_none());
            }
            other => panic!("expected target, got {other:?}"),
        }
        match &doc.children[1].kind {
            NodeKind::Target { refname, .. } => {
                assert_eq!(refname.as_deref(), Some("here"));
            }
            other => panic!("expected target, got {other:?}"),
        }
    }

    #[test]
    fn anonymous_targets() {
        let (doc, _) = parse("__ https://example.com\n\n.. __: https://example.org\n");
        for target in &doc.children {
            match &target.kind {
                NodeKind::Target { anonymous, refuri, .. } => {
                    assert!(*anonymous);
                    assert!(refuri.is_some());
                }
                other => panic!("expected target, got {other:?}"),
            }
        }
    }

    #[test]
    fn comment_block() {
        let (doc, _) = parse(".. just a comment\n   with a second line\n");
        let comment = &doc.children[0];
        assert!(matches!(comment.kind, NodeKind::Comment));
        assert_eq!(comment.astext(), "just a comment\nwith a second line");
    }

    #[test]
    fn known_directive_with_options_and_content() {
        let (doc, diags) = parse(
            ".. note:: The argument\n   :class: tip\n\n   Body text here.\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let directive = &doc.children[0];
        match &directive.kind {
            NodeKind::Directive { name, options, .. } => {
                assert_eq!(name, "note");
                assert_eq!(options, &[("class".to_string(), Some("tip".to_string()))]);
            }
            other => panic!("expected directive, got {other:?}"),
        }
        // admonitions take no argument; the marker-line text is content
        let content = &directive.children[0];
        assert!(matches!(content.kind, NodeKind::DirectiveContent));
        assert_eq!(content.children.len(), 2);
        assert_eq!(content.children[0].astext(), "The argument");
        assert_eq!(content.children[1].astext(), "Body text here.");
    }

    #[test]
    fn unknown_directive_kept_verbatim() {
        let (doc, _) = parse(".. bogusdirective:: arg\n   content\n");
        match &doc.children[0].kind {
            NodeKind::VerbatimBlock { name } => assert_eq!(name, "bogusdirective"),
            other => panic!("expected verbatim block, got {other:?}"),
        }
        assert!(doc.children[0].raw.starts_with(".. bogusdirective::"));
    }

    #[test]
    fn code_directive_keeps_content_unparsed() {
        let (doc, _) = parse(".. code:: python\n\n   x = 1\n");
        let directive = &doc.children[0];
        let content = directive.children.last().unwrap();
        assert!(matches!(content.kind, NodeKind::DirectiveContent));
        assert_eq!(content.astext(), "x = 1");
    }

    #[test]
    fn invalid_option_block_falls_back() {
        let (doc, diags) = parse(".. image:: pic.png\n   :width: 10\n   not an option\n");
        assert!(matches!(doc.children[0].kind, NodeKind::VerbatimBlock { .. }));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn substitution_with_replace() {
        let (doc, diags) = parse(".. |name| replace:: substitution text\n");
        assert!(diags.is_empty(), "{diags:?}");
        let def = &doc.children[0];
        match &def.kind {
            NodeKind::SubstitutionDef { names } => assert_eq!(names, &["name".to_string()]),
            other => panic!("expected substitution def, got {other:?}"),
        }
        match &def.children[0].kind {
            NodeKind::Directive { name, .. } => assert_eq!(name, "replace"),
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn substitution_missing_contents() {
        let (doc, diags) = parse(".. |empty|\n");
        assert!(matches!(doc.children[0].kind, NodeKind::Comment));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("missing contents"));
    }
}
