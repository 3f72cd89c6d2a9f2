//! Lowering from the typed tree to a markdown-it style token stream.
//!
//! Targets with a URI never emit tokens: they only populate the
//! [`Environment`], whose reference definitions the serializer appends
//! after the body. Named targets without a URI become `myst_target`
//! tokens. A reference node must resolve in exactly one way; anything
//! else is a contract violation surfaced as [`ConvertError::AmbiguousNode`].

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use log::{debug, trace};

use crate::config::Config;
use crate::error::{ConvertError, Diagnostic};
use crate::namespace::{ConversionStrategy, Namespace};
use crate::nodes::{Node, NodeKind};
use crate::tokens::Token;

/// MyST parser extensions the output depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Extension {
    ColonFence,
    Deflist,
    DollarMath,
    FrontMatter,
    Substitution,
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Extension::ColonFence => "colon_fence",
            Extension::Deflist => "deflist",
            Extension::DollarMath => "dollarmath",
            Extension::FrontMatter => "front_matter",
            Extension::Substitution => "substitution",
        };
        f.write_str(name)
    }
}

/// One reference definition destined for the output's link section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDefinition {
    pub name: String,
    pub uri: String,
    /// 1-based source line of the defining target.
    pub line: usize,
}

/// Link definitions collected while lowering. The first definition of a
/// name wins; later ones are kept aside for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub references: Vec<LinkDefinition>,
    pub duplicate_refs: Vec<LinkDefinition>,
}

impl Environment {
    /// Returns false when `name` was already defined.
    fn add_reference(&mut self, name: &str, uri: &str, line: usize) -> bool {
        let def = LinkDefinition {
            name: name.to_string(),
            uri: uri.to_string(),
            line,
        };
        if self.references.iter().any(|d| d.name == name) {
            self.duplicate_refs.push(def);
            false
        } else {
            self.references.push(def);
            true
        }
    }
}

/// Extensions required to parse a token stream, derived from the emitted
/// tokens only.
pub fn required_extensions(tokens: &[Token]) -> BTreeSet<Extension> {
    let mut out = BTreeSet::new();
    scan_extensions(tokens, &mut out);
    out
}

fn scan_extensions(tokens: &[Token], out: &mut BTreeSet<Extension>) {
    for token in tokens {
        match token.ttype {
            "front_matter_tokens" => {
                out.insert(Extension::FrontMatter);
                if let Some(entries) = &token.children
                    && entries
                        .iter()
                        .any(|e| e.meta.key_path.first().is_some_and(|k| k == "substitutions"))
                {
                    out.insert(Extension::Substitution);
                }
            }
            "directive" if token.markup.contains(':') => {
                out.insert(Extension::ColonFence);
            }
            "dl_open" => {
                out.insert(Extension::Deflist);
            }
            "math_block" | "math_inline" => {
                out.insert(Extension::DollarMath);
            }
            "substitution_inline" => {
                out.insert(Extension::Substitution);
            }
            _ => {}
        }
        if let Some(children) = &token.children {
            scan_extensions(children, out);
        }
    }
}

pub fn lower(
    document: &Node,
    config: &Config,
    namespace: &Namespace,
    diags: &mut Vec<Diagnostic>,
) -> Result<(Vec<Token>, Environment), ConvertError> {
    let mut lowering = Lowering {
        config,
        namespace,
        env: Environment::default(),
        tight: 0,
        diags,
    };
    let mut tokens = Vec::new();

    let mut entries: Vec<Token> = Vec::new();
    let mut front_matter: Vec<Node> = Vec::new();
    document.walk(&mut |node| {
        if matches!(node.kind, NodeKind::FrontMatter) {
            front_matter.push(node.clone());
        }
    });
    for block in &front_matter {
        for field in &block.children {
            if let Some(entry) = lowering.front_matter_entry(field)? {
                entries.push(entry);
            }
        }
    }
    let mut substitutions: Vec<Node> = Vec::new();
    document.walk(&mut |node| {
        if matches!(node.kind, NodeKind::SubstitutionDef { .. }) {
            substitutions.push(node.clone());
        }
    });
    for def in &substitutions {
        if let NodeKind::SubstitutionDef { names } = &def.kind
            && let Some(name) = names.first()
        {
            let mut body = Vec::new();
            lowering.blocks(&def.children, &mut body)?;
            let mut entry = Token::new("front_matter_entry", "", 0);
            entry.meta.key_path = vec!["substitutions".to_string(), name.clone()];
            entry.children = Some(body);
            entries.push(entry);
        }
    }
    if !entries.is_empty() {
        let mut front = Token::new("front_matter_tokens", "", 0);
        front.children = Some(entries);
        tokens.push(front);
    }

    for child in &document.children {
        if matches!(child.kind, NodeKind::FrontMatter) {
            continue;
        }
        lowering.block(child, &mut tokens)?;
    }
    debug!(
        "lowered {} top-level tokens, {} references",
        tokens.len(),
        lowering.env.references.len()
    );
    report_unresolved(document, lowering.diags);
    Ok((tokens, lowering.env))
}

/// Check every by-name reference against the names the document defines.
/// Misses still rendered a best-effort token; here they get reported.
fn report_unresolved(document: &Node, diags: &mut Vec<Diagnostic>) {
    let mut link_names: HashSet<String> = HashSet::new();
    let mut note_labels: HashSet<String> = HashSet::new();
    document.walk(&mut |node| match &node.kind {
        NodeKind::Target { names, .. } | NodeKind::Section { names } => {
            link_names.extend(names.iter().cloned());
        }
        NodeKind::Footnote { names, ids, .. } => {
            note_labels.extend(names.iter().cloned());
            note_labels.extend(ids.iter().cloned());
        }
        NodeKind::Citation { names } => {
            note_labels.extend(names.iter().cloned());
        }
        _ => {}
    });
    document.walk(&mut |node| match &node.kind {
        NodeKind::Reference {
            refname: Some(name),
            refuri: None,
            refid: None,
            ..
        } if !link_names.contains(name) => {
            diags.push(Diagnostic::unresolved(
                format!("no target found for reference {name:?}"),
                node.line,
            ));
        }
        NodeKind::FootnoteRef { refname, refid, .. } => {
            if let Some(label) = refname.as_ref().or(refid.as_ref())
                && !note_labels.contains(label)
            {
                diags.push(Diagnostic::unresolved(
                    format!("no footnote found for reference {label:?}"),
                    node.line,
                ));
            }
        }
        NodeKind::CitationRef { refname } if !note_labels.contains(refname) => {
            diags.push(Diagnostic::unresolved(
                format!("no citation found for reference {refname:?}"),
                node.line,
            ));
        }
        _ => {}
    });
}

struct Lowering<'a> {
    config: &'a Config,
    namespace: &'a Namespace,
    env: Environment,
    /// Depth of enclosing tight lists; paragraphs inside are hidden.
    tight: usize,
    diags: &'a mut Vec<Diagnostic>,
}

impl Lowering<'_> {
    fn blocks(&mut self, nodes: &[Node], out: &mut Vec<Token>) -> Result<(), ConvertError> {
        for node in nodes {
            self.block(node, out)?;
        }
        Ok(())
    }

    fn block(&mut self, node: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        trace!("lower block {:?}", std::mem::discriminant(&node.kind));
        match &node.kind {
            NodeKind::Document
            | NodeKind::Section { .. }
            | NodeKind::DefinitionItem
            | NodeKind::TGroup { .. } => self.blocks(&node.children, out)?,
            NodeKind::SubstitutionDef { .. } => {}
            NodeKind::Title { level } => {
                let level = (*level).min(6);
                let tag = heading_tag(level);
                let mut open = Token::new("heading_open", tag, 1);
                open.markup = "#".repeat(level);
                out.push(open);
                out.push(self.inline_token(&node.children)?);
                let mut close = Token::new("heading_close", tag, -1);
                close.markup = "#".repeat(level);
                out.push(close);
            }
            NodeKind::Paragraph => {
                let hidden = self.tight > 0;
                let mut open = Token::new("paragraph_open", "p", 1);
                open.hidden = hidden;
                out.push(open);
                out.push(self.inline_token(&node.children)?);
                let mut close = Token::new("paragraph_close", "p", -1);
                close.hidden = hidden;
                out.push(close);
            }
            NodeKind::LiteralBlock { language } => {
                let mut fence = Token::new("fence", "code", 0);
                fence.info = language.clone().unwrap_or_default();
                fence.content = ensure_final_newline(&node.astext());
                fence.markup = "```".to_string();
                out.push(fence);
            }
            NodeKind::BlockQuote => {
                let mut open = Token::new("blockquote_open", "blockquote", 1);
                open.markup = ">".to_string();
                out.push(open);
                self.blocks(&node.children, out)?;
                out.push(Token::new("blockquote_close", "blockquote", -1));
            }
            NodeKind::Attribution => {
                let hidden = self.tight > 0;
                let mut open = Token::new("paragraph_open", "p", 1);
                open.hidden = hidden;
                out.push(open);
                let mut inline = Token::inline();
                let mut list = vec![Token::with_content("text", "", "\u{2014} ")];
                for child in &node.children {
                    self.inline(child, &mut list)?;
                }
                inline.children = Some(list);
                out.push(inline);
                let mut close = Token::new("paragraph_close", "p", -1);
                close.hidden = hidden;
                out.push(close);
            }
            NodeKind::Transition => {
                let mut hr = Token::new("hr", "hr", 0);
                hr.markup = "---".to_string();
                out.push(hr);
            }
            NodeKind::BulletList { bullet, tight } => {
                let mut open = Token::new("bullet_list_open", "ul", 1);
                open.markup = bullet.to_string();
                out.push(open);
                if *tight {
                    self.tight += 1;
                }
                self.blocks(&node.children, out)?;
                if *tight {
                    self.tight -= 1;
                }
                out.push(Token::new("bullet_list_close", "ul", -1));
            }
            NodeKind::EnumeratedList { start, tight } => {
                let mut open = Token::new("ordered_list_open", "ol", 1);
                open.markup = ".".to_string();
                if let Some(n) = start {
                    open.set_attr("start", n.to_string());
                }
                out.push(open);
                if *tight {
                    self.tight += 1;
                }
                self.blocks(&node.children, out)?;
                if *tight {
                    self.tight -= 1;
                }
                out.push(Token::new("ordered_list_close", "ol", -1));
            }
            NodeKind::ListItem { prefix, .. } => {
                let mut open = Token::new("list_item_open", "li", 1);
                open.markup = prefix.clone().unwrap_or_else(|| "-".to_string());
                out.push(open);
                self.blocks(&node.children, out)?;
                out.push(Token::new("list_item_close", "li", -1));
            }
            NodeKind::DefinitionList => {
                out.push(Token::new("dl_open", "dl", 1));
                self.blocks(&node.children, out)?;
                out.push(Token::new("dl_close", "dl", -1));
            }
            NodeKind::Term { classifiers } => {
                out.push(Token::new("dt_open", "dt", 1));
                let mut inline = Token::inline();
                let mut list = Vec::new();
                for child in &node.children {
                    self.inline(child, &mut list)?;
                }
                for classifier in classifiers {
                    list.push(Token::with_content("text", "", format!(" : {classifier}")));
                }
                inline.children = Some(list);
                out.push(inline);
                out.push(Token::new("dt_close", "dt", -1));
            }
            NodeKind::Definition => {
                out.push(Token::new("dd_open", "dd", 1));
                self.blocks(&node.children, out)?;
                out.push(Token::new("dd_close", "dd", -1));
            }
            NodeKind::FieldList => {
                // field lists outside the document docinfo render as a
                // definition list with `:name:` terms
                out.push(Token::new("dl_open", "dl", 1));
                for field in &node.children {
                    self.field(field, out)?;
                }
                out.push(Token::new("dl_close", "dl", -1));
            }
            NodeKind::OptionList | NodeKind::LineBlock => {
                out.push(eval_rst(&node.raw));
            }
            NodeKind::VerbatimBlock { .. } => {
                out.push(eval_rst(&node.raw));
            }
            NodeKind::Comment => {
                let mut comment = Token::new("myst_line_comment", "hr", 0);
                comment.set_attr("class", "myst-line-comment");
                comment.content = indent_by_space(&node.astext());
                out.push(comment);
            }
            NodeKind::Table { malformed } => {
                if *malformed {
                    out.push(eval_rst(&node.raw));
                } else {
                    self.table(node, out)?;
                }
            }
            NodeKind::Footnote { names, ids, auto: _ } => {
                let label = names
                    .first()
                    .or(ids.first())
                    .cloned()
                    .unwrap_or_else(|| node.raw.clone());
                self.footnote(node, &label, out)?;
            }
            NodeKind::Citation { names } => {
                let label = format!(
                    "{}{}",
                    self.config.cite_prefix,
                    names.first().cloned().unwrap_or_default()
                );
                self.footnote(node, &label, out)?;
            }
            NodeKind::Target {
                names,
                refuri,
                refid,
                ..
            } => {
                if let Some(uri) = refuri {
                    for name in names {
                        if !self.env.add_reference(name, uri, node.line) {
                            self.diags.push(Diagnostic::warning(
                                format!("Duplicate target name {name:?}; keeping the first URI."),
                                node.line,
                            ));
                        }
                    }
                } else {
                    for name in names {
                        let mut target = Token::with_content("myst_target", "", name.clone());
                        target.set_attr("class", "myst-target");
                        out.push(target);
                    }
                    if let Some(id) = refid {
                        let mut target = Token::with_content("myst_target", "", id.clone());
                        target.set_attr("class", "myst-target");
                        out.push(target);
                    }
                }
            }
            NodeKind::Directive { .. } => self.directive(node, out)?,
            NodeKind::FrontMatter => {}
            _ => {
                // an inline node at block level: wrap it in a paragraph
                let mut open = Token::new("paragraph_open", "p", 1);
                open.hidden = self.tight > 0;
                out.push(open);
                out.push(self.inline_token(std::slice::from_ref(node))?);
                let mut close = Token::new("paragraph_close", "p", -1);
                close.hidden = self.tight > 0;
                out.push(close);
            }
        }
        Ok(())
    }

    fn field(&mut self, field: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        let name = field
            .children
            .iter()
            .find_map(|c| match &c.kind {
                NodeKind::FieldName { name } => Some(name.clone()),
                _ => None,
            })
            .unwrap_or_default();
        out.push(Token::new("dt_open", "dt", 1));
        let mut inline = Token::inline();
        inline.children = Some(vec![Token::with_content("text", "", format!(":{name}:"))]);
        out.push(inline);
        out.push(Token::new("dt_close", "dt", -1));
        out.push(Token::new("dd_open", "dd", 1));
        if let Some(body) = field
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::FieldBody))
        {
            self.blocks(&body.children, out)?;
        }
        out.push(Token::new("dd_close", "dd", -1));
        Ok(())
    }

    fn front_matter_entry(&mut self, field: &Node) -> Result<Option<Token>, ConvertError> {
        let Some(name) = field.children.iter().find_map(|c| match &c.kind {
            NodeKind::FieldName { name } => Some(name.clone()),
            _ => None,
        }) else {
            return Ok(None);
        };
        let mut entry = Token::new("front_matter_entry", "", 0);
        entry.meta.key_path = vec![name];
        let mut body_tokens = Vec::new();
        if let Some(body) = field
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::FieldBody))
        {
            self.blocks(&body.children, &mut body_tokens)?;
        }
        entry.children = Some(body_tokens);
        Ok(Some(entry))
    }

    fn footnote(&mut self, node: &Node, label: &str, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        out.push(Token::new("footnote_block_open", "", 1));
        let mut open = Token::new("footnote_open", "", 1);
        open.meta.label = Some(label.to_string());
        out.push(open);
        self.blocks(&node.children, out)?;
        out.push(Token::new("footnote_close", "", -1));
        out.push(Token::new("footnote_block_close", "", -1));
        Ok(())
    }

    fn table(&mut self, node: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        let Some(tgroup) = node.children.first() else {
            return Ok(());
        };
        let thead = tgroup
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::THead));
        let tbody = tgroup
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::TBody));
        let shape_ok = thead.is_some_and(|h| h.children.len() == 1)
            && tgroup.children.iter().all(|section| {
                section.children.iter().all(|row| {
                    row.children.iter().all(|entry| {
                        entry.children.is_empty()
                            || (entry.children.len() == 1
                                && matches!(entry.children[0].kind, NodeKind::Paragraph))
                    })
                })
            });
        if !shape_ok {
            self.diags.push(Diagnostic::warning(
                "Table cannot be converted to Markdown; keeping it verbatim.",
                node.line,
            ));
            out.push(eval_rst(&node.raw));
            return Ok(());
        }
        out.push(Token::new("table_open", "table", 1));
        if let Some(head) = thead {
            out.push(Token::new("thead_open", "thead", 1));
            for row in &head.children {
                self.table_row(row, "th", out)?;
            }
            out.push(Token::new("thead_close", "thead", -1));
        }
        if let Some(body) = tbody {
            out.push(Token::new("tbody_open", "tbody", 1));
            for row in &body.children {
                self.table_row(row, "td", out)?;
            }
            out.push(Token::new("tbody_close", "tbody", -1));
        }
        out.push(Token::new("table_close", "table", -1));
        Ok(())
    }

    fn table_row(
        &mut self,
        row: &Node,
        cell_tag: &'static str,
        out: &mut Vec<Token>,
    ) -> Result<(), ConvertError> {
        out.push(Token::new("tr_open", "tr", 1));
        for entry in &row.children {
            let (open_type, close_type) = if cell_tag == "th" {
                ("th_open", "th_close")
            } else {
                ("td_open", "td_close")
            };
            out.push(Token::new(open_type, cell_tag, 1));
            let inline_nodes: &[Node] = match entry.children.first() {
                Some(paragraph) => &paragraph.children,
                None => &[],
            };
            let mut inline = self.inline_token(inline_nodes)?;
            strip_newlines(&mut inline);
            out.push(inline);
            out.push(Token::new(close_type, cell_tag, -1));
        }
        out.push(Token::new("tr_close", "tr", -1));
        Ok(())
    }

    fn directive(&mut self, node: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        let NodeKind::Directive {
            name,
            implementation,
            strategy,
            options,
            fence,
        } = &node.kind
        else {
            return Ok(());
        };
        let module = implementation.clone().unwrap_or_default();
        let argument = node
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::DirectiveArgument));
        let content = node
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::DirectiveContent));

        if module == "body.MathBlock" && self.config.dollar_math && options.is_empty() {
            let mut parts = Vec::new();
            if let Some(arg) = argument {
                let text = arg.astext();
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            if let Some(body) = content {
                let text = body.astext();
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            out.push(Token::with_content("math_block", "math", parts.join("\n")));
            return Ok(());
        }
        if module == "body.CodeBlock" && options.is_empty() {
            let mut fence_token = Token::new("fence", "code", 0);
            fence_token.info = argument.map(|a| a.astext().trim().to_string()).unwrap_or_default();
            fence_token.content =
                ensure_final_newline(&content.map(|c| c.astext()).unwrap_or_default());
            fence_token.markup = "```".to_string();
            out.push(fence_token);
            return Ok(());
        }

        let mut token = Token::new("directive", "", 0);
        token.meta.name = Some(name.clone());
        token.meta.module = Some(module);
        token.meta.options = options.clone();
        token.set_attr("fence", fence.to_string());
        let parsed_content = matches!(
            strategy,
            ConversionStrategy::ParseContent
                | ConversionStrategy::ParseContentAndTitles
                | ConversionStrategy::ParseAll
        );
        let renders_fence = !matches!(
            token.meta.module.as_deref(),
            Some("misc.Replace") | Some("misc.Date")
        );
        if self.config.colon_fences && parsed_content && renders_fence {
            token.markup = ":".repeat((*fence).max(3));
        }
        let mut kids = Vec::new();
        if let Some(arg) = argument {
            let mut arg_token = Token::new("directive_arg", "", 0);
            let mut list = Vec::new();
            for child in &arg.children {
                self.inline(child, &mut list)?;
            }
            arg_token.children = Some(list);
            kids.push(arg_token);
        }
        if let Some(body) = content {
            let mut content_token = Token::new("directive_content", "", 0);
            let mut list = Vec::new();
            if body
                .children
                .iter()
                .all(|c| matches!(c.kind, NodeKind::Text { .. }))
            {
                let text = body.astext();
                if !text.is_empty() {
                    list.push(Token::with_content("text", "", text));
                }
            } else {
                self.blocks(&body.children, &mut list)?;
            }
            content_token.children = Some(list);
            kids.push(content_token);
        }
        token.children = Some(kids);
        out.push(token);
        Ok(())
    }

    fn inline_token(&mut self, nodes: &[Node]) -> Result<Token, ConvertError> {
        let mut token = Token::inline();
        let mut list = Vec::new();
        for node in nodes {
            self.inline(node, &mut list)?;
        }
        token.children = Some(list);
        Ok(token)
    }

    fn inline(&mut self, node: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        match &node.kind {
            NodeKind::Text { text } => {
                out.push(Token::with_content("text", "", text.clone()));
            }
            NodeKind::Emphasis => {
                let mut open = Token::new("em_open", "em", 1);
                open.markup = "*".to_string();
                out.push(open);
                for child in &node.children {
                    self.inline(child, out)?;
                }
                let mut close = Token::new("em_close", "em", -1);
                close.markup = "*".to_string();
                out.push(close);
            }
            NodeKind::Strong => {
                let mut open = Token::new("strong_open", "strong", 1);
                open.markup = "**".to_string();
                out.push(open);
                for child in &node.children {
                    self.inline(child, out)?;
                }
                let mut close = Token::new("strong_close", "strong", -1);
                close.markup = "**".to_string();
                out.push(close);
            }
            NodeKind::Literal => {
                out.push(Token::with_content("code_inline", "code", node.astext()));
            }
            NodeKind::Reference { .. } => self.reference(node, out)?,
            NodeKind::FootnoteRef { refname, refid, .. } => {
                let label = refname.clone().or_else(|| refid.clone());
                match label {
                    Some(label) => {
                        let mut token = Token::new("footnote_ref", "", 0);
                        token.meta.label = Some(label);
                        out.push(token);
                    }
                    None => {
                        self.diags.push(Diagnostic::unresolved(
                            format!("unknown footnote reference: {:?}", node.raw),
                            node.line,
                        ));
                        out.push(Token::with_content("text", "", node.raw.clone()));
                    }
                }
            }
            NodeKind::CitationRef { refname } => {
                let mut token = Token::new("footnote_ref", "", 0);
                token.meta.label = Some(format!("{}{}", self.config.cite_prefix, refname));
                out.push(token);
            }
            NodeKind::SubstitutionRef { refname } => {
                out.push(Token::with_content(
                    "substitution_inline",
                    "span",
                    refname.clone(),
                ));
            }
            NodeKind::Role { name, text } => {
                let role = name
                    .clone()
                    .or_else(|| self.config.default_role.clone())
                    .map(|r| {
                        self.namespace
                            .role(&r)
                            .map(str::to_string)
                            .unwrap_or(r)
                    });
                match role.as_deref() {
                    Some("math") if self.config.dollar_math => {
                        out.push(Token::with_content("math_inline", "math", text.clone()));
                    }
                    Some(role_name) => {
                        let mut token = Token::with_content("myst_role", "", text.clone());
                        token.meta.name = Some(role_name.to_string());
                        out.push(token);
                    }
                    None => {
                        out.push(Token::with_content("code_inline", "code", text.clone()));
                    }
                }
            }
            NodeKind::Target { inline: true, .. } => {
                self.diags.push(Diagnostic::warning(
                    format!("inline targets not convertible: {:?}", node.raw),
                    node.line,
                ));
                out.push(Token::with_content("text", "", node.raw.clone()));
            }
            NodeKind::Problematic => {
                out.push(Token::with_content("text", "", node.raw.clone()));
            }
            _ => {
                // unexpected block node in inline position; degrade to text
                out.push(Token::with_content("text", "", node.astext()));
            }
        }
        Ok(())
    }

    fn reference(&mut self, node: &Node, out: &mut Vec<Token>) -> Result<(), ConvertError> {
        let NodeKind::Reference {
            refname,
            refuri,
            refid,
            standalone,
            ..
        } = &node.kind
        else {
            return Ok(());
        };
        let text = node.astext();
        if *standalone {
            let Some(uri) = refuri else {
                return Err(ConvertError::AmbiguousNode {
                    raw: node.raw.clone(),
                    line: node.line,
                });
            };
            let mut open = Token::new("link_open", "a", 1);
            open.markup = "autolink".to_string();
            open.info = "auto".to_string();
            open.set_attr("href", uri.clone());
            out.push(open);
            out.push(Token::with_content("text", "", uri.clone()));
            let mut close = Token::new("link_close", "a", -1);
            close.markup = "autolink".to_string();
            close.info = "auto".to_string();
            out.push(close);
            return Ok(());
        }
        let resolutions =
            usize::from(refname.is_some()) + usize::from(refuri.is_some()) + usize::from(refid.is_some());
        if resolutions != 1 {
            return Err(ConvertError::AmbiguousNode {
                raw: node.raw.clone(),
                line: node.line,
            });
        }
        let mut open = Token::new("link_open", "a", 1);
        if let Some(name) = refname {
            open.set_attr("href", name.clone());
            open.meta.label = Some(name.clone());
        } else if let Some(uri) = refuri {
            open.set_attr("href", uri.clone());
        } else if let Some(id) = refid {
            open.set_attr("href", id.clone());
        }
        out.push(open);
        out.push(Token::with_content("text", "", text));
        out.push(Token::new("link_close", "a", -1));
        Ok(())
    }
}

fn heading_tag(level: usize) -> &'static str {
    match level {
        1 => "h1",
        2 => "h2",
        3 => "h3",
        4 => "h4",
        5 => "h5",
        _ => "h6",
    }
}

fn ensure_final_newline(text: &str) -> String {
    let trimmed = text.trim_end_matches('\n');
    format!("{trimmed}\n")
}

fn indent_by_space(text: &str) -> String {
    text.lines()
        .map(|l| format!(" {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace newlines in table-cell inline text with spaces.
fn strip_newlines(token: &mut Token) {
    token.content = token.content.replace('\n', " ");
    if let Some(children) = &mut token.children {
        for child in children {
            strip_newlines(child);
        }
    }
}

fn eval_rst(raw: &str) -> Token {
    let mut token = Token::new("fence", "code", 0);
    token.info = "{eval-rst}".to_string();
    token.content = ensure_final_newline(raw);
    token.markup = "```".to_string();
    token
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::namespace::{ConversionTable, Namespace};
    use crate::tokens::{inline_capture_holds, nesting_balance};
    use crate::transforms::apply_transforms;

    use super::*;

    fn lower_text(text: &str, config: &Config) -> (Vec<Token>, Environment, Vec<Diagnostic>) {
        crate::init_logger();
        let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
        let conversions = ConversionTable::default();
        let parser = crate::block::BlockParser::new(config, &namespace, &conversions);
        let mut diags = Vec::new();
        let mut doc = parser.parse(text, &mut diags);
        apply_transforms(&mut doc, config, &mut diags);
        let (tokens, env) =
            lower(&doc, config, &namespace, &mut diags).expect("lowering failed");
        (tokens, env, diags)
    }

    #[test]
    fn paragraph_tokens_are_balanced() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("hello *world*\n", &config);
        assert_eq!(nesting_balance(&tokens), 0);
        assert!(inline_capture_holds(&tokens));
        assert_eq!(tokens[0].ttype, "paragraph_open");
        let inline = tokens[1].children.as_ref().unwrap();
        assert_eq!(inline[0].ttype, "text");
        assert_eq!(inline[1].ttype, "em_open");
    }

    #[test]
    fn heading_level_from_adornment() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("Title\n=====\n\nSub\n---\n", &config);
        assert_eq!(tokens[0].ttype, "heading_open");
        assert_eq!(tokens[0].tag, "h1");
        assert_eq!(tokens[3].tag, "h2");
    }

    #[test]
    fn uri_targets_populate_env_first_wins() {
        let config = Config::default();
        let (tokens, env, diags) = lower_text(
            ".. _a: https://one.example\n.. _a: https://two.example\n",
            &config,
        );
        assert!(tokens.is_empty());
        assert_eq!(
            env.references,
            [LinkDefinition {
                name: "a".to_string(),
                uri: "https://one.example".to_string(),
                line: 1,
            }]
        );
        assert_eq!(
            env.duplicate_refs,
            [LinkDefinition {
                name: "a".to_string(),
                uri: "https://two.example".to_string(),
                line: 2,
            }]
        );
        assert_eq!(diags.len(), 1);
        assert!(diags[0].to_string().contains("Duplicate target name"));
    }

    #[test]
    fn unresolved_reference_is_reported() {
        let config = Config::default();
        let (tokens, _, diags) = lower_text("See `missing`_.\n", &config);
        let inline = tokens[1].children.as_ref().unwrap();
        assert!(inline.iter().any(|t| t.ttype == "link_open"));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].to_string().contains("unresolved reference"));
        assert!(diags[0].to_string().contains("missing"));
    }

    #[test]
    fn unresolved_footnote_is_reported() {
        let config = Config::default();
        let (_, _, diags) = lower_text("A claim [1]_ with no note.\n", &config);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].to_string().contains("no footnote found"));
    }

    #[test]
    fn unresolved_citation_is_reported() {
        let config = Config::default();
        let (_, _, diags) = lower_text("See [MISSING]_ here.\n", &config);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].to_string().contains("no citation found"));
    }

    #[test]
    fn section_names_resolve_references() {
        let config = Config::default();
        let (_, _, diags) = lower_text("Intro\n=====\n\nSee `Intro`_.\n", &config);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn role_aliases_canonicalize() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("squared is :sup:`2` here\n", &config);
        let inline = tokens[1].children.as_ref().unwrap();
        let role = inline.iter().find(|t| t.ttype == "myst_role").unwrap();
        assert_eq!(role.meta.name.as_deref(), Some("superscript"));
    }

    #[test]
    fn named_target_without_uri_becomes_myst_target() {
        let config = Config::default();
        let (tokens, _, _) = lower_text(".. _here:\n\ntext\n", &config);
        assert_eq!(tokens[0].ttype, "myst_target");
        assert_eq!(tokens[0].content, "here");
    }

    #[test]
    fn tight_list_hides_paragraphs() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("- one\n- two\n", &config);
        let para = tokens
            .iter()
            .find(|t| t.ttype == "paragraph_open")
            .unwrap();
        assert!(para.hidden);
    }

    #[test]
    fn gfm_table_tokens() {
        let config = Config::default();
        let table = "\
+-----+-----+
| a   | b   |
+=====+=====+
| c   | d   |
+-----+-----+
";
        let (tokens, _, diags) = lower_text(table, &config);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(tokens[0].ttype, "table_open");
        assert!(tokens.iter().any(|t| t.ttype == "th_open"));
        assert_eq!(nesting_balance(&tokens), 0);
    }

    #[test]
    fn headless_table_falls_back_to_eval_rst() {
        let config = Config::default();
        let (tokens, _, diags) = lower_text("+---+\n| a |\n+---+\n", &config);
        assert_eq!(tokens[0].ttype, "fence");
        assert_eq!(tokens[0].info, "{eval-rst}");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn code_directive_becomes_fence() {
        let config = Config::default();
        let (tokens, _, _) = lower_text(".. code:: python\n\n   x = 1\n", &config);
        assert_eq!(tokens[0].ttype, "fence");
        assert_eq!(tokens[0].info, "python");
        assert_eq!(tokens[0].content, "x = 1\n");
    }

    #[test]
    fn math_directive_with_dollar_math() {
        let config = Config::default();
        assert!(config.dollar_math);
        let (tokens, _, _) = lower_text(".. math::\n\n   a = b\n", &config);
        assert_eq!(tokens[0].ttype, "math_block");
        assert_eq!(tokens[0].content, "a = b");
    }

    #[test]
    fn admonition_directive_token() {
        let config = Config::default();
        let (tokens, _, _) = lower_text(".. note:: Take care.\n", &config);
        let token = &tokens[0];
        assert_eq!(token.ttype, "directive");
        assert_eq!(token.meta.name.as_deref(), Some("note"));
        assert!(token.markup.contains(':'));
        let kids = token.children.as_ref().unwrap();
        assert_eq!(kids[0].ttype, "directive_content");
    }

    #[test]
    fn substitution_definition_enters_front_matter() {
        let config = Config::default();
        let (tokens, _, _) = lower_text(
            "Uses |name|.\n\n.. |name| replace:: some text\n",
            &config,
        );
        assert_eq!(tokens[0].ttype, "front_matter_tokens");
        let entries = tokens[0].children.as_ref().unwrap();
        assert_eq!(
            entries[0].meta.key_path,
            ["substitutions".to_string(), "name".to_string()]
        );
        let exts = required_extensions(&tokens);
        assert!(exts.contains(&Extension::FrontMatter));
        assert!(exts.contains(&Extension::Substitution));
    }

    #[test]
    fn extension_scan_finds_dollar_math_and_deflist() {
        let config = Config::default();
        let (tokens, _, _) = lower_text(
            "term\n    definition\n\n.. math::\n\n   x^2\n",
            &config,
        );
        let exts = required_extensions(&tokens);
        assert!(exts.contains(&Extension::Deflist));
        assert!(exts.contains(&Extension::DollarMath));
        assert!(!exts.contains(&Extension::FrontMatter));
    }

    #[test]
    fn footnote_tokens_carry_labels() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("Text [1]_.\n\n.. [1] The note.\n", &config);
        let open = tokens
            .iter()
            .find(|t| t.ttype == "footnote_open")
            .unwrap();
        assert_eq!(open.meta.label.as_deref(), Some("1"));
        let inline = tokens[1].children.as_ref().unwrap();
        let footnote_ref = inline.iter().find(|t| t.ttype == "footnote_ref").unwrap();
        assert_eq!(footnote_ref.meta.label.as_deref(), Some("1"));
    }

    #[test]
    fn citation_uses_prefix() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("See [CIT]_.\n\n.. [CIT] Cited.\n", &config);
        let open = tokens
            .iter()
            .find(|t| t.ttype == "footnote_open")
            .unwrap();
        assert_eq!(
            open.meta.label.as_deref(),
            Some(format!("{}cit", config.cite_prefix).as_str())
        );
    }

    #[test]
    fn named_reference_links_by_label() {
        let config = Config::default();
        let (tokens, env, _) = lower_text(
            "See `docs`_.\n\n.. _docs: https://example.com\n",
            &config,
        );
        let inline = tokens[1].children.as_ref().unwrap();
        let link = inline.iter().find(|t| t.ttype == "link_open").unwrap();
        assert_eq!(link.meta.label.as_deref(), Some("docs"));
        assert_eq!(env.references.len(), 1);
    }

    #[test]
    fn standalone_uri_is_autolink() {
        let config = Config::default();
        let (tokens, _, _) = lower_text("Go to https://example.com now.\n", &config);
        let inline = tokens[1].children.as_ref().unwrap();
        let link = inline.iter().find(|t| t.ttype == "link_open").unwrap();
        assert_eq!(link.markup, "autolink");
        assert_eq!(link.attr("href"), Some("https://example.com"));
    }
}
