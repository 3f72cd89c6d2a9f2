//! The typed document tree built by the block parser.
//!
//! Unlike docutils-style trees, attributes are not a string-keyed map: each
//! [`NodeKind`] variant carries only the fields valid for it. The `raw` field
//! holds the original source substring where a construct may need to fall
//! back to verbatim output.

use crate::namespace::ConversionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Bullet,
    Enumerated,
}

/// Auto-label kind for footnotes: `[#]_` / `[#name]_` or `[*]_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoLabel {
    Number,
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Section {
        names: Vec<String>,
    },
    Title {
        level: usize,
    },
    Paragraph,
    Text {
        text: String,
    },
    Emphasis,
    Strong,
    Literal,
    LiteralBlock {
        language: Option<String>,
    },
    BlockQuote,
    Attribution,
    Transition,
    BulletList {
        bullet: char,
        tight: bool,
    },
    EnumeratedList {
        start: Option<u64>,
        tight: bool,
    },
    ListItem {
        style: Option<ListStyle>,
        prefix: Option<String>,
    },
    DefinitionList,
    DefinitionItem,
    Term {
        classifiers: Vec<String>,
    },
    Definition,
    FieldList,
    Field,
    FieldName {
        name: String,
    },
    FieldBody,
    /// Option lists have no MyST equivalent; the raw block is kept for
    /// verbatim fallback.
    OptionList,
    /// Line blocks likewise fall back to verbatim output.
    LineBlock,
    Reference {
        refname: Option<String>,
        refuri: Option<String>,
        refid: Option<String>,
        standalone: bool,
        anonymous: bool,
        embedded: bool,
    },
    Target {
        names: Vec<String>,
        refname: Option<String>,
        refuri: Option<String>,
        refid: Option<String>,
        anonymous: bool,
        inline: bool,
    },
    FootnoteRef {
        refname: Option<String>,
        refid: Option<String>,
        auto: Option<AutoLabel>,
    },
    Footnote {
        names: Vec<String>,
        ids: Vec<String>,
        auto: Option<AutoLabel>,
    },
    CitationRef {
        refname: String,
    },
    Citation {
        names: Vec<String>,
    },
    /// The leading label of a footnote/citation; stripped by a transform.
    Label,
    SubstitutionRef {
        refname: String,
    },
    SubstitutionDef {
        names: Vec<String>,
    },
    Table {
        malformed: bool,
    },
    TGroup {
        cols: usize,
    },
    THead,
    TBody,
    Row,
    Entry,
    Comment,
    /// An interpreted-text role, kept as data and never executed.
    Role {
        name: Option<String>,
        text: String,
    },
    Directive {
        name: String,
        implementation: Option<String>,
        strategy: ConversionStrategy,
        options: Vec<(String, Option<String>)>,
        /// Fence length for rendering, set by the fence-sizing transform.
        fence: usize,
    },
    DirectiveArgument,
    DirectiveContent,
    FrontMatter,
    /// An unconvertible construct preserved byte-for-byte (`raw` holds the
    /// block text, re-prefixed with `.. ` where applicable).
    VerbatimBlock {
        name: String,
    },
    /// Inline markup that failed to parse; rendered as plain text.
    Problematic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
    /// Original source substring (empty when not needed).
    pub raw: String,
    /// 1-based source line.
    pub line: usize,
}

impl Node {
    pub fn new(kind: NodeKind, line: usize) -> Self {
        Self {
            kind,
            children: Vec::new(),
            raw: String::new(),
            line,
        }
    }

    pub fn with_raw(kind: NodeKind, raw: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            children: Vec::new(),
            raw: raw.into(),
            line,
        }
    }

    pub fn text(text: impl Into<String>, line: usize) -> Self {
        let text = text.into();
        Self {
            kind: NodeKind::Text { text: text.clone() },
            children: Vec::new(),
            raw: text,
            line,
        }
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Concatenated text of all `Text` descendants.
    pub fn astext(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let NodeKind::Text { text } = &self.kind {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Pre-order traversal.
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Pre-order traversal with mutation.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Count descendants (excluding self) matching a predicate.
    pub fn count_descendants(&self, pred: &impl Fn(&Node) -> bool) -> usize {
        let mut count = 0;
        for child in &self.children {
            if pred(child) {
                count += 1;
            }
            count += child.count_descendants(pred);
        }
        count
    }

    /// Whether any descendant (excluding self) matches a predicate.
    pub fn has_descendant(&self, pred: &impl Fn(&Node) -> bool) -> bool {
        self.children
            .iter()
            .any(|c| pred(c) || c.has_descendant(pred))
    }
}

/// Nodes that may precede document metadata (docutils "PreBibliographic").
pub fn is_prebibliographic(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Comment
            | NodeKind::Target { .. }
            | NodeKind::SubstitutionDef { .. }
            | NodeKind::Title { .. }
    )
}

/// Normalize a reference name: case-folded, runs of whitespace collapsed.
pub fn fully_normalize_name(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize whitespace only, preserving case.
pub fn whitespace_normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn astext_concatenates_descendants() {
        let mut para = Node::new(NodeKind::Paragraph, 1);
        para.push(Node::text("a ", 1));
        let mut em = Node::new(NodeKind::Emphasis, 1);
        em.push(Node::text("b", 1));
        para.push(em);
        assert_eq!(para.astext(), "a b");
    }

    #[test]
    fn normalize_names() {
        assert_eq!(fully_normalize_name("Some  Name\n x"), "some name x");
        assert_eq!(whitespace_normalize_name("Some  Name"), "Some Name");
    }

    #[test]
    fn descendant_counting() {
        let mut doc = Node::new(NodeKind::Document, 1);
        let mut quote = Node::new(NodeKind::BlockQuote, 1);
        quote.push(Node::new(NodeKind::Paragraph, 1));
        doc.push(quote);
        let is_para = |n: &Node| matches!(n.kind, NodeKind::Paragraph);
        assert_eq!(doc.count_descendants(&is_para), 1);
        assert!(doc.has_descendant(&is_para));
    }
}
