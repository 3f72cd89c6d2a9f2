//! Post-parse tree transforms, applied in a fixed order before lowering.
//!
//! Every transform is idempotent: running the pipeline twice leaves the
//! tree unchanged.

use log::debug;

use crate::config::Config;
use crate::error::Diagnostic;
use crate::nodes::{is_prebibliographic, AutoLabel, ListStyle, Node, NodeKind};

const FOOTNOTE_SYMBOLS: &[&str] = &[
    "*", "\u{2020}", "\u{2021}", "\u{00a7}", "\u{00b6}", "#", "\u{2660}",
    "\u{2665}", "\u{2666}", "\u{2663}",
];

pub fn apply_transforms(document: &mut Node, config: &Config, diags: &mut Vec<Diagnostic>) {
    propagate_targets(document);
    extract_front_matter(document, config);
    resolve_anonymous_hyperlinks(document, diags);
    number_auto_footnotes(document, diags);
    strip_footnote_labels(document);
    resolve_list_items(document);
    size_directive_fences(document);
}

/// Internal targets directly before another target or a section give it
/// their names and disappear.
fn propagate_targets(node: &mut Node) {
    let mut idx = 0;
    while idx < node.children.len() {
        let internal = matches!(
            &node.children[idx].kind,
            NodeKind::Target {
                names,
                refname: None,
                refuri: None,
                anonymous: false,
                inline: false,
                ..
            } if !names.is_empty()
        );
        if internal
            && idx + 1 < node.children.len()
            && matches!(
                node.children[idx + 1].kind,
                NodeKind::Target { .. } | NodeKind::Section { .. }
            )
        {
            let removed = node.children.remove(idx);
            if let NodeKind::Target { names: moved, .. } = removed.kind {
                match &mut node.children[idx].kind {
                    NodeKind::Target { names, .. } | NodeKind::Section { names } => {
                        names.splice(0..0, moved);
                    }
                    _ => {}
                }
            }
            continue;
        }
        propagate_targets(&mut node.children[idx]);
        idx += 1;
    }
}

/// A field list opening the document becomes front matter. A document
/// holding nothing but one section is searched inside that section, so a
/// title above the field list does not hide it.
fn extract_front_matter(document: &mut Node, config: &Config) {
    if !config.front_matter {
        return;
    }
    let lone_section = document.children.len() == 1
        && matches!(document.children[0].kind, NodeKind::Section { .. });
    let scope = if lone_section {
        &mut document.children[0]
    } else {
        document
    };
    let first = scope.children.iter().position(|c| !is_prebibliographic(c));
    if let Some(pos) = first
        && matches!(scope.children[pos].kind, NodeKind::FieldList)
    {
        debug!("extracting leading field list into front matter");
        let field_list = std::mem::replace(
            &mut scope.children[pos],
            Node::new(NodeKind::FrontMatter, 1),
        );
        scope.children[pos].children = field_list.children;
        scope.children[pos].line = field_list.line;
    }
}

/// Pair anonymous references with anonymous targets, first come first
/// served; leftovers on either side degrade to plain text or vanish.
fn resolve_anonymous_hyperlinks(document: &mut Node, diags: &mut Vec<Diagnostic>) {
    let mut targets: Vec<(Option<String>, Option<String>)> = Vec::new();
    document.walk(&mut |node| {
        if let NodeKind::Target {
            anonymous: true,
            refuri,
            refname,
            ..
        } = &node.kind
        {
            targets.push((refuri.clone(), refname.clone()));
        }
    });
    let mut queue = targets.into_iter();
    document.walk_mut(&mut |node| {
        if let NodeKind::Reference {
            anonymous: true,
            refuri,
            refname,
            ..
        } = &mut node.kind
        {
            if refuri.is_some() || refname.is_some() {
                return;
            }
            match queue.next() {
                Some((uri, name)) => {
                    *refuri = uri;
                    *refname = name;
                }
                None => {
                    diags.push(Diagnostic::unresolved(
                        format!("Anonymous hyperlink mismatch: no target for {:?}.", node.raw),
                        node.line,
                    ));
                    node.kind = NodeKind::Text {
                        text: node.raw.clone(),
                    };
                    node.children.clear();
                }
            }
        }
    });
    if queue.next().is_some() {
        diags.push(Diagnostic::warning(
            "Anonymous hyperlink mismatch: more targets than references.",
            document.line,
        ));
    }
    remove_anonymous_targets(document);
}

fn remove_anonymous_targets(node: &mut Node) {
    node.children
        .retain(|c| !matches!(c.kind, NodeKind::Target { anonymous: true, .. }));
    for child in &mut node.children {
        remove_anonymous_targets(child);
    }
}

/// Assign labels to auto-numbered and auto-symbol footnotes, then pair
/// unnamed references with them in document order.
fn number_auto_footnotes(document: &mut Node, diags: &mut Vec<Diagnostic>) {
    let mut used: Vec<u64> = Vec::new();
    document.walk(&mut |node| {
        if let NodeKind::Footnote { names, auto: None, .. } = &node.kind
            && let Some(n) = names.first().and_then(|n| n.parse::<u64>().ok())
        {
            used.push(n);
        }
    });

    let mut counter = 0u64;
    let mut next_number = move || {
        loop {
            counter += 1;
            if !used.contains(&counter) {
                return counter;
            }
        }
    };
    let mut symbol_index = 0usize;
    let mut number_queue: Vec<String> = Vec::new();
    let mut symbol_queue: Vec<String> = Vec::new();

    document.walk_mut(&mut |node| {
        if let NodeKind::Footnote { names, ids, auto } = &mut node.kind {
            match auto {
                Some(AutoLabel::Number) => {
                    if names.is_empty() {
                        let label = next_number().to_string();
                        names.push(label.clone());
                        ids.push(label);
                    }
                    number_queue.push(names[0].clone());
                }
                Some(AutoLabel::Symbol) => {
                    if names.is_empty() {
                        let label = symbol_label(symbol_index);
                        symbol_index += 1;
                        names.push(label.clone());
                        ids.push(label);
                    }
                    symbol_queue.push(names[0].clone());
                }
                None => {}
            }
        }
    });

    let mut numbers = number_queue.into_iter();
    let mut symbols = symbol_queue.into_iter();
    document.walk_mut(&mut |node| {
        if let NodeKind::FootnoteRef { refname, auto, .. } = &mut node.kind {
            let assigned = match auto {
                Some(AutoLabel::Number) if refname.is_none() => numbers.next(),
                Some(AutoLabel::Symbol) if refname.is_none() => symbols.next(),
                _ => return,
            };
            match assigned {
                Some(label) => *refname = Some(label),
                None => {
                    diags.push(Diagnostic::unresolved(
                        format!("No footnote for auto reference {:?}.", node.raw),
                        node.line,
                    ));
                    node.kind = NodeKind::Text {
                        text: node.raw.clone(),
                    };
                }
            }
        }
    });
}

fn symbol_label(index: usize) -> String {
    let symbol = FOOTNOTE_SYMBOLS[index % FOOTNOTE_SYMBOLS.len()];
    symbol.repeat(index / FOOTNOTE_SYMBOLS.len() + 1)
}

fn strip_footnote_labels(document: &mut Node) {
    document.walk_mut(&mut |node| {
        if matches!(
            node.kind,
            NodeKind::Footnote { .. } | NodeKind::Citation { .. }
        ) {
            node.children
                .retain(|c| !matches!(c.kind, NodeKind::Label));
        }
    });
}

/// Decide list tightness and fill in item markers.
fn resolve_list_items(document: &mut Node) {
    document.walk_mut(&mut |node| {
        let (marker, style) = match &node.kind {
            NodeKind::BulletList { bullet, .. } => (bullet.to_string(), ListStyle::Bullet),
            NodeKind::EnumeratedList { .. } => (".".to_string(), ListStyle::Enumerated),
            _ => return,
        };
        let loose = node
            .children
            .iter()
            .any(|item| item.children.len() >= 2);
        match &mut node.kind {
            NodeKind::BulletList { tight, .. } | NodeKind::EnumeratedList { tight, .. } => {
                *tight = !loose;
            }
            _ => {}
        }
        for item in &mut node.children {
            if let NodeKind::ListItem { style: s, prefix } = &mut item.kind {
                *s = Some(style);
                *prefix = Some(marker.clone());
            }
        }
    });
}

/// Outer directive fences must be longer than anything they contain.
fn size_directive_fences(document: &mut Node) {
    document.walk_mut(&mut |node| {
        if matches!(node.kind, NodeKind::Directive { .. }) {
            let nested = node.count_descendants(&|n| {
                matches!(n.kind, NodeKind::Directive { .. })
            });
            let tables = node.has_descendant(&|n| matches!(n.kind, NodeKind::Table { .. }));
            if let NodeKind::Directive { fence, .. } = &mut node.kind {
                *fence = 3 + nested + usize::from(tables);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::namespace::{ConversionTable, Namespace};

    use super::*;

    fn parse_and_transform(text: &str, config: &Config) -> (Node, Vec<Diagnostic>) {
        crate::init_logger();
        let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
        let conversions = ConversionTable::default();
        let parser = crate::block::BlockParser::new(config, &namespace, &conversions);
        let mut diags = Vec::new();
        let mut doc = parser.parse(text, &mut diags);
        apply_transforms(&mut doc, config, &mut diags);
        (doc, diags)
    }

    #[test]
    fn target_names_propagate_to_section() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(".. _intro:\n\nIntro\n=====\n\nbody\n", &config);
        match &doc.children[0].kind {
            NodeKind::Section { names } => {
                assert_eq!(names, &["intro".to_string(), "intro".to_string()]);
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn chained_targets_merge() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(
            ".. _a:\n.. _b: https://example.com\n\ntext\n",
            &config,
        );
        match &doc.children[0].kind {
            NodeKind::Target { names, refuri, .. } => {
                assert_eq!(names, &["a".to_string(), "b".to_string()]);
                assert_eq!(refuri.as_deref(), Some("https://example.com"));
            }
            other => panic!("expected target, got {other:?}"),
        }
    }

    #[test]
    fn front_matter_from_leading_field_list() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(":author: me\n:status: draft\n\nbody\n", &config);
        assert!(matches!(doc.children[0].kind, NodeKind::FrontMatter));
        assert_eq!(doc.children[0].children.len(), 2);
    }

    #[test]
    fn front_matter_found_under_lone_section() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(
            "Title\n=====\n\n:author: me\n\nbody\n",
            &config,
        );
        let section = &doc.children[0];
        assert!(matches!(section.kind, NodeKind::Section { .. }));
        assert!(matches!(section.children[0].kind, NodeKind::Title { .. }));
        assert!(matches!(section.children[1].kind, NodeKind::FrontMatter));
    }

    #[test]
    fn front_matter_disabled() {
        let config = Config::builder().front_matter(false).build();
        let (doc, _) = parse_and_transform(":author: me\n\nbody\n", &config);
        assert!(matches!(doc.children[0].kind, NodeKind::FieldList));
    }

    #[test]
    fn anonymous_pairing_is_fifo() {
        let config = Config::default();
        let (doc, diags) = parse_and_transform(
            "See `first`__ and `second`__.\n\n__ https://one.example\n__ https://two.example\n",
            &config,
        );
        assert!(diags.is_empty(), "{diags:?}");
        let mut uris = Vec::new();
        doc.walk(&mut |n| {
            if let NodeKind::Reference { refuri: Some(uri), .. } = &n.kind {
                uris.push(uri.clone());
            }
        });
        assert_eq!(uris, ["https://one.example", "https://two.example"]);
        // anonymous targets are consumed
        assert!(!doc.has_descendant(&|n| matches!(n.kind, NodeKind::Target { anonymous: true, .. })));
    }

    #[test]
    fn unmatched_anonymous_reference_degrades() {
        let config = Config::default();
        let (doc, diags) = parse_and_transform("See `orphan`__.\n", &config);
        assert_eq!(diags.len(), 1);
        assert!(!doc.has_descendant(&|n| matches!(n.kind, NodeKind::Reference { .. })));
    }

    #[test]
    fn auto_footnotes_skip_used_numbers() {
        let config = Config::default();
        let (doc, diags) = parse_and_transform(
            "Ref [#]_ and [#]_ and [1]_.\n\n.. [#] first auto\n.. [#] second auto\n.. [1] manual\n",
            &config,
        );
        assert!(diags.is_empty(), "{diags:?}");
        let mut labels = Vec::new();
        doc.walk(&mut |n| {
            if let NodeKind::Footnote { names, .. } = &n.kind {
                labels.push(names[0].clone());
            }
        });
        assert_eq!(labels, ["2", "3", "1"]);
        let mut refs = Vec::new();
        doc.walk(&mut |n| {
            if let NodeKind::FootnoteRef { refname: Some(r), .. } = &n.kind {
                refs.push(r.clone());
            }
        });
        assert_eq!(refs, ["2", "3", "1"]);
    }

    #[test]
    fn symbol_footnotes_cycle() {
        assert_eq!(symbol_label(0), "*");
        assert_eq!(symbol_label(1), "\u{2020}");
        assert_eq!(symbol_label(10), "**");
    }

    #[test]
    fn labels_are_stripped() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(".. [1] footnote text\n", &config);
        assert!(!doc.has_descendant(&|n| matches!(n.kind, NodeKind::Label)));
    }

    #[test]
    fn single_paragraph_items_make_a_tight_list() {
        let config = Config::default();
        let (doc, _) = parse_and_transform("- one\n- two\n", &config);
        match &doc.children[0].kind {
            NodeKind::BulletList { tight, .. } => assert!(tight),
            other => panic!("expected bullet list, got {other:?}"),
        }
        match &doc.children[0].children[0].kind {
            NodeKind::ListItem { style, prefix } => {
                assert_eq!(*style, Some(ListStyle::Bullet));
                assert_eq!(prefix.as_deref(), Some("-"));
            }
            other => panic!("expected list item, got {other:?}"),
        }
    }

    #[test]
    fn multi_block_item_makes_a_loose_list() {
        let config = Config::default();
        let (doc, _) = parse_and_transform("- one\n\n  second paragraph\n- two\n", &config);
        match &doc.children[0].kind {
            NodeKind::BulletList { tight, .. } => assert!(!tight),
            other => panic!("expected bullet list, got {other:?}"),
        }
    }

    #[test]
    fn nested_directives_grow_fences() {
        let config = Config::default();
        let (doc, _) = parse_and_transform(
            ".. note::\n\n   .. note::\n\n      inner\n",
            &config,
        );
        match &doc.children[0].kind {
            NodeKind::Directive { fence, .. } => assert_eq!(*fence, 4),
            other => panic!("expected directive, got {other:?}"),
        }
        let inner = &doc.children[0].children[0].children[0];
        match &inner.kind {
            NodeKind::Directive { fence, .. } => assert_eq!(*fence, 3),
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn transforms_are_idempotent() {
        let config = Config::default();
        let (mut doc, _) = parse_and_transform(
            "- a\n- b\n\nSee [#]_.\n\n.. [#] note\n\n.. _x:\n\ntext\n",
            &config,
        );
        let snapshot = doc.clone();
        let mut diags = Vec::new();
        apply_transforms(&mut doc, &config, &mut diags);
        assert_eq!(doc, snapshot);
        assert!(diags.is_empty());
    }
}
