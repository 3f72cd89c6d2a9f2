//! Inline markup scanner.
//!
//! Scans paragraph text for emphasis, strong, literals, references,
//! footnote/citation references, substitution references, interpreted text
//! and inline targets, in source order. Implicit markup (standalone URIs,
//! optionally PEP/RFC references) is recognized last, in the stretches of
//! plain text left between explicit constructs.
//!
//! Backslash escapes are tracked with a `\x00` placeholder: [`escape2null`]
//! rewrites `\x` to `\x00x` before scanning, and [`unescape`] either removes
//! the placeholders or restores the backslashes.

pub mod patterns;
pub mod punctuation;

use log::{debug, trace};
use regex::Regex;

use crate::config::Config;
use crate::error::Diagnostic;
use crate::nodes::{
    AutoLabel, Node, NodeKind, fully_normalize_name, whitespace_normalize_name,
};
use patterns::{Regexes, known_scheme, regexes};

/// Replace each backslash with a `\x00` placeholder kept in front of the
/// escaped character.
pub fn escape2null(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push('\0');
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolve `\x00` placeholders: restore the backslashes, or drop them
/// (escaped whitespace disappears entirely).
pub fn unescape(text: &str, restore_backslashes: bool) -> String {
    if restore_backslashes {
        text.replace('\0', "\\")
    } else {
        text.replace("\0 ", "").replace("\0\n", "").replace('\0', "")
    }
}

/// Split on escaped whitespace (placeholder + space/newline).
pub fn split_escaped_whitespace(text: &str) -> Vec<String> {
    text.split("\0 ")
        .flat_map(|part| part.split("\0\n"))
        .map(str::to_string)
        .collect()
}

fn prev_char(text: &str, idx: usize) -> Option<char> {
    text[..idx].chars().next_back()
}

fn next_char(text: &str, idx: usize) -> Option<char> {
    text[idx..].chars().next()
}

fn advance(text: &str, idx: usize) -> usize {
    idx + next_char(text, idx).map_or(1, char::len_utf8)
}

/// What may precede an end-string.
#[derive(Clone, Copy)]
enum PrevRule {
    NotWhitespace,
    NotWhitespaceOrNull,
    /// Whitespace or a placeholder is allowed only when itself escaped.
    NotUnescapedWhitespaceOrNull,
}

fn prev_ok(text: &str, idx: usize, rule: PrevRule) -> bool {
    let Some(prev) = prev_char(text, idx) else {
        return true;
    };
    match rule {
        PrevRule::NotWhitespace => !prev.is_whitespace(),
        PrevRule::NotWhitespaceOrNull => !prev.is_whitespace() && prev != '\0',
        PrevRule::NotUnescapedWhitespaceOrNull => {
            if prev.is_whitespace() || prev == '\0' {
                let before = idx - prev.len_utf8();
                prev_char(text, before) == Some('\0')
            } else {
                true
            }
        }
    }
}

/// First context-valid match of an end pattern: (start, end, matched text).
fn find_end(after: &str, pat: &Regex, rule: PrevRule) -> Option<(usize, usize, String)> {
    let mut from = 0;
    while let Some(m) = pat.find_at(after, from) {
        if prev_ok(after, m.start(), rule)
            && punctuation::valid_end_context(next_char(after, m.end()))
        {
            return Some((m.start(), m.end(), m.as_str().to_string()));
        }
        from = advance(after, m.start());
    }
    None
}

/// Whether a start-string is enclosed in a matching punctuation pair.
/// A start-string at the very end of the text is consumed silently too.
fn quoted_start(text: &str, start: usize, end: usize) -> bool {
    if start == 0 {
        return false;
    }
    let prev = prev_char(text, start).expect("start > 0");
    match next_char(text, end) {
        None => true,
        Some(post) => punctuation::match_chars(prev, post),
    }
}

enum Candidate {
    Start {
        markup: String,
        start: usize,
        end: usize,
    },
    Reference {
        name: String,
        anonymous: bool,
        start: usize,
        end: usize,
    },
    Footnote {
        label: String,
        citation: bool,
        start: usize,
        end: usize,
    },
    Backquote {
        role: Option<String>,
        start: usize,
        tick: usize,
    },
}

struct Outcome {
    before: String,
    inlines: Vec<Node>,
    remaining: String,
}

enum ObjResult {
    /// Quoted start-string, consumed as plain text.
    Quoted(Outcome),
    Matched {
        before: String,
        remaining: String,
        content: String,
        raw: String,
        endstring: String,
    },
    /// No end-string; a problematic node was produced.
    Failed(Outcome),
}

struct InterpretedEnd {
    start: usize,
    end: usize,
    role: bool,
    suffix: String,
}

pub struct InlineScanner {
    regexes: &'static Regexes,
    pep_references: bool,
    rfc_references: bool,
}

impl InlineScanner {
    pub fn new(config: &Config) -> Self {
        Self {
            regexes: regexes(),
            pep_references: config.pep_references,
            rfc_references: config.rfc_references,
        }
    }

    /// Parse one stretch of inline text into nodes, collecting warnings.
    pub fn parse(
        &self,
        text: &str,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Node> {
        trace!("inline parse at line {lineno}: {text:?}");
        let mut remaining = escape2null(text);
        let mut processed: Vec<Node> = Vec::new();
        let mut unprocessed: Vec<String> = Vec::new();
        while !remaining.is_empty() {
            let Some(candidate) = self.find_candidate(&remaining) else {
                break;
            };
            let outcome = self.dispatch(&remaining, candidate, lineno, diagnostics);
            unprocessed.push(outcome.before);
            if !outcome.inlines.is_empty() {
                let pre = unprocessed.concat();
                unprocessed.clear();
                processed.extend(self.implicit_inline(&pre, lineno));
                processed.extend(outcome.inlines);
            }
            remaining = outcome.remaining;
        }
        let tail = format!("{}{remaining}", unprocessed.concat());
        processed.extend(self.implicit_inline(&tail, lineno));
        processed
    }

    fn find_candidate(&self, text: &str) -> Option<Candidate> {
        let mut from = 0;
        while from <= text.len() {
            let caps = self.regexes.initial.captures_at(text, from)?;
            let whole = caps.get(0).expect("group 0");
            let start = whole.start();
            let retry = advance(text, start);
            if !punctuation::valid_start_context(prev_char(text, start)) {
                from = retry;
                continue;
            }
            if let Some(g) = caps.name("start") {
                let markup = g.as_str();
                let after = next_char(text, g.end());
                if after.is_some_and(char::is_whitespace)
                    || (markup == "|" && after == Some('|'))
                {
                    from = retry;
                    continue;
                }
                return Some(Candidate::Start {
                    markup: markup.to_string(),
                    start: g.start(),
                    end: g.end(),
                });
            }
            if let Some(g) = caps.name("refname") {
                let refend = caps.name("refend").expect("refend with refname");
                if !punctuation::valid_end_context(next_char(text, refend.end())) {
                    from = retry;
                    continue;
                }
                return Some(Candidate::Reference {
                    name: g.as_str().to_string(),
                    anonymous: refend.as_str() == "__",
                    start,
                    end: refend.end(),
                });
            }
            if let Some(g) = caps.name("footlabel") {
                let fnend = caps.name("fnend").expect("fnend with footlabel");
                if !punctuation::valid_end_context(next_char(text, fnend.end())) {
                    from = retry;
                    continue;
                }
                return Some(Candidate::Footnote {
                    label: g.as_str().to_string(),
                    citation: caps.name("citlabel").is_some(),
                    start,
                    end: fnend.end(),
                });
            }
            let tick = caps.name("backquote").expect("backquote fallback");
            let after = next_char(text, tick.end());
            if after.is_some_and(char::is_whitespace) || after == Some('`') {
                from = retry;
                continue;
            }
            return Some(Candidate::Backquote {
                role: caps.name("role").map(|r| {
                    let s = r.as_str();
                    s[1..s.len() - 1].to_string()
                }),
                start,
                tick: tick.start(),
            });
        }
        None
    }

    fn dispatch(
        &self,
        text: &str,
        candidate: Candidate,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Outcome {
        match candidate {
            Candidate::Start { markup, start, end } => match markup.as_str() {
                "*" => self.span(
                    text,
                    start,
                    end,
                    &self.regexes.emphasis_end,
                    PrevRule::NotWhitespaceOrNull,
                    false,
                    "emphasis",
                    lineno,
                    diagnostics,
                    |content, raw| {
                        let mut node = Node::with_raw(NodeKind::Emphasis, raw, lineno);
                        node.push(Node::text(content, lineno));
                        vec![node]
                    },
                ),
                "**" => self.span(
                    text,
                    start,
                    end,
                    &self.regexes.strong_end,
                    PrevRule::NotWhitespaceOrNull,
                    false,
                    "strong",
                    lineno,
                    diagnostics,
                    |content, raw| {
                        let mut node = Node::with_raw(NodeKind::Strong, raw, lineno);
                        node.push(Node::text(content, lineno));
                        vec![node]
                    },
                ),
                "``" => self.span(
                    text,
                    start,
                    end,
                    &self.regexes.literal_end,
                    PrevRule::NotWhitespace,
                    true,
                    "literal",
                    lineno,
                    diagnostics,
                    |content, raw| {
                        let mut node = Node::with_raw(NodeKind::Literal, raw, lineno);
                        node.push(Node::text(content, lineno));
                        vec![node]
                    },
                ),
                "_`" => self.span(
                    text,
                    start,
                    end,
                    &self.regexes.target_end,
                    PrevRule::NotWhitespaceOrNull,
                    false,
                    "target",
                    lineno,
                    diagnostics,
                    |content, raw| {
                        let mut node = Node::with_raw(
                            NodeKind::Target {
                                names: vec![fully_normalize_name(&content)],
                                refname: None,
                                refuri: None,
                                refid: None,
                                anonymous: false,
                                inline: true,
                            },
                            raw,
                            lineno,
                        );
                        node.push(Node::text(content, lineno));
                        vec![node]
                    },
                ),
                _ => self.substitution_reference(text, start, end, lineno, diagnostics),
            },
            Candidate::Reference {
                name,
                anonymous,
                start,
                end,
            } => self.simple_reference(text, &name, anonymous, start, end, lineno),
            Candidate::Footnote {
                label,
                citation,
                start,
                end,
            } => self.footnote_reference(text, &label, citation, start, end, lineno),
            Candidate::Backquote { role, start, tick } => {
                self.interpreted_or_phrase_ref(text, role, start, tick, lineno, diagnostics)
            }
        }
    }

    /// Shared start/end machinery for the symmetric constructs.
    #[allow(clippy::too_many_arguments)]
    fn span(
        &self,
        text: &str,
        start: usize,
        end: usize,
        end_pattern: &Regex,
        rule: PrevRule,
        restore: bool,
        construct: &str,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
        make: impl FnOnce(String, String) -> Vec<Node>,
    ) -> Outcome {
        match self.inline_obj(
            text,
            start,
            end,
            end_pattern,
            rule,
            restore,
            construct,
            lineno,
            diagnostics,
        ) {
            ObjResult::Quoted(outcome) | ObjResult::Failed(outcome) => outcome,
            ObjResult::Matched {
                before,
                remaining,
                content,
                raw,
                endstring: _,
            } => Outcome {
                before,
                inlines: make(content, raw),
                remaining,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn inline_obj(
        &self,
        text: &str,
        start: usize,
        end: usize,
        end_pattern: &Regex,
        rule: PrevRule,
        restore: bool,
        construct: &str,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ObjResult {
        if quoted_start(text, start, end) {
            trace!("quoted {construct} start-string at line {lineno}");
            return ObjResult::Quoted(Outcome {
                before: text[..end].to_string(),
                inlines: Vec::new(),
                remaining: text[end..].to_string(),
            });
        }
        let after = &text[end..];
        if let Some((estart, eend, endstring)) = find_end(after, end_pattern, rule)
            && estart > 0
        {
            let content = unescape(&after[..estart], restore);
            let textend = end + eend;
            let raw = unescape(&text[start..textend], true);
            return ObjResult::Matched {
                before: text[..start].to_string(),
                remaining: text[textend..].to_string(),
                content,
                raw,
                endstring,
            };
        }
        debug!("no end-string for inline {construct} at line {lineno}");
        diagnostics.push(Diagnostic::warning(
            format!("Inline {construct} start-string without end-string."),
            lineno,
        ));
        let prb_text = unescape(&text[start..end], true);
        let mut problematic = Node::with_raw(NodeKind::Problematic, prb_text.clone(), lineno);
        problematic.push(Node::text(prb_text, lineno));
        ObjResult::Failed(Outcome {
            before: text[..start].to_string(),
            inlines: vec![problematic],
            remaining: text[end..].to_string(),
        })
    }

    fn substitution_reference(
        &self,
        text: &str,
        start: usize,
        end: usize,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Outcome {
        match self.inline_obj(
            text,
            start,
            end,
            &self.regexes.substitution_end,
            PrevRule::NotWhitespaceOrNull,
            false,
            "substitution reference",
            lineno,
            diagnostics,
        ) {
            ObjResult::Quoted(outcome) | ObjResult::Failed(outcome) => outcome,
            ObjResult::Matched {
                before,
                remaining,
                content,
                raw,
                endstring,
            } => {
                let mut subref = Node::with_raw(
                    NodeKind::SubstitutionRef {
                        refname: whitespace_normalize_name(&content),
                    },
                    raw,
                    lineno,
                );
                subref.push(Node::text(content.clone(), lineno));
                // trailing underscores turn the substitution into a reference
                let node = if endstring.ends_with('_') {
                    let anonymous = endstring.ends_with("__");
                    let mut reference = Node::with_raw(
                        NodeKind::Reference {
                            refname: (!anonymous).then(|| fully_normalize_name(&content)),
                            refuri: None,
                            refid: None,
                            standalone: false,
                            anonymous,
                            embedded: false,
                        },
                        format!("|{content}{endstring}"),
                        lineno,
                    );
                    reference.push(subref);
                    reference
                } else {
                    subref
                };
                Outcome {
                    before,
                    inlines: vec![node],
                    remaining,
                }
            }
        }
    }

    fn simple_reference(
        &self,
        text: &str,
        name: &str,
        anonymous: bool,
        start: usize,
        end: usize,
        lineno: usize,
    ) -> Outcome {
        debug!("simple reference {name:?} at line {lineno}");
        let mut node = Node::with_raw(
            NodeKind::Reference {
                refname: (!anonymous).then(|| fully_normalize_name(name)),
                refuri: None,
                refid: None,
                standalone: false,
                anonymous,
                embedded: false,
            },
            &text[start..end],
            lineno,
        );
        node.push(Node::text(name, lineno));
        Outcome {
            before: text[..start].to_string(),
            inlines: vec![node],
            remaining: text[end..].to_string(),
        }
    }

    fn footnote_reference(
        &self,
        text: &str,
        label: &str,
        citation: bool,
        start: usize,
        end: usize,
        lineno: usize,
    ) -> Outcome {
        let raw = format!("[{label}]_");
        let node = if citation {
            let mut node = Node::with_raw(
                NodeKind::CitationRef {
                    refname: fully_normalize_name(label),
                },
                raw,
                lineno,
            );
            node.push(Node::text(label, lineno));
            node
        } else {
            let normalized = fully_normalize_name(label);
            let (auto, refname, keep_text) = if let Some(rest) = normalized.strip_prefix('#') {
                (
                    Some(AutoLabel::Number),
                    (!rest.is_empty()).then(|| rest.to_string()),
                    false,
                )
            } else if normalized == "*" {
                (Some(AutoLabel::Symbol), None, false)
            } else {
                (None, Some(normalized), true)
            };
            let mut node = Node::with_raw(
                NodeKind::FootnoteRef {
                    refname,
                    refid: None,
                    auto,
                },
                raw,
                lineno,
            );
            if keep_text {
                node.push(Node::text(label, lineno));
            }
            node
        };
        Outcome {
            before: text[..start].to_string(),
            inlines: vec![node],
            remaining: text[end..].to_string(),
        }
    }

    fn find_interpreted_end(&self, after: &str) -> Option<InterpretedEnd> {
        let mut from = 0;
        while let Some(caps) = self.regexes.interpreted_end.captures_at(after, from) {
            let whole = caps.get(0).expect("group 0");
            if prev_ok(after, whole.start(), PrevRule::NotUnescapedWhitespaceOrNull)
                && punctuation::valid_end_context(next_char(after, whole.end()))
            {
                return Some(InterpretedEnd {
                    start: whole.start(),
                    end: whole.end(),
                    role: caps.name("endrole").is_some(),
                    suffix: caps
                        .name("suffix")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                });
            }
            from = advance(after, whole.start());
        }
        None
    }

    fn problematic_outcome(
        &self,
        text: &str,
        start: usize,
        end: usize,
        lineno: usize,
    ) -> Outcome {
        let prb_text = unescape(&text[start..end], true);
        let mut problematic = Node::with_raw(NodeKind::Problematic, prb_text.clone(), lineno);
        problematic.push(Node::text(prb_text, lineno));
        Outcome {
            before: text[..start].to_string(),
            inlines: vec![problematic],
            remaining: text[end..].to_string(),
        }
    }

    fn interpreted_or_phrase_ref(
        &self,
        text: &str,
        role: Option<String>,
        start: usize,
        tick: usize,
        lineno: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Outcome {
        let matchend = tick + 1;
        if role.is_none() && quoted_start(text, tick, matchend) {
            return Outcome {
                before: text[..matchend].to_string(),
                inlines: Vec::new(),
                remaining: text[matchend..].to_string(),
            };
        }
        let after = &text[matchend..];
        let endmatch = self.find_interpreted_end(after).filter(|m| m.start > 0);
        let Some(endmatch) = endmatch else {
            diagnostics.push(Diagnostic::warning(
                "Inline interpreted text or phrase reference start-string without end-string."
                    .to_string(),
                lineno,
            ));
            let prb_text = unescape(&text[tick..matchend], true);
            let mut problematic =
                Node::with_raw(NodeKind::Problematic, prb_text.clone(), lineno);
            problematic.push(Node::text(prb_text, lineno));
            return Outcome {
                before: text[..tick].to_string(),
                inlines: vec![problematic],
                remaining: text[matchend..].to_string(),
            };
        };
        let textend = matchend + endmatch.end;
        let mut role = role;
        let mut position = if role.is_some() { "prefix" } else { "" };
        if endmatch.role {
            if role.is_some() {
                diagnostics.push(Diagnostic::warning(
                    "Multiple roles in interpreted text (both prefix and suffix present; \
                     only one allowed)."
                        .to_string(),
                    lineno,
                ));
                return self.problematic_outcome(text, start, textend, lineno);
            }
            let suffix = &endmatch.suffix;
            role = Some(suffix[1..suffix.len() - 1].to_string());
            position = "suffix";
        }
        let escaped = &after[..endmatch.start];
        let rawsource = unescape(&text[tick..textend], true);
        if rawsource.ends_with('_') {
            if role.is_some() {
                diagnostics.push(Diagnostic::warning(
                    format!("Mismatch: both interpreted text role {position} and reference suffix."),
                    lineno,
                ));
                return self.problematic_outcome(text, start, textend, lineno);
            }
            return self.phrase_ref(
                &text[..tick],
                &text[textend..],
                rawsource,
                escaped,
                lineno,
            );
        }
        let raw = unescape(&text[start..textend], true);
        let node = Node::with_raw(
            NodeKind::Role {
                name: role.filter(|r| !r.is_empty()),
                text: unescape(escaped, true),
            },
            raw,
            lineno,
        );
        Outcome {
            before: text[..start].to_string(),
            inlines: vec![node],
            remaining: text[textend..].to_string(),
        }
    }

    /// Embedded `<target>` alias at the end of a phrase reference, validated
    /// for the non-whitespace contexts around the brackets.
    fn find_embedded_link<'t>(&self, escaped: &'t str) -> Option<(usize, &'t str)> {
        let caps = self.regexes.embedded_link.captures(escaped)?;
        let whole = caps.name("elwhole").expect("elwhole");
        let inner = caps.name("elinner").expect("elinner");
        if inner.as_str().chars().next()?.is_whitespace() {
            return None;
        }
        if let Some(c) = prev_char(escaped, inner.end())
            && (c.is_whitespace() || c == '\0')
        {
            return None;
        }
        Some((whole.start(), inner.as_str()))
    }

    fn adjust_uri(&self, uri: String) -> String {
        if self.regexes.is_email(&uri) {
            format!("mailto:{uri}")
        } else {
            uri
        }
    }

    fn phrase_ref(
        &self,
        before: &str,
        after: &str,
        rawsource: String,
        escaped: &str,
        lineno: usize,
    ) -> Outcome {
        // (is_name, alias)
        let mut alias_info: Option<(bool, String)> = None;
        let mut node_text;
        if let Some((whole_start, inner)) = self.find_embedded_link(escaped) {
            node_text = unescape(&escaped[..whole_start], false);
            let aliastext = unescape(inner, false);
            let rawaliastext = unescape(inner, true);
            let underscore_escaped = rawaliastext.ends_with("\\_");
            if aliastext.ends_with('_')
                && !underscore_escaped
                && !self.regexes.uri_prefix_match(&aliastext)
            {
                let alias = fully_normalize_name(&aliastext[..aliastext.len() - 1]);
                alias_info = Some((true, alias));
            } else {
                let mut alias = split_escaped_whitespace(inner)
                    .iter()
                    .map(|part| unescape(part, false).split_whitespace().collect::<String>())
                    .collect::<Vec<_>>()
                    .join(" ");
                alias = self.adjust_uri(alias);
                if alias.ends_with("\\_") {
                    alias = format!("{}_", &alias[..alias.len() - 2]);
                }
                alias_info = Some((false, alias));
            }
            if node_text.is_empty() {
                node_text = alias_info.as_ref().expect("alias set").1.clone();
            }
        } else {
            node_text = unescape(escaped, false);
        }

        let anonymous_suffix = rawsource.ends_with("__");
        let (refname, refuri, anonymous) = match (&alias_info, anonymous_suffix) {
            (Some((true, alias)), _) => (Some(alias.clone()), None, false),
            (Some((false, alias)), _) => (None, Some(alias.clone()), false),
            (None, true) => (None, None, true),
            (None, false) => (Some(fully_normalize_name(&node_text)), None, false),
        };
        debug!("phrase reference {node_text:?} at line {lineno}");
        let mut reference = Node::with_raw(
            NodeKind::Reference {
                refname,
                refuri,
                refid: None,
                standalone: false,
                anonymous,
                embedded: alias_info.is_some(),
            },
            rawsource,
            lineno,
        );
        reference.push(Node::text(node_text, lineno));
        Outcome {
            before: before.to_string(),
            inlines: vec![reference],
            remaining: after.to_string(),
        }
    }

    /// Standalone URIs and optional PEP/RFC references in plain text,
    /// recursing on the stretches before and after each match.
    fn implicit_inline(&self, text: &str, lineno: usize) -> Vec<Node> {
        if text.is_empty() {
            return Vec::new();
        }
        if let Some((mstart, mend, node)) = self.find_uri(text, lineno) {
            let mut out = self.implicit_inline(&text[..mstart], lineno);
            out.push(node);
            out.extend(self.implicit_inline(&text[mend..], lineno));
            return out;
        }
        if self.pep_references
            && let Some((mstart, mend, node)) = self.find_pep(text, lineno)
        {
            let mut out = self.implicit_inline(&text[..mstart], lineno);
            out.push(node);
            out.extend(self.implicit_inline(&text[mend..], lineno));
            return out;
        }
        if self.rfc_references
            && let Some((mstart, mend, node)) = self.find_rfc(text, lineno)
        {
            let mut out = self.implicit_inline(&text[..mstart], lineno);
            out.push(node);
            out.extend(self.implicit_inline(&text[mend..], lineno));
            return out;
        }
        vec![Node::with_raw(
            NodeKind::Text {
                text: unescape(text, false),
            },
            unescape(text, true),
            lineno,
        )]
    }

    fn find_uri(&self, text: &str, lineno: usize) -> Option<(usize, usize, Node)> {
        let mut from = 0;
        while let Some(caps) = self.regexes.uri.captures_at(text, from) {
            let whole = caps.name("whole").expect("whole");
            if !punctuation::valid_start_context(prev_char(text, whole.start()))
                || !punctuation::valid_end_context(next_char(text, whole.end()))
            {
                from = advance(text, whole.start());
                continue;
            }
            if let Some(scheme) = caps.name("scheme")
                && !known_scheme(scheme.as_str())
            {
                // not URI-shaped after all; hand over to the next pattern
                return None;
            }
            let unescaped = unescape(whole.as_str(), false);
            let refuri = if caps.name("email").is_some() {
                format!("mailto:{unescaped}")
            } else {
                unescaped.clone()
            };
            debug!("standalone uri {refuri:?} at line {lineno}");
            let mut node = Node::with_raw(
                NodeKind::Reference {
                    refname: None,
                    refuri: Some(refuri),
                    refid: None,
                    standalone: true,
                    anonymous: false,
                    embedded: false,
                },
                unescape(whole.as_str(), true),
                lineno,
            );
            node.push(Node::text(unescaped, lineno));
            return Some((whole.start(), whole.end(), node));
        }
        None
    }

    fn find_pep(&self, text: &str, lineno: usize) -> Option<(usize, usize, Node)> {
        let mut from = 0;
        while let Some(caps) = self.regexes.pep.captures_at(text, from) {
            let whole = caps.get(0).expect("group 0");
            if !punctuation::valid_start_context(prev_char(text, whole.start()))
                || !punctuation::valid_end_context(next_char(text, whole.end()))
            {
                from = advance(text, whole.start());
                continue;
            }
            let num = caps
                .name("pepnum1")
                .or_else(|| caps.name("pepnum2"))
                .and_then(|m| m.as_str().parse::<u32>().ok())?;
            let refuri = format!("https://peps.python.org/pep-{num:04}");
            let unescaped = unescape(whole.as_str(), false);
            let mut node = Node::with_raw(
                NodeKind::Reference {
                    refname: None,
                    refuri: Some(refuri),
                    refid: None,
                    standalone: false,
                    anonymous: false,
                    embedded: false,
                },
                unescape(whole.as_str(), true),
                lineno,
            );
            node.push(Node::text(unescaped, lineno));
            return Some((whole.start(), whole.end(), node));
        }
        None
    }

    fn find_rfc(&self, text: &str, lineno: usize) -> Option<(usize, usize, Node)> {
        let mut from = 0;
        while let Some(caps) = self.regexes.rfc.captures_at(text, from) {
            let whole = caps.get(0).expect("group 0");
            if !punctuation::valid_start_context(prev_char(text, whole.start()))
                || !punctuation::valid_end_context(next_char(text, whole.end()))
            {
                from = advance(text, whole.start());
                continue;
            }
            let num = caps
                .name("rfcnum")
                .and_then(|m| m.as_str().parse::<u32>().ok())?;
            let refuri = format!("https://tools.ietf.org/html/rfc{num}.html");
            let unescaped = unescape(whole.as_str(), false);
            let mut node = Node::with_raw(
                NodeKind::Reference {
                    refname: None,
                    refuri: Some(refuri),
                    refid: None,
                    standalone: false,
                    anonymous: false,
                    embedded: false,
                },
                unescape(whole.as_str(), true),
                lineno,
            );
            node.push(Node::text(unescaped, lineno));
            return Some((whole.start(), whole.end(), node));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> (Vec<Node>, Vec<Diagnostic>) {
        crate::init_logger();
        let config = Config::default();
        let scanner = InlineScanner::new(&config);
        let mut diagnostics = Vec::new();
        let nodes = scanner.parse(text, 1, &mut diagnostics);
        (nodes, diagnostics)
    }

    fn kinds(nodes: &[Node]) -> Vec<&NodeKind> {
        nodes.iter().map(|n| &n.kind).collect()
    }

    #[test]
    fn escape_roundtrip() {
        let escaped = escape2null(r"a \* b");
        assert_eq!(escaped, "a \0* b");
        assert_eq!(unescape(&escaped, false), "a * b");
        assert_eq!(unescape(&escaped, true), r"a \* b");
        // escaped whitespace disappears
        assert_eq!(unescape("a\0 b", false), "ab");
    }

    #[test]
    fn plain_text_stays_plain() {
        let (nodes, diags) = scan("just some words");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 1);
        assert!(matches!(&nodes[0].kind, NodeKind::Text { text } if text == "just some words"));
    }

    #[test]
    fn emphasis_and_strong() {
        let (nodes, diags) = scan("a *b* and **c**");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 4);
        assert!(matches!(nodes[1].kind, NodeKind::Emphasis));
        assert_eq!(nodes[1].astext(), "b");
        assert!(matches!(nodes[3].kind, NodeKind::Strong));
        assert_eq!(nodes[3].astext(), "c");
    }

    #[test]
    fn escaped_star_is_not_markup() {
        let (nodes, diags) = scan(r"2 \* 3");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].astext(), "2 * 3");
    }

    #[test]
    fn quoted_start_is_consumed_silently() {
        let (nodes, diags) = scan("(*) item");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].astext(), "(*) item");
    }

    #[test]
    fn unclosed_emphasis_is_problematic() {
        let (nodes, diags) = scan("an *unclosed span");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("without end-string"));
        assert!(matches!(nodes[1].kind, NodeKind::Problematic));
        assert_eq!(nodes[1].astext(), "*");
    }

    #[test]
    fn literal_preserves_backslashes() {
        let (nodes, _) = scan(r"``a \n b``");
        assert!(matches!(nodes[0].kind, NodeKind::Literal));
        assert_eq!(nodes[0].astext(), r"a \n b");
    }

    #[test]
    fn simple_and_anonymous_references() {
        let (nodes, _) = scan("see Python_ and other__");
        match &nodes[1].kind {
            NodeKind::Reference {
                refname, anonymous, ..
            } => {
                assert_eq!(refname.as_deref(), Some("python"));
                assert!(!anonymous);
            }
            other => panic!("expected reference, got {other:?}"),
        }
        match &nodes[3].kind {
            NodeKind::Reference { anonymous, .. } => assert!(anonymous),
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn phrase_reference() {
        let (nodes, _) = scan("`two words`_");
        match &nodes[0].kind {
            NodeKind::Reference {
                refname, embedded, ..
            } => {
                assert_eq!(refname.as_deref(), Some("two words"));
                assert!(!embedded);
            }
            other => panic!("expected reference, got {other:?}"),
        }
        assert_eq!(nodes[0].astext(), "two words");
    }

    #[test]
    fn embedded_uri_reference() {
        let (nodes, _) = scan("`home <https://example.com>`_");
        match &nodes[0].kind {
            NodeKind::Reference {
                refuri, embedded, ..
            } => {
                assert_eq!(refuri.as_deref(), Some("https://example.com"));
                assert!(embedded);
            }
            other => panic!("expected reference, got {other:?}"),
        }
        assert_eq!(nodes[0].astext(), "home");
    }

    #[test]
    fn embedded_name_alias() {
        let (nodes, _) = scan("`text <name_>`_");
        match &nodes[0].kind {
            NodeKind::Reference {
                refname, refuri, ..
            } => {
                assert_eq!(refname.as_deref(), Some("name"));
                assert!(refuri.is_none());
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn embedded_email_gets_mailto() {
        let (nodes, _) = scan("`mail <user@example.com>`_");
        match &nodes[0].kind {
            NodeKind::Reference { refuri, .. } => {
                assert_eq!(refuri.as_deref(), Some("mailto:user@example.com"));
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn role_prefix_and_suffix() {
        let (nodes, _) = scan(":math:`x^2`");
        match &nodes[0].kind {
            NodeKind::Role { name, text } => {
                assert_eq!(name.as_deref(), Some("math"));
                assert_eq!(text, "x^2");
            }
            other => panic!("expected role, got {other:?}"),
        }

        let (nodes, _) = scan("`x^2`:math:");
        match &nodes[0].kind {
            NodeKind::Role { name, .. } => assert_eq!(name.as_deref(), Some("math")),
            other => panic!("expected role, got {other:?}"),
        }
    }

    #[test]
    fn bare_interpreted_text_has_no_role() {
        let (nodes, _) = scan("`interpreted`");
        match &nodes[0].kind {
            NodeKind::Role { name, text } => {
                assert!(name.is_none());
                assert_eq!(text, "interpreted");
            }
            other => panic!("expected role, got {other:?}"),
        }
    }

    #[test]
    fn double_role_is_problematic() {
        let (nodes, diags) = scan(":a:`x`:b:");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Multiple roles"));
        assert!(matches!(nodes[0].kind, NodeKind::Problematic));
    }

    #[test]
    fn footnote_reference_variants() {
        let (nodes, _) = scan("a [1]_ b [#]_ c [#lbl]_ d [*]_ e [CIT]_");
        let refs: Vec<&NodeKind> = kinds(&nodes)
            .into_iter()
            .filter(|k| {
                matches!(k, NodeKind::FootnoteRef { .. } | NodeKind::CitationRef { .. })
            })
            .collect();
        assert_eq!(refs.len(), 5);
        assert!(
            matches!(refs[0], NodeKind::FootnoteRef { refname: Some(n), auto: None, .. } if n == "1")
        );
        assert!(matches!(
            refs[1],
            NodeKind::FootnoteRef {
                refname: None,
                auto: Some(AutoLabel::Number),
                ..
            }
        ));
        assert!(
            matches!(refs[2], NodeKind::FootnoteRef { refname: Some(n), auto: Some(AutoLabel::Number), .. } if n == "lbl")
        );
        assert!(matches!(
            refs[3],
            NodeKind::FootnoteRef {
                auto: Some(AutoLabel::Symbol),
                ..
            }
        ));
        assert!(matches!(refs[4], NodeKind::CitationRef { refname } if refname == "cit"));
    }

    #[test]
    fn substitution_reference_and_reference_forms() {
        let (nodes, _) = scan("|sub|");
        assert!(matches!(&nodes[0].kind, NodeKind::SubstitutionRef { refname } if refname == "sub"));

        let (nodes, _) = scan("|sub|_");
        match &nodes[0].kind {
            NodeKind::Reference { refname, .. } => assert_eq!(refname.as_deref(), Some("sub")),
            other => panic!("expected reference, got {other:?}"),
        }
        assert!(matches!(
            nodes[0].children[0].kind,
            NodeKind::SubstitutionRef { .. }
        ));

        let (nodes, _) = scan("|sub|__");
        assert!(matches!(
            &nodes[0].kind,
            NodeKind::Reference { anonymous: true, .. }
        ));
    }

    #[test]
    fn inline_internal_target() {
        let (nodes, _) = scan("_`Some Target`");
        match &nodes[0].kind {
            NodeKind::Target { names, inline, .. } => {
                assert_eq!(names, &["some target".to_string()]);
                assert!(inline);
            }
            other => panic!("expected target, got {other:?}"),
        }
    }

    #[test]
    fn standalone_uri() {
        let (nodes, _) = scan("see https://example.com/a for details");
        match &nodes[1].kind {
            NodeKind::Reference {
                refuri, standalone, ..
            } => {
                assert_eq!(refuri.as_deref(), Some("https://example.com/a"));
                assert!(standalone);
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn uri_with_unknown_scheme_stays_text() {
        let (nodes, _) = scan("see notascheme:foo here");
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].kind, NodeKind::Text { .. }));
    }

    #[test]
    fn standalone_email_gets_mailto() {
        let (nodes, _) = scan("write user@example.com today");
        match &nodes[1].kind {
            NodeKind::Reference { refuri, .. } => {
                assert_eq!(refuri.as_deref(), Some("mailto:user@example.com"));
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn pep_and_rfc_references_are_opt_in() {
        let (nodes, _) = scan("as PEP 8 says");
        assert_eq!(nodes.len(), 1);

        let config = Config::builder()
            .pep_references(true)
            .rfc_references(true)
            .build();
        let scanner = InlineScanner::new(&config);
        let mut diags = Vec::new();
        let nodes = scanner.parse("as PEP 8 and RFC 2822 say", 1, &mut diags);
        let uris: Vec<String> = nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Reference { refuri: Some(u), .. } => Some(u.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            uris,
            vec![
                "https://peps.python.org/pep-0008".to_string(),
                "https://tools.ietf.org/html/rfc2822.html".to_string(),
            ]
        );
    }

    #[test]
    fn literal_wins_over_emphasis_inside() {
        let (nodes, diags) = scan("``*not emphasis*``");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].kind, NodeKind::Literal));
        assert_eq!(nodes[0].astext(), "*not emphasis*");
    }

    #[test]
    fn mid_word_underscore_is_not_a_reference() {
        let (nodes, diags) = scan("a_variable_name and more");
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 1);
        assert!(matches!(nodes[0].kind, NodeKind::Text { .. }));
    }
}
