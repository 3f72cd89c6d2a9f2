//! Bullet, enumerated, definition, field and option lists, plus line blocks.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::error::Diagnostic;
use crate::nodes::{Node, NodeKind};

use super::{get_indented, indent_of, is_blank, BlockLine, BlockParser, Ctx};

const BULLET_CHARS: &[char] = &['*', '+', '-'];

/// Field marker `:name:` at the start of a line; the name may contain
/// escaped colons.
pub(crate) static FIELD_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<name>[^:\\ ](?:\\.|[^:\\])*):(?: +(?P<rest>.*))?$").expect("field marker")
});

static OPTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:-[a-zA-Z0-9]|--[a-zA-Z0-9]|/[A-Za-z]|\+[a-zA-Z0-9])").expect("option marker")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumClass {
    Arabic,
    AlphaLower,
    AlphaUpper,
    RomanLower,
    RomanUpper,
    Auto,
}

static ENUMERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<paren>\()?(?P<ord>[0-9]+|\#|[ivxlcdm]{2,}|[IVXLCDM]{2,}|[a-z]|[A-Z])(?P<fmt>[.)])(?: +|$)",
    )
    .expect("enumerator")
});

fn roman_to_int(text: &str) -> Option<u64> {
    let value = |c: char| match c.to_ascii_lowercase() {
        'i' => Some(1u64),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        'd' => Some(500),
        'm' => Some(1000),
        _ => None,
    };
    let mut total = 0u64;
    let chars: Vec<char> = text.chars().collect();
    for (idx, &c) in chars.iter().enumerate() {
        let v = value(c)?;
        if chars.get(idx + 1).and_then(|&n| value(n)).is_some_and(|n| n > v) {
            total = total.checked_sub(v).unwrap_or(0);
        } else {
            total += v;
        }
    }
    Some(total)
}

/// Classify an enumerator and compute its ordinal.
fn classify_enumerator(ord: &str, paren: bool, fmt: &str) -> (EnumClass, Option<u64>, String) {
    let class;
    let ordinal;
    if ord == "#" {
        class = EnumClass::Auto;
        ordinal = None;
    } else if ord.chars().all(|c| c.is_ascii_digit()) {
        class = EnumClass::Arabic;
        ordinal = ord.parse::<u64>().ok();
    } else if ord.len() >= 2 && ord.chars().all(|c| "ivxlcdm".contains(c)) {
        class = EnumClass::RomanLower;
        ordinal = roman_to_int(ord);
    } else if ord.len() >= 2 && ord.chars().all(|c| "IVXLCDM".contains(c)) {
        class = EnumClass::RomanUpper;
        ordinal = roman_to_int(ord);
    } else if ord.chars().all(|c| c.is_ascii_lowercase()) {
        class = EnumClass::AlphaLower;
        ordinal = ord.chars().next().map(|c| (c as u64) - ('a' as u64) + 1);
    } else {
        class = EnumClass::AlphaUpper;
        ordinal = ord.chars().next().map(|c| (c as u64) - ('A' as u64) + 1);
    }
    let shape = format!("{}{}", if paren { "()" } else { "" }, fmt);
    (class, ordinal, shape)
}

/// Bullet marker at the start of a line: the bullet char and the byte offset
/// where item content starts.
fn bullet_marker(text: &str) -> Option<(char, usize)> {
    let mut chars = text.chars();
    let c = chars.next()?;
    if !BULLET_CHARS.contains(&c) {
        return None;
    }
    match chars.next() {
        None => Some((c, 2)),
        Some(' ') => {
            let rest = &text[2..];
            let extra = rest.len() - rest.trim_start_matches(' ').len();
            Some((c, 2 + extra))
        }
        Some(_) => None,
    }
}

/// Collect one list item's block: the remainder of the marker line plus the
/// following lines indented to the content column.
fn collect_item(lines: &[BlockLine], i: usize, content_offset: usize) -> (Vec<BlockLine>, usize) {
    let first = &lines[i];
    let mut item = Vec::new();
    let mut indent = content_offset;
    if first.text.len() > content_offset {
        item.push(BlockLine {
            text: first.text[content_offset..].to_string(),
            abs: first.abs,
        });
    } else {
        // empty first line: the next non-blank line sets the indent
        let mut peek = i + 1;
        while peek < lines.len() && is_blank(&lines[peek].text) {
            peek += 1;
        }
        if peek < lines.len() && indent_of(&lines[peek].text) > 0 {
            indent = indent_of(&lines[peek].text);
        } else {
            return (item, i + 1);
        }
    }
    let mut end = i + 1;
    while end < lines.len() && (is_blank(&lines[end].text) || indent_of(&lines[end].text) >= indent)
    {
        let line = &lines[end];
        item.push(BlockLine {
            text: if is_blank(&line.text) {
                String::new()
            } else {
                line.text[indent..].to_string()
            },
            abs: line.abs,
        });
        end += 1;
    }
    while item.last().is_some_and(|l| is_blank(&l.text)) {
        item.pop();
    }
    (item, end)
}

impl BlockParser<'_> {
    pub(crate) fn try_parse_bullet_list(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        let (bullet, _) = bullet_marker(&lines[i].text)?;
        let abs = lines[i].abs;
        debug!("bullet list ({bullet:?}) at line {abs}");
        let mut list = Node::new(NodeKind::BulletList { bullet, tight: false }, abs);
        let mut j = i;
        while j < lines.len() {
            if is_blank(&lines[j].text) {
                j += 1;
                continue;
            }
            if indent_of(&lines[j].text) > 0 {
                break;
            }
            let Some((b, offset)) = bullet_marker(&lines[j].text) else {
                break;
            };
            if b != bullet {
                break;
            }
            let item_abs = lines[j].abs;
            let (item_lines, next) = collect_item(lines, j, offset);
            let mut item = Node::new(
                NodeKind::ListItem {
                    style: None,
                    prefix: None,
                },
                item_abs,
            );
            self.parse_blocks(&item_lines, &mut item, 0, false, ctx, diags);
            list.push(item);
            j = next;
        }
        parent.push(list);
        Some(j)
    }

    pub(crate) fn try_parse_enumerated_list(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        let caps = ENUMERATOR.captures(&lines[i].text)?;
        let (class, first_ordinal, shape) = classify_enumerator(
            &caps["ord"],
            caps.name("paren").is_some(),
            &caps["fmt"],
        );
        if caps.name("paren").is_some() && &caps["fmt"] != ")" {
            return None;
        }
        let abs = lines[i].abs;
        let start = first_ordinal.filter(|&n| n != 1);
        debug!("enumerated list at line {abs} (start {start:?})");
        let mut list = Node::new(NodeKind::EnumeratedList { start, tight: false }, abs);
        let mut j = i;
        while j < lines.len() {
            if is_blank(&lines[j].text) {
                j += 1;
                continue;
            }
            if indent_of(&lines[j].text) > 0 {
                break;
            }
            let Some(caps) = ENUMERATOR.captures(&lines[j].text) else {
                break;
            };
            let (item_class, _, item_shape) = classify_enumerator(
                &caps["ord"],
                caps.name("paren").is_some(),
                &caps["fmt"],
            );
            if item_class != class || item_shape != shape {
                break;
            }
            let offset = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let item_abs = lines[j].abs;
            let (item_lines, next) = collect_item(lines, j, offset.min(lines[j].text.len()));
            let mut item = Node::new(
                NodeKind::ListItem {
                    style: None,
                    prefix: None,
                },
                item_abs,
            );
            self.parse_blocks(&item_lines, &mut item, 0, false, ctx, diags);
            list.push(item);
            j = next;
        }
        parent.push(list);
        Some(j)
    }

    /// Term line directly followed by an indented definition block.
    pub(crate) fn parse_definition_list(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> usize {
        let abs = lines[i].abs;
        debug!("definition list at line {abs}");
        let mut list = Node::new(NodeKind::DefinitionList, abs);
        let mut j = i;
        while j < lines.len() {
            if is_blank(&lines[j].text) {
                j += 1;
                continue;
            }
            if indent_of(&lines[j].text) > 0 {
                break;
            }
            if j + 1 >= lines.len()
                || is_blank(&lines[j + 1].text)
                || indent_of(&lines[j + 1].text) == 0
            {
                break;
            }
            let term_line = &lines[j];
            let (term_text, classifiers) = split_classifiers(term_line.text.trim_end());
            let mut item = Node::new(NodeKind::DefinitionItem, term_line.abs);
            let mut term = Node::with_raw(
                NodeKind::Term {
                    classifiers: classifiers.clone(),
                },
                &term_text,
                term_line.abs,
            );
            term.children = self.inline_children(&term_text, term_line.abs, diags);
            item.push(term);
            let (def_block, next) = get_indented(lines, j + 1);
            let def_abs = def_block.first().map(|l| l.abs).unwrap_or(term_line.abs);
            let mut definition = Node::new(NodeKind::Definition, def_abs);
            self.parse_blocks(&def_block, &mut definition, 0, false, ctx, diags);
            item.push(definition);
            list.push(item);
            j = next;
        }
        parent.push(list);
        j
    }

    pub(crate) fn try_parse_field_list(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        FIELD_MARKER.captures(&lines[i].text)?;
        let abs = lines[i].abs;
        debug!("field list at line {abs}");
        let mut list = Node::new(NodeKind::FieldList, abs);
        let mut j = i;
        while j < lines.len() {
            if is_blank(&lines[j].text) {
                j += 1;
                continue;
            }
            if indent_of(&lines[j].text) > 0 {
                break;
            }
            let Some(caps) = FIELD_MARKER.captures(&lines[j].text) else {
                break;
            };
            let field_abs = lines[j].abs;
            let name = caps["name"].to_string();
            let mut body_block: Vec<BlockLine> = Vec::new();
            if let Some(rest) = caps.name("rest") {
                body_block.push(BlockLine {
                    text: rest.as_str().to_string(),
                    abs: field_abs,
                });
            }
            let (cont, next) = get_indented(lines, j + 1);
            body_block.extend(cont);
            let mut field = Node::new(NodeKind::Field, field_abs);
            field.push(Node::with_raw(
                NodeKind::FieldName { name: name.clone() },
                &name,
                field_abs,
            ));
            let mut body = Node::new(NodeKind::FieldBody, field_abs);
            self.parse_blocks(&body_block, &mut body, 0, false, ctx, diags);
            field.push(body);
            list.push(field);
            j = next;
        }
        parent.push(list);
        Some(j)
    }

    /// Option lists keep their raw text; they have no Markdown counterpart
    /// and are re-emitted verbatim.
    pub(crate) fn try_parse_option_list(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
    ) -> Option<usize> {
        if !OPTION_MARKER.is_match(&lines[i].text) {
            return None;
        }
        let abs = lines[i].abs;
        let mut j = i;
        loop {
            while j < lines.len() && !is_blank(&lines[j].text) {
                j += 1;
            }
            let mut peek = j;
            while peek < lines.len() && is_blank(&lines[peek].text) {
                peek += 1;
            }
            if peek < lines.len()
                && (indent_of(&lines[peek].text) > 0 || OPTION_MARKER.is_match(&lines[peek].text))
            {
                j = peek;
            } else {
                break;
            }
        }
        let raw = lines[i..j]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!("option list at line {abs}");
        parent.push(Node::with_raw(NodeKind::OptionList, raw, abs));
        Some(j)
    }

    /// Line blocks also keep their raw text.
    pub(crate) fn try_parse_line_block(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
    ) -> Option<usize> {
        if !is_line_block_line(&lines[i].text) {
            return None;
        }
        let abs = lines[i].abs;
        let mut j = i;
        while j < lines.len()
            && (is_line_block_line(&lines[j].text)
                || (!is_blank(&lines[j].text) && indent_of(&lines[j].text) > 0))
        {
            j += 1;
        }
        let raw = lines[i..j]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!("line block at line {abs}");
        parent.push(Node::with_raw(NodeKind::LineBlock, raw, abs));
        Some(j)
    }
}

fn is_line_block_line(text: &str) -> bool {
    text == "|" || text.starts_with("| ")
}

/// Split a definition term on ` : ` classifier delimiters.
fn split_classifiers(term: &str) -> (String, Vec<String>) {
    let mut parts = term.split(" : ");
    let text = parts.next().unwrap_or(term).trim_end().to_string();
    let classifiers = parts.map(|p| p.trim().to_string()).collect();
    (text, classifiers)
}
