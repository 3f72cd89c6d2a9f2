//! Token stream to MyST Markdown text.
//!
//! Blocks render independently and join with blank lines; reference
//! definitions collected in the [`Environment`] come last. Fence lengths
//! grow past the longest run of the fence character inside the content, so
//! nested fences always stay well formed.

use log::debug;
use serde_yaml::{Mapping, Value};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::lowering::Environment;
use crate::tokens::Token;

pub fn serialize(tokens: &[Token], env: &Environment, config: &Config) -> String {
    let serializer = TextSerializer { config };
    let mut blocks = serializer.render_blocks(tokens);
    if !env.references.is_empty() {
        let defs: Vec<String> = env
            .references
            .iter()
            .map(|def| format!("[{}]: {}", def.name, def.uri))
            .collect();
        blocks.push(defs.join("\n"));
    }
    debug!("serialized {} blocks", blocks.len());
    if blocks.is_empty() {
        return String::new();
    }
    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

struct TextSerializer<'a> {
    config: &'a Config,
}

impl TextSerializer<'_> {
    fn render_blocks(&self, tokens: &[Token]) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            match token.ttype {
                "front_matter_tokens" => {
                    out.push(self.render_front_matter(token));
                    i += 1;
                }
                "heading_open" => {
                    let close = close_index(tokens, i);
                    let text = self.render_inline_token(&tokens[i + 1]);
                    out.push(format!("{} {}", token.markup, text));
                    i = close + 1;
                }
                "paragraph_open" => {
                    let close = close_index(tokens, i);
                    out.push(self.render_inline_token(&tokens[i + 1]));
                    i = close + 1;
                }
                "fence" => {
                    out.push(render_fence(token));
                    i += 1;
                }
                "math_block" => {
                    out.push(format!("$$\n{}\n$$", token.content));
                    i += 1;
                }
                "hr" => {
                    out.push("---".to_string());
                    i += 1;
                }
                "blockquote_open" => {
                    let close = close_index(tokens, i);
                    let inner = self.render_blocks(&tokens[i + 1..close]).join("\n\n");
                    out.push(quote_lines(&inner));
                    i = close + 1;
                }
                "bullet_list_open" | "ordered_list_open" => {
                    let close = close_index(tokens, i);
                    out.push(self.render_list(token, &tokens[i + 1..close]));
                    i = close + 1;
                }
                "dl_open" => {
                    let close = close_index(tokens, i);
                    out.push(self.render_deflist(&tokens[i + 1..close]));
                    i = close + 1;
                }
                "table_open" => {
                    let close = close_index(tokens, i);
                    out.push(self.render_table(&tokens[i + 1..close]));
                    i = close + 1;
                }
                "footnote_block_open" => {
                    let close = close_index(tokens, i);
                    out.extend(self.render_footnotes(&tokens[i + 1..close]));
                    i = close + 1;
                }
                "directive" => {
                    out.push(self.render_directive(token));
                    i += 1;
                }
                "myst_target" => {
                    out.push(format!("({})=", token.content));
                    i += 1;
                }
                "myst_line_comment" => {
                    let lines: Vec<String> =
                        token.content.lines().map(|l| format!("%{l}")).collect();
                    out.push(lines.join("\n"));
                    i += 1;
                }
                _ => {
                    i += 1;
                }
            }
        }
        out
    }

    fn render_inline_token(&self, token: &Token) -> String {
        match &token.children {
            Some(children) => self.render_inline(children),
            None => token.content.clone(),
        }
    }

    fn render_inline(&self, tokens: &[Token]) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            match token.ttype {
                "text" => out.push_str(&token.content),
                "em_open" | "em_close" => out.push('*'),
                "strong_open" | "strong_close" => out.push_str("**"),
                "code_inline" => out.push_str(&render_code_inline(&token.content)),
                "link_open" => {
                    let close = close_index(tokens, i);
                    let inner = self.render_inline(&tokens[i + 1..close]);
                    if token.markup == "autolink" {
                        out.push_str(&format!(
                            "<{}>",
                            token.attr("href").unwrap_or_default()
                        ));
                    } else if let Some(label) = &token.meta.label {
                        if inner == *label {
                            out.push_str(&format!("[{inner}]"));
                        } else {
                            out.push_str(&format!("[{inner}][{label}]"));
                        }
                    } else {
                        out.push_str(&format!(
                            "[{inner}]({})",
                            token.attr("href").unwrap_or_default()
                        ));
                    }
                    i = close;
                }
                "footnote_ref" => {
                    let label = token.meta.label.as_deref().unwrap_or_default();
                    out.push_str(&format!("[^{label}]"));
                }
                "myst_role" => {
                    let name = token.meta.name.as_deref().unwrap_or_default();
                    let ticks = "`".repeat(longest_run(&token.content, '`') + 1);
                    out.push_str(&format!("{{{name}}}{ticks}{}{ticks}", token.content));
                }
                "math_inline" => out.push_str(&format!("${}$", token.content)),
                "substitution_inline" => {
                    out.push_str(&format!("{{{{ {} }}}}", token.content));
                }
                _ => {}
            }
            i += 1;
        }
        out
    }

    fn render_list(&self, open: &Token, inner: &[Token]) -> String {
        let ordered = open.ttype == "ordered_list_open";
        let start: u64 = open
            .attr("start")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let mut items = Vec::new();
        let mut tight = false;
        let mut i = 0;
        let mut index = 0u64;
        while i < inner.len() {
            if inner[i].ttype != "list_item_open" {
                i += 1;
                continue;
            }
            let close = close_index(inner, i);
            let item = &inner[i + 1..close];
            if item
                .iter()
                .any(|t| t.ttype == "paragraph_open" && t.hidden)
            {
                tight = true;
            }
            let marker = if ordered {
                let n = if self.config.consecutive_numbering {
                    start + index
                } else {
                    start
                };
                format!("{n}. ")
            } else {
                let bullet = open.markup.chars().next().unwrap_or('-');
                format!("{bullet} ")
            };
            let body = self.render_blocks(item).join("\n\n");
            let indent = " ".repeat(marker.len());
            items.push(prefix_lines(&body, &marker, &indent));
            index += 1;
            i = close + 1;
        }
        items.join(if tight { "\n" } else { "\n\n" })
    }

    fn render_deflist(&self, tokens: &[Token]) -> String {
        let mut groups: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut i = 0;
        while i < tokens.len() {
            match tokens[i].ttype {
                "dt_open" => {
                    if !current.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    let close = close_index(tokens, i);
                    current = self.render_inline_token(&tokens[i + 1]);
                    i = close + 1;
                }
                "dd_open" => {
                    let close = close_index(tokens, i);
                    let body = self.render_blocks(&tokens[i + 1..close]).join("\n\n");
                    current.push('\n');
                    current.push_str(&prefix_lines(&body, ": ", "  "));
                    i = close + 1;
                }
                _ => i += 1,
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups.join("\n\n")
    }

    fn render_table(&self, tokens: &[Token]) -> String {
        let mut head: Vec<Vec<String>> = Vec::new();
        let mut body: Vec<Vec<String>> = Vec::new();
        let mut in_head = false;
        let mut row: Vec<String> = Vec::new();
        for token in tokens {
            match token.ttype {
                "thead_open" => in_head = true,
                "thead_close" => in_head = false,
                "tr_open" => row = Vec::new(),
                "tr_close" => {
                    if in_head {
                        head.push(std::mem::take(&mut row));
                    } else {
                        body.push(std::mem::take(&mut row));
                    }
                }
                "inline" => row.push(self.render_inline_token(token)),
                _ => {}
            }
        }
        let columns = head
            .iter()
            .chain(body.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        let mut widths = vec![3usize; columns];
        for cells in head.iter().chain(body.iter()) {
            for (col, cell) in cells.iter().enumerate() {
                widths[col] = widths[col].max(cell.width());
            }
        }
        let format_row = |cells: &[String]| {
            let padded: Vec<String> = (0..columns)
                .map(|col| {
                    let cell = cells.get(col).map(String::as_str).unwrap_or("");
                    format!("{cell}{}", " ".repeat(widths[col] - cell.width()))
                })
                .collect();
            format!("| {} |", padded.join(" | "))
        };
        let mut lines = Vec::new();
        for cells in &head {
            lines.push(format_row(cells));
        }
        let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        lines.push(format!("| {} |", dashes.join(" | ")));
        for cells in &body {
            lines.push(format_row(cells));
        }
        lines.join("\n")
    }

    fn render_footnotes(&self, tokens: &[Token]) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].ttype != "footnote_open" {
                i += 1;
                continue;
            }
            let close = close_index(tokens, i);
            let label = tokens[i].meta.label.as_deref().unwrap_or_default();
            let body = self.render_blocks(&tokens[i + 1..close]).join("\n\n");
            let marker = format!("[^{label}]: ");
            out.push(prefix_lines(&body, &marker, "    "));
            i = close + 1;
        }
        out
    }

    fn render_directive(&self, token: &Token) -> String {
        let module = token.meta.module.as_deref().unwrap_or_default();
        let kids = token.children.as_deref().unwrap_or(&[]);
        let argument = kids.iter().find(|t| t.ttype == "directive_arg");
        let content = kids.iter().find(|t| t.ttype == "directive_content");

        if module == "misc.Replace" {
            return content
                .map(|c| self.render_directive_content(c))
                .unwrap_or_default();
        }
        if module == "misc.Date" {
            return "{sub-ref}`today`".to_string();
        }

        let name = token.meta.name.as_deref().unwrap_or_default();
        let info = argument
            .and_then(|a| a.children.as_deref())
            .map(|list| self.render_inline(list))
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!(" {}", s.split_whitespace().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default();

        let mut option_lines = Vec::new();
        for (key, value) in &token.meta.options {
            match value {
                Some(v) if v.contains('\n') => {
                    option_lines.push(format!(":{key}: |-"));
                    for line in v.lines() {
                        option_lines.push(format!("  {line}"));
                    }
                }
                Some(v) => option_lines.push(format!(":{key}: {v}")),
                None => option_lines.push(format!(":{key}:")),
            }
        }

        let body = content
            .map(|c| self.render_directive_content(c))
            .unwrap_or_default();

        let fence_char = if token.markup.contains(':') { ':' } else { '`' };
        let mut fence_len: usize = token
            .attr("fence")
            .and_then(|f| f.parse().ok())
            .unwrap_or(3);
        fence_len = fence_len.max(3).max(longest_run(&body, fence_char) + 1);
        let fence = fence_char.to_string().repeat(fence_len);

        let mut lines = vec![format!("{fence}{{{name}}}{info}")];
        lines.extend(option_lines.iter().cloned());
        if !body.is_empty() {
            if !option_lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(body.lines().map(str::to_string));
        }
        lines.push(fence);
        lines.join("\n")
    }

    fn render_directive_content(&self, content: &Token) -> String {
        let children = content.children.as_deref().unwrap_or(&[]);
        if children.len() == 1 && children[0].ttype == "text" {
            return children[0].content.trim_end_matches('\n').to_string();
        }
        self.render_blocks(children).join("\n\n")
    }

    fn render_front_matter(&self, token: &Token) -> String {
        let mut root = Mapping::new();
        for entry in token.children.as_deref().unwrap_or(&[]) {
            let blocks = self.render_blocks(entry.children.as_deref().unwrap_or(&[]));
            let value = if blocks.is_empty() {
                Value::Bool(true)
            } else {
                Value::String(blocks.join("\n\n"))
            };
            match entry.meta.key_path.as_slice() {
                [key] => {
                    root.insert(Value::String(key.clone()), value);
                }
                [section, key] => {
                    let section_key = Value::String(section.clone());
                    let nested = root
                        .entry(section_key)
                        .or_insert_with(|| Value::Mapping(Mapping::new()));
                    if let Value::Mapping(map) = nested {
                        map.insert(Value::String(key.clone()), value);
                    }
                }
                _ => {}
            }
        }
        let yaml = serde_yaml::to_string(&Value::Mapping(root)).unwrap_or_default();
        format!("---\n{}---", yaml)
    }
}

/// Index of the token closing the open token at `open`.
fn close_index(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        depth += i32::from(token.nesting);
        if depth == 0 {
            return i;
        }
    }
    tokens.len().saturating_sub(1)
}

fn render_fence(token: &Token) -> String {
    // a backtick in the info string would terminate a backtick fence
    let fence_char = if token.info.contains('`') { '~' } else { '`' };
    let len = 3.max(longest_run(&token.content, fence_char) + 1);
    let fence = fence_char.to_string().repeat(len);
    format!(
        "{fence}{}\n{}{fence}",
        token.info,
        token.content
    )
}

fn render_code_inline(content: &str) -> String {
    let ticks = "`".repeat(longest_run(content, '`') + 1);
    if content.starts_with('`') || content.ends_with('`') {
        format!("{ticks} {content} {ticks}")
    } else {
        format!("{ticks}{content}{ticks}")
    }
}

/// Length of the longest consecutive run of `ch` in `text`.
fn longest_run(text: &str, ch: char) -> usize {
    let mut best = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == ch {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                format!("{first}{line}")
            } else if line.is_empty() {
                String::new()
            } else {
                format!("{rest}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
