//! Grid and simple tables.
//!
//! Only span-free tables keep their structure; anything with merged cells,
//! misaligned boundaries or a missing border is recorded as a malformed
//! table carrying its raw text, to be re-emitted verbatim.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::error::Diagnostic;
use crate::nodes::{Node, NodeKind};

use super::{is_blank, BlockLine, BlockParser, Ctx};

static GRID_TOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+(?:-+\+)+$").expect("grid top border"));

static SIMPLE_BORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=+(?: +=+)+ *$").expect("simple table border"));

impl BlockParser<'_> {
    pub(crate) fn try_parse_grid_table(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        if !GRID_TOP.is_match(&lines[i].text) {
            return None;
        }
        let mut j = i;
        while j < lines.len()
            && !is_blank(&lines[j].text)
            && lines[j].text.starts_with(['+', '|'])
        {
            j += 1;
        }
        let abs = lines[i].abs;
        let raw = join_raw(&lines[i..j]);
        match self.parse_grid(&lines[i..j], ctx, diags) {
            Ok(mut table) => {
                table.raw = raw;
                debug!("grid table at line {abs}");
                parent.push(table);
            }
            Err(message) => {
                diags.push(Diagnostic::markup_error(
                    format!("Malformed table. {message}"),
                    abs,
                ));
                parent.push(Node::with_raw(NodeKind::Table { malformed: true }, raw, abs));
            }
        }
        Some(j)
    }

    fn parse_grid(
        &self,
        block: &[BlockLine],
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Node, String> {
        let abs = block[0].abs;
        let top: Vec<char> = block[0].text.chars().collect();
        let width = top.len();
        let boundaries: Vec<usize> = top
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == '+')
            .map(|(k, _)| k)
            .collect();
        let ncols = boundaries.len() - 1;

        let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
        let mut head_split: Option<usize> = None;
        let mut pending: Vec<Vec<String>> = vec![Vec::new(); ncols];
        let mut pending_abs: Option<usize> = None;

        for line in &block[1..] {
            let chars: Vec<char> = line.text.chars().collect();
            if chars.len() != width {
                return Err("Column boundaries are not aligned.".to_string());
            }
            if chars[0] == '+' {
                let sep = if chars.contains(&'=') { '=' } else { '-' };
                for (k, &c) in chars.iter().enumerate() {
                    let at_boundary = boundaries.contains(&k);
                    if at_boundary && c != '+' {
                        return Err("Cell spans are not supported.".to_string());
                    }
                    if !at_boundary && c != sep {
                        return Err("Cell spans are not supported.".to_string());
                    }
                }
                if let Some(row_abs) = pending_abs.take() {
                    let cells = pending
                        .iter_mut()
                        .map(|lines| std::mem::take(lines).join("\n"))
                        .collect();
                    rows.push((row_abs, cells));
                }
                if sep == '=' {
                    if head_split.is_some() {
                        return Err("Multiple head/body separators.".to_string());
                    }
                    head_split = Some(rows.len());
                }
            } else {
                for &b in &boundaries {
                    if chars.get(b) != Some(&'|') {
                        return Err("Cell spans are not supported.".to_string());
                    }
                }
                for k in 0..ncols {
                    let segment: String =
                        chars[boundaries[k] + 1..boundaries[k + 1]].iter().collect();
                    pending[k].push(segment.trim_end().to_string());
                }
                pending_abs.get_or_insert(line.abs);
            }
        }
        if pending_abs.is_some() {
            return Err("No bottom table border found.".to_string());
        }
        Ok(self.build_table(abs, ncols, rows, head_split, ctx, diags))
    }

    pub(crate) fn try_parse_simple_table(
        &self,
        lines: &[BlockLine],
        i: usize,
        parent: &mut Node,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<usize> {
        if !SIMPLE_BORDER.is_match(&lines[i].text) {
            return None;
        }
        let abs = lines[i].abs;
        // the closing border is a border line followed by a blank or EOF
        let mut end: Option<usize> = None;
        let mut j = i + 1;
        while j < lines.len() {
            if is_blank(&lines[j].text) {
                break;
            }
            if SIMPLE_BORDER.is_match(&lines[j].text)
                && (j + 1 >= lines.len() || is_blank(&lines[j + 1].text))
            {
                end = Some(j);
                break;
            }
            j += 1;
        }
        let Some(end) = end else {
            let raw = join_raw(&lines[i..j]);
            diags.push(Diagnostic::markup_error(
                "Malformed table. No bottom table border found.",
                abs,
            ));
            parent.push(Node::with_raw(NodeKind::Table { malformed: true }, raw, abs));
            return Some(j);
        };
        let raw = join_raw(&lines[i..=end]);
        match self.parse_simple(&lines[i..=end], ctx, diags) {
            Ok(mut table) => {
                table.raw = raw;
                debug!("simple table at line {abs}");
                parent.push(table);
            }
            Err(message) => {
                diags.push(Diagnostic::markup_error(
                    format!("Malformed table. {message}"),
                    abs,
                ));
                parent.push(Node::with_raw(NodeKind::Table { malformed: true }, raw, abs));
            }
        }
        Some(end + 1)
    }

    fn parse_simple(
        &self,
        block: &[BlockLine],
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Node, String> {
        let abs = block[0].abs;
        let border: Vec<char> = block[0].text.chars().collect();
        let mut columns: Vec<(usize, usize)> = Vec::new();
        let mut k = 0;
        while k < border.len() {
            if border[k] == '=' {
                let start = k;
                while k < border.len() && border[k] == '=' {
                    k += 1;
                }
                columns.push((start, k));
            } else {
                k += 1;
            }
        }
        let ncols = columns.len();

        let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
        let mut head_split: Option<usize> = None;
        for line in &block[1..block.len() - 1] {
            if SIMPLE_BORDER.is_match(&line.text) {
                if head_split.is_some() {
                    return Err("Multiple head/body separators.".to_string());
                }
                head_split = Some(rows.len());
                continue;
            }
            let chars: Vec<char> = line.text.chars().collect();
            // text in the gaps between columns means a span
            for w in columns.windows(2) {
                let gap = &chars[w[0].1.min(chars.len())..w[1].0.min(chars.len())];
                if gap.iter().any(|&c| c != ' ') {
                    return Err("Cell spans are not supported.".to_string());
                }
            }
            let mut cells: Vec<String> = Vec::new();
            for (idx, &(start, end)) in columns.iter().enumerate() {
                let hi = if idx + 1 == ncols { chars.len() } else { end.min(chars.len()) };
                let lo = start.min(chars.len());
                let segment: String = chars[lo..hi].iter().collect();
                cells.push(segment.trim_end().to_string());
            }
            if cells[0].is_empty()
                && let Some((_, last)) = rows.last_mut()
            {
                // continuation of the previous row
                for (cell, extra) in last.iter_mut().zip(&cells) {
                    if !extra.is_empty() {
                        cell.push('\n');
                        cell.push_str(extra);
                    }
                }
            } else {
                rows.push((line.abs, cells));
            }
        }
        Ok(self.build_table(abs, ncols, rows, head_split, ctx, diags))
    }

    fn build_table(
        &self,
        abs: usize,
        ncols: usize,
        rows: Vec<(usize, Vec<String>)>,
        head_split: Option<usize>,
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        let mut table = Node::new(NodeKind::Table { malformed: false }, abs);
        let mut tgroup = Node::new(NodeKind::TGroup { cols: ncols }, abs);
        let split = head_split.unwrap_or(0);
        if split > 0 {
            let mut thead = Node::new(NodeKind::THead, abs);
            for (row_abs, cells) in &rows[..split] {
                thead.push(self.build_row(*row_abs, cells, ctx, diags));
            }
            tgroup.push(thead);
        }
        let mut tbody = Node::new(NodeKind::TBody, abs);
        for (row_abs, cells) in &rows[split..] {
            tbody.push(self.build_row(*row_abs, cells, ctx, diags));
        }
        tgroup.push(tbody);
        table.push(tgroup);
        table
    }

    fn build_row(
        &self,
        abs: usize,
        cells: &[String],
        ctx: &mut Ctx,
        diags: &mut Vec<Diagnostic>,
    ) -> Node {
        let mut row = Node::new(NodeKind::Row, abs);
        for cell in cells {
            let mut entry = Node::new(NodeKind::Entry, abs);
            let lines = dedent_cell(cell, abs);
            self.parse_blocks(&lines, &mut entry, 0, false, ctx, diags);
            row.push(entry);
        }
        row
    }
}

fn join_raw(lines: &[BlockLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn dedent_cell(cell: &str, abs: usize) -> Vec<BlockLine> {
    let lines: Vec<&str> = cell.lines().collect();
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| BlockLine {
            text: if l.trim().is_empty() {
                String::new()
            } else {
                l[min_indent..].to_string()
            },
            abs,
        })
        .collect()
}
