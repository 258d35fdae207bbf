//! Rebuilds a table from its tagged boxes.
//!
//! Boxes are partitioned into rows by their row band (falling back to
//! vertical position) and into columns by their column band (falling back to
//! horizontal position). The resulting dense grid is then cleaned up:
//!
//! - a column holding a single filled cell is folded into the nearer
//!   neighbouring column once the table has at least four rows, and a row
//!   holding a single filled cell likewise once it has at least four columns.
//!   Outliers are handled leftmost first, then topmost first
//! - header rows are detected from header bands, or for numeric tables from
//!   non-numeric rows
//! - spanning cells are expanded over every row and column whose midpoint lies
//!   within the span, and all covered slots point at one [`TableCell`]
//!
//! A [`TableGrid`] renders either as HTML or as one sentence per data row.

use super::StageContext;
use crate::core::TableOutput;
use crate::domain::{TableContent, TextBox};
use crate::processors::{
    BlockType, Rect, Spatial, block_type, join_fragments, mean, sort_by_column_index,
    sort_by_row_index, sort_columns_first, sort_rows_first,
};
use itertools::Itertools;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};
use std::ops::RangeInclusive;

/// Grid outliers are only relocated along an axis with at least this many lines.
const RELOCATION_MIN_LINES: usize = 4;
/// Slack (page units) under the running row bottom before a box opens a new row.
const ROW_BREAK_SLACK: f32 = 3.0;
/// Verbalized rows shorter than this are packed onto the previous line.
const PACKED_ROW_CHARS: usize = 64;

/// A box on its way into the grid.
#[derive(Debug, Clone)]
struct Placed {
    b: TextBox,
    kind: BlockType,
    row: usize,
    col: usize,
}

impl Spatial for Placed {
    fn rect(&self) -> &Rect {
        &self.b.rect
    }

    fn row_index(&self) -> Option<usize> {
        self.b.table.row_index()
    }

    fn column_index(&self) -> Option<usize> {
        self.b.table.column_index()
    }
}

/// One rendered cell. A spanning cell is referenced from every slot it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub text: String,
    /// Top-left slot.
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

/// A reconstructed table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGrid {
    pub cells: Vec<TableCell>,
    /// `slots[r][c]` indexes into `cells`; `None` is an empty slot.
    pub slots: Vec<Vec<Option<usize>>>,
    pub header_rows: BTreeSet<usize>,
    pub caption: String,
    pub is_english: bool,
}

/// Rebuilds and renders a table in the configured output format.
///
/// Returns `None` when nothing but captions was found.
pub fn construct_table(boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Option<TableContent> {
    let grid = TableGrid::build(boxes, ctx)?;
    Some(match ctx.config.table_output {
        TableOutput::Html => TableContent::Html(grid.to_html()),
        TableOutput::Verbalized => TableContent::Verbalized(grid.verbalize()),
    })
}

fn has_text(cell: &[usize], placed: &[Placed]) -> bool {
    cell.first().is_some_and(|&k| !placed[k].b.text.is_empty())
}

fn slot_text(members: &[usize], placed: &[Placed], ctx: &StageContext<'_>) -> String {
    if members.is_empty() {
        return String::new();
    }
    let mut parts: Vec<&Placed> = members.iter().map(|&k| &placed[k]).collect();
    let min_height = parts
        .iter()
        .map(|p| p.b.rect.height())
        .fold(f32::INFINITY, f32::min);
    let threshold = (min_height / 2.0).min(ctx.pages.mean_height(parts[0].b.page) / 2.0);
    sort_rows_first(&mut parts, threshold);
    parts
        .iter()
        .map(|p| p.b.text.trim())
        .filter(|t| !t.is_empty())
        .fold(String::new(), |acc, t| join_fragments(&acc, t))
}

/// Assigns row numbers: same row band, or no band and no vertical break.
fn partition_rows(placed: &mut [Placed]) -> usize {
    let row_height = placed
        .iter()
        .filter_map(|p| p.b.table.row.map(|r| r.bottom - r.top))
        .fold(f32::INFINITY, f32::min);
    let row_height = if row_height.is_finite() { row_height } else { 0.0 };
    sort_by_row_index(placed, row_height / 2.0);

    let mut row = 0;
    let mut bottom = placed[0].b.rect.bottom;
    placed[0].row = 0;
    for k in 1..placed.len() {
        let new_row = match (placed[k - 1].row_index(), placed[k].row_index()) {
            (Some(a), Some(b)) => a != b,
            (None, None) => placed[k].b.rect.top >= bottom - ROW_BREAK_SLACK,
            _ => true,
        };
        if new_row {
            row += 1;
            bottom = placed[k].b.rect.bottom;
        } else {
            bottom = (bottom + placed[k].b.rect.bottom) / 2.0;
        }
        placed[k].row = row;
    }
    row + 1
}

/// Assigns column numbers: the next column band, or a box starting right of
/// the running column edge without sharing its band.
fn partition_columns(placed: &mut [Placed]) -> usize {
    let col_width = placed
        .iter()
        .filter_map(|p| p.b.table.column.map(|c| c.right - c.left))
        .fold(f32::INFINITY, f32::min);
    let col_width = if col_width.is_finite() { col_width } else { 0.0 };
    let cross_page = placed.iter().map(|p| p.b.page).unique().count() > 1;
    if cross_page {
        sort_columns_first(placed, col_width / 2.0);
    } else {
        sort_by_column_index(placed, col_width / 2.0);
    }

    let mut col = 0;
    let mut right = placed[0].b.rect.x1;
    placed[0].col = 0;
    for k in 1..placed.len() {
        let (prev, cur) = (&placed[k - 1], &placed[k]);
        let (pc, cc) = (prev.column_index(), cur.column_index());
        let next_band = cc.map_or(1, |c| c as i64) - pc.map_or(1, |c| c as i64) == 1
            && cur.b.page == prev.b.page;
        let same_band = matches!((pc, cc), (Some(a), Some(b)) if a == b);
        if next_band || (cur.b.rect.x0 >= right && !same_band) {
            col += 1;
            right = cur.b.rect.x1;
        } else {
            right = (right + cur.b.rect.x1) / 2.0;
        }
        placed[k].col = col;
    }
    col + 1
}

type Grid = Vec<Vec<Vec<usize>>>;

fn column_count(grid: &Grid) -> usize {
    grid.first().map_or(0, Vec::len)
}

fn min_gap(members: impl Iterator<Item = f32>) -> f32 {
    members.fold(f32::INFINITY, f32::min)
}

/// Folds single-cell columns into a neighbour, leftmost first.
fn relocate_single_columns(grid: &mut Grid, placed: &[Placed]) {
    let mut j = 0;
    while j < column_count(grid) {
        let filled: Vec<usize> = (0..grid.len()).filter(|&i| !grid[i][j].is_empty()).collect();
        let [ii] = filled[..] else {
            j += 1;
            continue;
        };
        let cols = column_count(grid);
        let left_ok = j == 0 || has_text(&grid[ii][j - 1], placed);
        let right_ok = j + 1 >= cols || has_text(&grid[ii][j + 1], placed);
        if left_ok && right_ok {
            j += 1;
            continue;
        }

        let lone = placed[grid[ii][j][0]].b.rect;
        let left = if left_ok {
            f32::INFINITY
        } else {
            min_gap(grid.iter().flat_map(|row| &row[j - 1]).map(|&k| lone.x0 - placed[k].b.rect.x1))
        };
        let right = if right_ok {
            f32::INFINITY
        } else {
            min_gap(grid.iter().flat_map(|row| &row[j + 1]).map(|&k| placed[k].b.rect.x0 - lone.x1))
        };
        if left.is_infinite() && right.is_infinite() {
            j += 1;
            continue;
        }
        let target = if left < right { j - 1 } else { j + 1 };
        tracing::debug!(target: "table", text = %placed[grid[ii][j][0]].b.text, from = j, to = target, "relocating lone column cell");
        let moved = std::mem::take(&mut grid[ii][j]);
        grid[ii][target].extend(moved);
        for row in grid.iter_mut() {
            row.remove(j);
        }
    }
}

/// Folds single-cell rows into a neighbour, topmost first.
fn relocate_single_rows(grid: &mut Grid, placed: &[Placed]) {
    let mut i = 0;
    while i < grid.len() {
        let filled: Vec<usize> = (0..grid[i].len()).filter(|&j| !grid[i][j].is_empty()).collect();
        let [jj] = filled[..] else {
            i += 1;
            continue;
        };
        let up_ok = i == 0 || has_text(&grid[i - 1][jj], placed);
        let down_ok = i + 1 >= grid.len() || has_text(&grid[i + 1][jj], placed);
        if up_ok && down_ok {
            i += 1;
            continue;
        }

        let lone = placed[grid[i][jj][0]].b.rect;
        let up = if up_ok {
            f32::INFINITY
        } else {
            min_gap(grid[i - 1].iter().flatten().map(|&k| lone.top - placed[k].b.rect.bottom))
        };
        let down = if down_ok {
            f32::INFINITY
        } else {
            min_gap(grid[i + 1].iter().flatten().map(|&k| placed[k].b.rect.top - lone.bottom))
        };
        if up.is_infinite() && down.is_infinite() {
            i += 1;
            continue;
        }
        let target = if up < down { i - 1 } else { i + 1 };
        tracing::debug!(target: "table", text = %placed[grid[i][jj][0]].b.text, from = i, to = target, "relocating lone row cell");
        let moved = std::mem::take(&mut grid[i][jj]);
        grid[target][jj].extend(moved);
        grid.remove(i);
    }
}

/// Drops rows and columns left without any box.
fn prune_empty(grid: &mut Grid) {
    grid.retain(|row| row.iter().any(|c| !c.is_empty()));
    let cols = column_count(grid);
    let keep: Vec<bool> = (0..cols)
        .map(|j| grid.iter().any(|row| !row[j].is_empty()))
        .collect();
    for row in grid.iter_mut() {
        let mut j = 0;
        row.retain(|_| {
            let kept = keep[j];
            j += 1;
            kept
        });
    }
}

/// Rows where most filled cells are header-tagged, or, in a numeric table,
/// are not numbers.
fn detect_header_rows(grid: &Grid, placed: &[Placed]) -> BTreeSet<usize> {
    let numeric = placed
        .iter()
        .map(|p| p.kind)
        .min_by_key(|kind| Reverse(placed.iter().filter(|p| p.kind == *kind).count()))
        == Some(BlockType::Nu);

    let mut headers = BTreeSet::new();
    for (i, row) in grid.iter().enumerate() {
        let mut filled = 0usize;
        let mut header = 0usize;
        for cell in row.iter().filter(|c| !c.is_empty()) {
            filled += 1;
            let first = &placed[cell[0]];
            if numeric && first.kind == BlockType::Nu {
                continue;
            }
            if cell.iter().any(|&k| placed[k].b.table.header.is_some()) || numeric {
                header += 1;
            }
        }
        if filled > 0 && header * 2 > filled {
            headers.insert(i);
        }
    }
    headers
}

/// Row and column ranges a spanning box covers, judged by band midpoints.
fn span_cover(
    extent: &Rect,
    at: (usize, usize),
    row_bands: &[(f32, f32)],
    col_bands: &[(f32, f32)],
) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let mut rows = BTreeSet::from([at.0]);
    let mut cols = BTreeSet::from([at.1]);
    for (j, &(left, right)) in col_bands.iter().enumerate() {
        let mid = left + (right - left) / 2.0;
        if mid >= extent.x0 && mid <= extent.x1 {
            cols.insert(j);
        }
    }
    for (i, &(top, bottom)) in row_bands.iter().enumerate() {
        let mid = top + (bottom - top) / 2.0;
        if mid >= extent.top && mid <= extent.bottom {
            rows.insert(i);
        }
    }
    (rows, cols)
}

/// Mean band edges of a grid line; boxes without a band use their own edges.
fn mean_extent<'a>(
    members: impl Iterator<Item = &'a usize>,
    placed: &[Placed],
    pick: impl Fn(&Placed) -> (f32, f32),
) -> (f32, f32) {
    let (a, b): (Vec<f32>, Vec<f32>) = members.map(|&k| pick(&placed[k])).unzip();
    (mean(&a), mean(&b))
}

fn full_range(set: &BTreeSet<usize>, fallback: usize) -> RangeInclusive<usize> {
    let first = set.first().copied().unwrap_or(fallback);
    let last = set.last().copied().unwrap_or(fallback);
    first..=last
}

impl TableGrid {
    /// Builds the grid from one table's boxes; caption-shaped boxes become
    /// the caption.
    pub fn build(boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Option<Self> {
        let (captions, body): (Vec<TextBox>, Vec<TextBox>) = boxes.into_iter().partition(|b| {
            ctx.patterns.is_caption(&b.text) || b.layout_kind().is_some_and(|k| k.is_caption())
        });
        let caption: String = captions.iter().map(|b| b.text.trim()).collect();
        if body.is_empty() {
            return None;
        }

        let mut placed: Vec<Placed> = body
            .into_iter()
            .map(|b| Placed {
                kind: block_type(&b.text),
                b,
                row: 0,
                col: 0,
            })
            .collect();
        let rows = partition_rows(&mut placed);
        let cols = partition_columns(&mut placed);

        let mut grid: Grid = vec![vec![Vec::new(); cols]; rows];
        for (k, p) in placed.iter().enumerate() {
            grid[p.row][p.col].push(k);
        }
        if grid.len() >= RELOCATION_MIN_LINES {
            relocate_single_columns(&mut grid, &placed);
        }
        if column_count(&grid) >= RELOCATION_MIN_LINES {
            relocate_single_rows(&mut grid, &placed);
        }
        prune_empty(&mut grid);

        let header_rows = detect_header_rows(&grid, &placed);
        let (cells, slots) = Self::expand_spans(&grid, &placed, ctx);
        tracing::debug!(
            target: "table",
            rows = slots.len(),
            columns = slots.first().map_or(0, Vec::len),
            headers = ?header_rows,
            caption = %caption,
            "table reconstructed"
        );
        Some(Self {
            cells,
            slots,
            header_rows,
            caption,
            is_english: ctx.is_english,
        })
    }

    fn expand_spans(
        grid: &Grid,
        placed: &[Placed],
        ctx: &StageContext<'_>,
    ) -> (Vec<TableCell>, Vec<Vec<Option<usize>>>) {
        let rows = grid.len();
        let cols = column_count(grid);
        let col_bands: Vec<(f32, f32)> = (0..cols)
            .map(|j| {
                mean_extent(grid.iter().flat_map(|row| &row[j]), placed, |p| {
                    p.b.table.column.map_or((p.b.rect.x0, p.b.rect.x1), |c| (c.left, c.right))
                })
            })
            .collect();
        let row_bands: Vec<(f32, f32)> = grid
            .iter()
            .map(|row| {
                mean_extent(row.iter().flatten(), placed, |p| {
                    p.b.table.row.map_or((p.b.rect.top, p.b.rect.bottom), |r| (r.top, r.bottom))
                })
            })
            .collect();

        let mut cells: Vec<TableCell> = Vec::new();
        let mut slots: Vec<Vec<Option<usize>>> = vec![vec![None; cols]; rows];
        for i in 0..rows {
            for j in 0..cols {
                if slots[i][j].is_some() || grid[i][j].is_empty() {
                    continue;
                }
                let mut span_rows = BTreeSet::new();
                let mut span_cols = BTreeSet::new();
                for &k in &grid[i][j] {
                    let role = &placed[k].b.table;
                    if let (Some(_), Some(extent)) = (role.span, role.span_extent) {
                        let (r, c) = span_cover(&extent, (i, j), &row_bands, &col_bands);
                        span_rows.extend(r);
                        span_cols.extend(c);
                    }
                }
                let (row_range, col_range) = if span_rows.len() < 2 && span_cols.len() < 2 {
                    (i..=i, j..=j)
                } else {
                    (full_range(&span_rows, i), full_range(&span_cols, j))
                };

                let index = cells.len();
                let mut members: Vec<usize> = Vec::new();
                let mut claimed: Vec<(usize, usize)> = Vec::new();
                for r in row_range {
                    for c in col_range.clone() {
                        if slots[r][c].is_some() {
                            continue;
                        }
                        let text = slot_text(&grid[r][c], placed, ctx);
                        if !grid[r][c].is_empty() && text != slot_text(&members, placed, ctx) {
                            members.extend(&grid[r][c]);
                        }
                        slots[r][c] = Some(index);
                        claimed.push((r, c));
                    }
                }
                let (row, col) = claimed.first().copied().unwrap_or((i, j));
                let row_span = claimed.iter().map(|(r, _)| r).unique().count();
                let col_span = claimed.iter().map(|(_, c)| c).unique().count();
                cells.push(TableCell {
                    text: slot_text(&members, placed, ctx),
                    row,
                    col,
                    row_span,
                    col_span,
                });
            }
        }
        (cells, slots)
    }

    pub fn row_count(&self) -> usize {
        self.slots.len()
    }

    pub fn column_count(&self) -> usize {
        self.slots.first().map_or(0, Vec::len)
    }

    /// Text of the cell covering a slot; empty for an empty slot.
    pub fn text_at(&self, row: usize, col: usize) -> &str {
        self.slots
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .flatten()
            .map_or("", |idx| self.cells[idx].text.as_str())
    }

    /// Renders a `<table>`; header rows use `<th>` and a header row repeating
    /// only already seen header texts is skipped.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<table>");
        if !self.caption.is_empty() {
            html.push_str(&format!("<caption>{}</caption>", escape_html(&self.caption)));
        }
        let mut seen_headers: HashSet<&str> = HashSet::new();
        for (i, row) in self.slots.iter().enumerate() {
            let is_header = self.header_rows.contains(&i);
            let tag = if is_header { "th" } else { "td" };
            let mut cells_html = String::new();
            let mut texts: Vec<&str> = Vec::new();
            for (j, slot) in row.iter().enumerate() {
                let Some(idx) = slot else {
                    cells_html.push_str(&format!("<{tag}></{tag}>"));
                    continue;
                };
                let cell = &self.cells[*idx];
                if (cell.row, cell.col) != (i, j) {
                    continue;
                }
                texts.push(cell.text.as_str());
                let mut attrs = String::new();
                if cell.col_span > 1 {
                    attrs.push_str(&format!(" colspan={}", cell.col_span));
                }
                if cell.row_span > 1 {
                    attrs.push_str(&format!(" rowspan={}", cell.row_span));
                }
                cells_html.push_str(&format!("<{tag}{attrs}>{}</{tag}>", escape_html(&cell.text)));
            }
            if is_header {
                if texts.iter().all(|t| seen_headers.contains(t)) {
                    continue;
                }
                seen_headers.extend(texts);
            }
            if !cells_html.is_empty() {
                html.push_str(&format!("\n<tr>{cells_html}</tr>"));
            }
        }
        html.push_str("\n</table>");
        html
    }

    /// Flattened header text per header row, with multi-row headers joined
    /// top-down. Header rows without any text are left out.
    fn header_texts(&self) -> Vec<(usize, Vec<String>)> {
        let cols = self.column_count();
        let joiner = if self.is_english { " for " } else { "的" };
        let mut headers: Vec<(usize, Vec<String>)> = Vec::new();
        for &r in &self.header_rows {
            let mut texts: Vec<String> = (0..cols).map(|j| self.text_at(r, j).to_string()).collect();
            if texts.iter().all(String::is_empty) {
                continue;
            }
            if let Some((prev_row, prev)) = headers.last() {
                for j in 0..cols {
                    if texts[j].is_empty() {
                        texts[j] = prev[j].clone();
                    }
                }
                if *prev_row + 1 == r {
                    for j in 0..cols {
                        let (parent, child) = (&prev[j], &texts[j]);
                        if parent.is_empty() || child.contains(parent.as_str()) {
                            continue;
                        }
                        texts[j] = if child.chars().count() > parent.chars().count() {
                            format!("{child}{joiner}{parent}")
                        } else {
                            format!("{parent}{joiner}{child}")
                        };
                    }
                }
            }
            headers.push((r, texts));
        }
        headers
    }

    /// One sentence per data row: `header: value` pairs joined by `; `, using
    /// the nearest header row above. Tables of at most two columns without a
    /// header join bare values, packing short rows together.
    pub fn verbalize(&self) -> Vec<String> {
        let cols = self.column_count();
        let headers = self.header_texts();
        let (kv, pair_sep) = if self.is_english { (": ", "; ") } else { ("：", "; ") };
        let mut lines: Vec<String> = Vec::new();
        for i in 0..self.row_count() {
            if self.header_rows.contains(&i) {
                continue;
            }
            let header = headers.iter().rev().find(|(r, _)| *r < i).map(|(_, h)| h);
            let values = (0..cols).map(|j| (j, self.text_at(i, j))).filter(|(_, t)| !t.is_empty());

            let Some(header) = header else {
                if cols <= 2 {
                    let row = values.map(|(_, t)| t).join(kv);
                    if row.is_empty() {
                        continue;
                    }
                    match lines.last_mut() {
                        Some(last) if last.chars().count() + row.chars().count() < PACKED_ROW_CHARS => {
                            last.push('\n');
                            last.push_str(&row);
                        }
                        _ => lines.push(row),
                    }
                    continue;
                }
                let row = values.map(|(_, t)| t).join(pair_sep);
                if !row.is_empty() {
                    lines.push(row);
                }
                continue;
            };
            let row = values
                .map(|(j, t)| {
                    if header[j].is_empty() {
                        t.to_string()
                    } else {
                        format!("{}{kv}{t}", header[j])
                    }
                })
                .join(pair_sep);
            if !row.is_empty() {
                lines.push(row);
            }
        }

        if !self.caption.is_empty() {
            let suffix = if self.is_english {
                format!("\t—— in “{}”", self.caption)
            } else {
                format!("\t——来自“{}”", self.caption)
            };
            for line in &mut lines {
                line.push_str(&suffix);
            }
        }
        lines
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
