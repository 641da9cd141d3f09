// src/pdf/layout.rs
//! Position-based table detection for the fixed JPX filing layouts.
//!
//! Works on the positioned text runs of one page:
//! - runs whose baselines are within half an em share a line;
//! - runs on a line closer than one em belong to the same cell;
//! - a gap between lines well above the page's usual line pitch starts a new table;
//! - columns are the x-extents covered by cells of multi-cell lines, so a
//!   single cell under the value column becomes a blank-label row (`["", value]`);
//! - single-cell lines at the top of a table are a caption, split into their own table.

use super::TableGrid;

/// Baselines closer than this (in ems) are one line.
const LINE_TOLERANCE_EMS: f32 = 0.5;
/// Horizontal gap (in ems) that separates two cells on a line.
const CELL_GAP_EMS: f32 = 1.0;
/// Smaller gaps inside a cell still become a space above this (in ems).
const WORD_GAP_EMS: f32 = 0.2;
/// Line gap, as a multiple of the median pitch, that separates tables.
const BLOCK_GAP_FACTOR: f32 = 1.8;

/// A string shown on a page, in user space (y grows upwards).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub size: f32,
    pub text: String,
}

impl TextRun {
    fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    left: f32,
    right: f32,
    text: String,
}

impl Chunk {
    fn center(&self) -> f32 {
        (self.left + self.right) / 2.0
    }
}

#[derive(Debug)]
struct Line {
    y: f32,
    chunks: Vec<Chunk>,
}

/// Page text, top to bottom, one line per output line.
pub fn text_from_runs(runs: &[TextRun]) -> String {
    cluster_into_lines(runs)
        .iter()
        .map(|line| {
            line.chunks
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits a page's runs into table grids, top to bottom.
pub fn tables_from_runs(runs: &[TextRun]) -> Vec<TableGrid> {
    split_blocks(cluster_into_lines(runs))
        .iter()
        .flat_map(|block| grids_from_block(block))
        .collect()
}

fn cluster_into_lines(runs: &[TextRun]) -> Vec<Line> {
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|run| !run.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut groups: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match groups.last_mut() {
            Some(group) if same_line(group[0], run) => group.push(run),
            _ => groups.push(vec![run]),
        }
    }

    groups.into_iter().map(line_from_runs).collect()
}

fn same_line(first: &TextRun, run: &TextRun) -> bool {
    (first.y - run.y).abs() <= LINE_TOLERANCE_EMS * first.size.max(run.size)
}

fn line_from_runs(mut runs: Vec<&TextRun>) -> Line {
    runs.sort_by(|a, b| a.x.total_cmp(&b.x));
    let y = runs.first().map(|run| run.y).unwrap_or_default();

    let mut chunks: Vec<Chunk> = Vec::new();
    for run in runs {
        let em = run.size.max(1.0);
        match chunks.last_mut() {
            Some(chunk) if run.x - chunk.right <= CELL_GAP_EMS * em => {
                if run.x - chunk.right > WORD_GAP_EMS * em && !chunk.text.ends_with(char::is_whitespace) {
                    chunk.text.push(' ');
                }
                chunk.text.push_str(&run.text);
                chunk.right = chunk.right.max(run.right());
            }
            _ => chunks.push(Chunk {
                left: run.x,
                right: run.right(),
                text: run.text.clone(),
            }),
        }
    }
    for chunk in &mut chunks {
        chunk.text = chunk.text.trim().to_string();
    }

    Line { y, chunks }
}

fn split_blocks(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let pitches: Vec<f32> = lines.windows(2).map(|pair| pair[0].y - pair[1].y).collect();
    let limit = median(pitches).map(|pitch| pitch * BLOCK_GAP_FACTOR);

    let mut blocks = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    for line in lines {
        let gap = current.last().map(|previous| previous.y - line.y);
        if let (Some(gap), Some(limit)) = (gap, limit) {
            if gap > limit {
                blocks.push(std::mem::take(&mut current));
            }
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    Some(values[values.len() / 2])
}

fn grids_from_block(block: &[Line]) -> Vec<TableGrid> {
    let columns = column_spans(block);
    let mut rows: Vec<Vec<String>> = block.iter().map(|line| assign_cells(line, &columns)).collect();

    let caption_len = rows.iter().take_while(|row| row.len() == 1).count();
    if caption_len > 0 && caption_len < rows.len() {
        let body = rows.split_off(caption_len);
        vec![TableGrid::new(rows), TableGrid::new(body)]
    } else {
        vec![TableGrid::new(rows)]
    }
}

/// Merged x-extents of the cells on lines with more than one cell.
fn column_spans(block: &[Line]) -> Vec<(f32, f32)> {
    let mut spans: Vec<(f32, f32)> = block
        .iter()
        .filter(|line| line.chunks.len() > 1)
        .flat_map(|line| line.chunks.iter().map(|chunk| (chunk.left, chunk.right)))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f32, f32)> = Vec::new();
    for (left, right) in spans {
        match merged.last_mut() {
            Some(last) if left <= last.1 => last.1 = last.1.max(right),
            _ => merged.push((left, right)),
        }
    }
    merged
}

/// Cells of one line, trailing blanks dropped.
fn assign_cells(line: &Line, columns: &[(f32, f32)]) -> Vec<String> {
    if columns.is_empty() {
        let joined = line
            .chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        return vec![joined];
    }

    let mut cells = vec![String::new(); columns.len()];
    for chunk in &line.chunks {
        let cell = &mut cells[column_of(chunk, columns)];
        if !cell.is_empty() {
            cell.push(' ');
        }
        cell.push_str(&chunk.text);
    }
    while cells.last().is_some_and(String::is_empty) {
        cells.pop();
    }
    cells
}

fn column_of(chunk: &Chunk, columns: &[(f32, f32)]) -> usize {
    let center = chunk.center();
    let distance = |&(left, right): &(f32, f32)| {
        if center < left {
            left - center
        } else if center > right {
            center - right
        } else {
            0.0
        }
    };
    columns
        .iter()
        .enumerate()
        .min_by(|a, b| distance(a.1).total_cmp(&distance(b.1)))
        .map(|(index, _)| index)
        .unwrap_or(0)
}
