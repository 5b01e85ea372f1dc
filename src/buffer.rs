//! A reference text host: rope-backed storage with a monospace wrap layout.
//!
//! Geometry uses a fixed cell grid. Every character occupies `cell_width`
//! times its terminal column width, rows are `line_height` tall, and a soft
//! wrap limit splits logical lines into fragments. That is enough to exercise
//! every layout query the caret engine and completion popover need.

use ropey::Rope;
use unicode_width::UnicodeWidthChar;

use crate::host::{DocumentEdit, LayoutQuery, TextContent};
use crate::types::{Direction, LineFragment, Location, MoveUnit, Point, Rect, TextRange};

const DEFAULT_CELL_WIDTH: f64 = 8.0;
const DEFAULT_LINE_HEIGHT: f64 = 16.0;
/// Baseline offset from the fragment top, as a fraction of line height.
const ASCENT_RATIO: f64 = 0.75;

/// Character classes used for word-boundary scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharCategory {
    Whitespace,
    Word,
    Punctuation,
}

fn char_category(ch: char) -> CharCategory {
    if ch.is_whitespace() {
        CharCategory::Whitespace
    } else if ch.is_alphanumeric() || ch == '_' {
        CharCategory::Word
    } else {
        CharCategory::Punctuation
    }
}

fn char_cells(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(1)
}

/// One laid-out visual row. `end` includes the trailing newline when this is
/// the last fragment of its logical line; `visible_end` never does.
#[derive(Debug, Clone, Copy)]
struct Row {
    start: usize,
    end: usize,
    visible_end: usize,
}

pub struct Buffer {
    text: Rope,
    wrap_columns: Option<usize>,
    cell_width: f64,
    line_height: f64,
}

impl Buffer {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: Rope::from_str(&normalize_newlines(text)),
            wrap_columns: None,
            cell_width: DEFAULT_CELL_WIDTH,
            line_height: DEFAULT_LINE_HEIGHT,
        }
    }

    /// A buffer that soft-wraps logical lines at `columns` cells.
    pub fn with_wrap(text: &str, columns: usize) -> Self {
        let mut buf = Self::from_text(text);
        buf.wrap_columns = Some(columns.max(1));
        buf
    }

    pub fn len_chars(&self) -> usize {
        self.text.len_chars()
    }

    pub fn to_text(&self) -> String {
        self.text.to_string()
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    /// Lay out the whole document into visual rows.
    fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        let mut line_start = 0usize;
        let total = self.text.len_chars();
        for line in self.text.lines() {
            let line_len = line.len_chars();
            let has_newline = line_len > 0 && line.char(line_len - 1) == '\n';
            let visible_len = if has_newline { line_len - 1 } else { line_len };

            let mut seg_start = 0usize;
            let mut seg_cols = 0usize;
            for (i, ch) in line.chars().take(visible_len).enumerate() {
                let w = char_cells(ch);
                if let Some(limit) = self.wrap_columns {
                    if seg_cols + w > limit && seg_cols > 0 {
                        rows.push(Row {
                            start: line_start + seg_start,
                            end: line_start + i,
                            visible_end: line_start + i,
                        });
                        seg_start = i;
                        seg_cols = 0;
                    }
                }
                seg_cols += w;
            }
            rows.push(Row {
                start: line_start + seg_start,
                end: line_start + line_len,
                visible_end: line_start + visible_len,
            });
            line_start += line_len;
        }
        if rows.is_empty() {
            rows.push(Row {
                start: total,
                end: total,
                visible_end: total,
            });
        }
        rows
    }

    fn row_index_at(&self, rows: &[Row], at: usize) -> usize {
        for (i, row) in rows.iter().enumerate() {
            if at >= row.start && at < row.end {
                return i;
            }
        }
        rows.len() - 1
    }

    fn fragment_for_row(&self, rows: &[Row], index: usize) -> LineFragment {
        let row = rows[index];
        let width: f64 = self
            .text
            .slice(row.start..row.visible_end)
            .chars()
            .map(|ch| char_cells(ch) as f64 * self.cell_width)
            .sum();
        let y = index as f64 * self.line_height;
        LineFragment {
            range: TextRange::new(Location::new(row.start), Location::new(row.end)),
            bounds: Rect {
                x: 0.0,
                y,
                width,
                height: self.line_height,
            },
            baseline: Point {
                x: 0.0,
                y: y + self.line_height * ASCENT_RATIO,
            },
        }
    }

    /// Word-boundary scan shared by forward and backward word moves.
    fn word_destination(&self, from: usize, forward: bool) -> Option<usize> {
        let len = self.text.len_chars();
        if forward {
            if from >= len {
                return None;
            }
            let mut i = from;
            let start_cat = char_category(self.text.char(i));
            // Skip the remainder of the current run, then any whitespace.
            while i < len && char_category(self.text.char(i)) == start_cat {
                i += 1;
            }
            while i < len && char_category(self.text.char(i)) == CharCategory::Whitespace {
                i += 1;
            }
            Some(i)
        } else {
            if from == 0 {
                return None;
            }
            let mut i = from;
            while i > 0 && char_category(self.text.char(i - 1)) == CharCategory::Whitespace {
                i -= 1;
            }
            if i == 0 {
                return Some(0);
            }
            let cat = char_category(self.text.char(i - 1));
            while i > 0 && char_category(self.text.char(i - 1)) == cat {
                i -= 1;
            }
            Some(i)
        }
    }

    /// Step one visual row up or down, keeping the character offset into the
    /// row. Column correction is the caret engine's job, not the layout's.
    fn vertical_destination(&self, from: usize, down: bool) -> Option<usize> {
        let rows = self.rows();
        let index = self.row_index_at(&rows, from);
        let target = if down {
            if index + 1 >= rows.len() {
                return None;
            }
            index + 1
        } else {
            index.checked_sub(1)?
        };
        let offset = from - rows[index].start;
        let row = rows[target];
        let max = row.visible_end - row.start;
        Some(row.start + offset.min(max))
    }
}

impl LayoutQuery for Buffer {
    fn document_range(&self) -> TextRange {
        TextRange::new(Location::new(0), Location::new(self.text.len_chars()))
    }

    fn line_fragment(&self, at: Location) -> Option<LineFragment> {
        if self.text.len_chars() == 0 {
            return None;
        }
        let rows = self.rows();
        let index = self.row_index_at(&rows, at.raw());
        Some(self.fragment_for_row(&rows, index))
    }

    fn character_index(&self, point: Point, fragment: &LineFragment) -> Option<usize> {
        if point.x < 0.0 {
            return Some(0);
        }
        if point.x >= fragment.bounds.max_x() {
            return None;
        }
        let start = fragment.range.start().raw();
        let end = fragment.range.end().raw();
        let mut x = 0.0f64;
        for (i, ch) in self.text.slice(start..end).chars().enumerate() {
            if ch == '\n' {
                break;
            }
            let w = char_cells(ch) as f64 * self.cell_width;
            if point.x < x + w {
                return Some(i);
            }
            x += w;
        }
        None
    }

    fn caret_position(&self, fragment: &LineFragment, index: usize) -> Point {
        let start = fragment.range.start().raw();
        let end = fragment.range.end().raw();
        let x = self
            .text
            .slice(start..end)
            .chars()
            .take(index)
            .filter(|ch| *ch != '\n')
            .map(|ch| char_cells(ch) as f64 * self.cell_width)
            .sum();
        Point {
            x,
            y: fragment.bounds.y,
        }
    }

    fn destination(&self, from: Location, direction: Direction, unit: MoveUnit) -> Option<Location> {
        let raw = from.raw();
        let len = self.text.len_chars();
        let target = match (direction, unit) {
            (Direction::Up, _) => self.vertical_destination(raw, false)?,
            (Direction::Down, _) => self.vertical_destination(raw, true)?,
            (Direction::Forward, MoveUnit::Character) => {
                if raw >= len {
                    return None;
                }
                raw + 1
            }
            (Direction::Backward, MoveUnit::Character) => raw.checked_sub(1)?,
            (Direction::Forward, MoveUnit::Word) => self.word_destination(raw, true)?,
            (Direction::Backward, MoveUnit::Word) => self.word_destination(raw, false)?,
            (Direction::Forward, MoveUnit::Line) => {
                let rows = self.rows();
                let row = rows[self.row_index_at(&rows, raw)];
                row.visible_end
            }
            (Direction::Backward, MoveUnit::Line) => {
                let rows = self.rows();
                let row = rows[self.row_index_at(&rows, raw)];
                row.start
            }
        };
        Some(Location::new(target))
    }

    fn enumerate_line_fragments(
        &self,
        from: Location,
        visitor: &mut dyn FnMut(&LineFragment) -> bool,
    ) {
        if self.text.len_chars() == 0 {
            return;
        }
        let rows = self.rows();
        let first = self.row_index_at(&rows, from.raw());
        for index in first..rows.len() {
            let fragment = self.fragment_for_row(&rows, index);
            if !visitor(&fragment) {
                break;
            }
        }
    }

    fn location(&self, from: Location, offset: isize) -> Option<Location> {
        let raw = isize::try_from(from.raw()).ok()?.checked_add(offset)?;
        let raw = usize::try_from(raw).ok()?;
        (raw <= self.text.len_chars()).then(|| Location::new(raw))
    }

    fn offset(&self, from: Location, to: Location) -> usize {
        to.raw().saturating_sub(from.raw())
    }
}

impl TextContent for Buffer {
    fn text_in(&self, range: TextRange) -> String {
        let start = range.start().raw().min(self.text.len_chars());
        let end = range.end().raw().min(self.text.len_chars());
        self.text.slice(start..end).to_string()
    }
}

impl DocumentEdit for Buffer {
    fn apply_edit(&mut self, range: TextRange, replacement: &str) -> bool {
        let len = self.text.len_chars();
        if range.end().raw() > len {
            return false;
        }
        self.text.remove(range.start().raw()..range.end().raw());
        self.text
            .insert(range.start().raw(), &normalize_newlines(replacement));
        true
    }
}

/// CRLF and lone CR both become LF on the way in.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
