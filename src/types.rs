//! Common types used throughout the editing control layer.

use std::cmp::Ordering;

/// An opaque position in the logical document.
///
/// Locations are minted by the host layout engine; the control layer only
/// compares them and hands them back. The raw value is *not* a byte offset —
/// hosts are free to use char indices, UTF-16 offsets, or anything else that
/// orders correctly.
///
/// A `Location` is valid only for the document snapshot it was derived from.
/// Comparing or resolving it against a later snapshot is undefined; re-resolve
/// through the host after an edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location(usize);

impl Location {
    /// Mint a location from a host-defined raw value.
    ///
    /// Only host layout implementations (and script plugins, which see raw
    /// values as integers) should call this.
    pub fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// The host-defined raw value. Opaque to the control layer.
    pub fn raw(self) -> usize {
        self.0
    }

    /// Three-way comparison: before / same / after.
    pub fn compare(self, other: Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered span of the document: `start <= end` always holds.
///
/// An empty range (`start == end`) represents a caret. Both endpoints must
/// belong to the same document snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextRange {
    start: Location,
    end: Location,
}

impl TextRange {
    /// Build a range from two endpoints, ordering them if needed.
    pub fn new(a: Location, b: Location) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// An empty range representing a caret at `at`.
    pub fn caret(at: Location) -> Self {
        Self { start: at, end: at }
    }

    pub fn start(&self) -> Location {
        self.start
    }

    pub fn end(&self) -> Location {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `loc` falls within `[start, end)`.
    pub fn contains(&self, loc: Location) -> bool {
        self.start <= loc && loc < self.end
    }

    /// Strict overlap test.
    ///
    /// Ranges that merely touch (`a.end == b.start`) do *not* intersect; the
    /// undo coalescing rule checks abutment separately. An empty range
    /// intersects only when its location lies strictly inside the other.
    pub fn intersects(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A point in the host's view coordinate space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A rectangle in the host's view coordinate space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }
}

/// A visual line fragment: the projection of a contiguous character range onto
/// one rendered line.
///
/// Fragments are recomputed lazily by the host whenever the document or
/// viewport changes; the control layer never caches them across edits.
#[derive(Clone, Debug, PartialEq)]
pub struct LineFragment {
    /// The characters laid out on this visual line.
    pub range: TextRange,
    /// Typographic bounding box.
    pub bounds: Rect,
    /// Baseline origin within the view.
    pub baseline: Point,
}

/// Direction of a caret/selection move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Up,
    Down,
}

impl Direction {
    /// Up/down moves need the column-preserving correction; forward/backward
    /// moves take the host's destination directly.
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// Granularity of a caret/selection move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveUnit {
    Character,
    Word,
    Line,
}

/// How a completion candidate was committed (mirrors the host toolkit's
/// text-movement codes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Movement {
    Return,
    Tab,
    Cancel,
    Other,
}

/// A single inverse edit recorded for undo: "replace `range` with `text`".
///
/// Applying a recorded edit yields the edit that undoes *it*, which is how the
/// undo and redo stacks feed each other.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEdit {
    pub range: TextRange,
    pub text: String,
}
