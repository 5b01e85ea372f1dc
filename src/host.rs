//! Collaborator traits: the abstract surface of the host text-layout engine
//! and document store.
//!
//! The control layer never shapes glyphs, measures fonts, or stores text. It
//! queries the host through [`LayoutQuery`], reads text through
//! [`TextContent`], and mutates through [`DocumentEdit`]. A complete monospace
//! reference implementation lives in [`crate::buffer::Buffer`].

use crate::types::{Direction, LineFragment, Location, MoveUnit, Point, TextRange};

/// Read-only geometry and navigation queries answered by the host layout
/// engine.
///
/// All locations handed in must belong to the current document snapshot.
pub trait LayoutQuery {
    /// The full document as a range. Empty for an empty document.
    fn document_range(&self) -> TextRange;

    /// The visual line fragment containing `at`, or `None` when `at` is
    /// outside the laid-out document.
    fn line_fragment(&self, at: Location) -> Option<LineFragment>;

    /// The character offset within `fragment` whose glyph is closest to
    /// `point`, or `None` when the point falls outside the fragment's
    /// typographic bounds (the "not found" case the navigation engine turns
    /// into end-of-line behavior).
    fn character_index(&self, point: Point, fragment: &LineFragment) -> Option<usize>;

    /// The caret position for the character at `index` within `fragment`, in
    /// view coordinates.
    fn caret_position(&self, fragment: &LineFragment, index: usize) -> Point;

    /// One navigation step from `from`. Returns `None` when the step would
    /// leave the document.
    fn destination(&self, from: Location, direction: Direction, unit: MoveUnit)
        -> Option<Location>;

    /// Visit line fragments forward from the fragment containing `from`.
    /// The visitor returns `false` to stop early.
    fn enumerate_line_fragments(&self, from: Location, visitor: &mut dyn FnMut(&LineFragment) -> bool);

    /// Offset `from` by a signed number of characters. `None` when the result
    /// would leave the document.
    fn location(&self, from: Location, offset: isize) -> Option<Location>;

    /// Number of characters between two locations (`from <= to`).
    fn offset(&self, from: Location, to: Location) -> usize;
}

/// Read access to document text, handed to context-menu handlers and used by
/// the edit pipeline to capture inverse operations.
pub trait TextContent {
    /// The text within `range`.
    fn text_in(&self, range: TextRange) -> String;
}

/// The host document-mutation service.
pub trait DocumentEdit: TextContent {
    /// Replace `range` with `replacement`. Returns `false` when the host
    /// rejects the edit; the pipeline then records nothing.
    fn apply_edit(&mut self, range: TextRange, replacement: &str) -> bool;
}

/// Everything the control layer needs from a host: layout plus mutation.
pub trait TextHost: LayoutQuery + DocumentEdit {}

impl<T: LayoutQuery + DocumentEdit> TextHost for T {}
