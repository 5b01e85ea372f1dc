//! Directional caret navigation over the host layout engine.
//!
//! Horizontal moves simply take the host's destination primitive. Vertical
//! moves are the hard case: stepping by character through wrapped,
//! variable-width lines drifts horizontally, so the engine corrects the naive
//! target back to the origin's visual column.

use crate::host::LayoutQuery;
use crate::types::{Direction, LineFragment, Location, MoveUnit, Point, TextRange};

/// Compute the caret location reached by moving `count` steps from `from`.
///
/// Returns `None` when the move would leave the document and no clamped
/// target makes sense (callers clamp to [`document_boundary`]). `count == 0`
/// and an empty document are both no-ops returning `from`.
pub fn move_location<L: LayoutQuery + ?Sized>(
    layout: &L,
    from: Location,
    direction: Direction,
    unit: MoveUnit,
    count: usize,
) -> Option<Location> {
    if count == 0 {
        return Some(from);
    }
    let doc = layout.document_range();
    if doc.is_empty() {
        return Some(from);
    }

    if direction.is_vertical() {
        vertical_move(layout, from, direction, unit, count, doc)
    } else {
        horizontal_move(layout, from, direction, unit, count)
    }
}

/// The location a failed move clamps to: document start going backward/up,
/// document end going forward/down.
pub fn document_boundary(direction: Direction, doc: TextRange) -> Location {
    match direction {
        Direction::Backward | Direction::Up => doc.start(),
        Direction::Forward | Direction::Down => doc.end(),
    }
}

/// Horizontal moves return the host's destination directly; a partial move
/// that hits the document edge clamps to the last reachable location.
fn horizontal_move<L: LayoutQuery + ?Sized>(
    layout: &L,
    from: Location,
    direction: Direction,
    unit: MoveUnit,
    count: usize,
) -> Option<Location> {
    let mut current = from;
    for step in 0..count {
        match layout.destination(current, direction, unit) {
            Some(next) => current = next,
            None if step == 0 => return None,
            None => break,
        }
    }
    Some(current)
}

fn vertical_move<L: LayoutQuery + ?Sized>(
    layout: &L,
    from: Location,
    direction: Direction,
    unit: MoveUnit,
    count: usize,
    doc: TextRange,
) -> Option<Location> {
    // 1. Naive target via repeated single-step destination queries. The naive
    //    target keeps the character offset, not the visual column.
    let mut naive = from;
    let mut steps = 0usize;
    for _ in 0..count {
        match layout.destination(naive, direction, unit) {
            Some(next) => {
                naive = next;
                steps += 1;
            }
            None => break,
        }
    }
    if steps == 0 {
        // Already on the first/last fragment.
        return Some(document_boundary(direction, doc));
    }

    // 2. A naive target exactly at document end would resolve to the
    //    degenerate zero-width trailing fragment; back up one character.
    if naive == doc.end() {
        if let Some(prev) = layout.location(naive, -1) {
            naive = prev;
        }
    }

    // 3. Origin and target fragments. If the host cannot answer, the naive
    //    target is the best available result.
    let (origin_frag, target_frag) =
        match (layout.line_fragment(from), layout.line_fragment(naive)) {
            (Some(o), Some(t)) => (o, t),
            _ => return Some(naive),
        };

    // 4. The origin's on-screen x for the character at `from`.
    let origin_index = layout.offset(origin_frag.range.start(), from);
    let origin_x = layout.caret_position(&origin_frag, origin_index).x;

    // 5. The character in the target fragment closest to that x at the
    //    target's baseline.
    let probe = Point {
        x: origin_x,
        y: target_frag.baseline.y,
    };
    let corrected = match layout.character_index(probe, &target_frag) {
        Some(index) => index,
        // 6. Past the end of a shorter line: land on its last offset. A
        //    fragment holding the document's last character has no trailing
        //    newline to step over, so its last offset sits after that
        //    character.
        None => {
            let len = fragment_len(layout, &target_frag);
            if target_frag.range.end() == doc.end() && !trailing_break(layout, doc) {
                len
            } else {
                len.saturating_sub(1)
            }
        }
    };
    let mut target = layout
        .location(target_frag.range.start(), corrected as isize)
        .unwrap_or(naive);

    // 7. Fewer fragments than requested were available near the document
    //    edge; keyboard semantics put the caret at the document boundary.
    if fragments_crossed(layout, from, target) < count {
        target = document_boundary(direction, doc);
    }

    Some(target)
}

/// Characters laid out on a fragment.
fn fragment_len<L: LayoutQuery + ?Sized>(layout: &L, fragment: &LineFragment) -> usize {
    layout.offset(fragment.range.start(), fragment.range.end())
}

/// Whether the document ends in a line break. A break at the very end leaves
/// a zero-width fragment after it.
fn trailing_break<L: LayoutQuery + ?Sized>(layout: &L, doc: TextRange) -> bool {
    layout
        .line_fragment(doc.end())
        .is_some_and(|frag| frag.range.is_empty())
}

/// Number of fragment boundaries between two locations.
fn fragments_crossed<L: LayoutQuery + ?Sized>(layout: &L, a: Location, b: Location) -> usize {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut crossed = 0usize;
    layout.enumerate_line_fragments(lo, &mut |frag| {
        if frag.range.contains(hi) || (frag.range.is_empty() && frag.range.end() == hi) {
            return false;
        }
        crossed += 1;
        true
    });
    crossed
}
