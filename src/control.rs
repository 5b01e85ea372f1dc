//! The editing controller: caret, selection, edits, undo, plugins, and the
//! completion popover, stitched together over a text host.
//!
//! Every mutation funnels through [`TextControl::replace_text`], which runs
//! the full pipeline: plugin consent, notifications, undo bookkeeping, the
//! edit itself, then caret and completion upkeep.

use log::debug;

use crate::completion::{
    CompletionCandidate, CompletionController, PopoverHost, WindowId, WordCandidates,
};
use crate::host::TextHost;
use crate::navigation::{self, document_boundary};
use crate::plugins::{default_menu, Menu, Plugin, PluginHub, PluginId};
use crate::types::{Direction, Location, MoveUnit, Movement, Point, RecordedEdit, TextRange};
use crate::undo::{CoalescingUndo, EditLog};

/// Horizontal nudge applied to the popover so it lines up with the completion
/// prefix rather than the caret.
const POPOVER_X_OFFSET: f64 = -14.0;
/// Longest completion prefix considered when scanning back from the caret.
const PREFIX_SCAN_LIMIT: isize = 64;

pub struct TextControl<H: TextHost, W: PopoverHost> {
    host: H,
    plugins: PluginHub,
    undo: CoalescingUndo<EditLog>,
    caret: Location,
    /// Selection anchor; `None` means a plain caret.
    anchor: Option<Location>,
    completion: CompletionController<W>,
    words: WordCandidates,
    parent_window: WindowId,
}

impl<H: TextHost, W: PopoverHost + 'static> TextControl<H, W> {
    pub fn new(host: H, popover: W, parent_window: WindowId) -> Self {
        let caret = host.document_range().start();
        Self {
            host,
            plugins: PluginHub::new(),
            undo: CoalescingUndo::new(EditLog::new()),
            caret,
            anchor: None,
            completion: CompletionController::new(popover),
            words: WordCandidates::new(),
            parent_window,
        }
    }

    /// Set up all registered plugins. Call once the control is installed in
    /// its window.
    pub fn attach(&mut self) {
        self.plugins.activate();
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn caret(&self) -> Location {
        self.caret
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        self.plugins.register(plugin)
    }

    pub fn remove_plugin(&mut self, id: PluginId) -> bool {
        self.plugins.unregister(id)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    // ==================== editing ====================

    /// Replace `range` with `replacement`. Returns `false` when a plugin
    /// vetoes the edit or the host rejects it.
    pub fn replace_text(&mut self, range: TextRange, replacement: &str) -> bool {
        if !self.plugins.should_change_text(&range, replacement) {
            debug!("edit at {range:?} vetoed");
            return false;
        }
        self.plugins.will_change_text(&range);

        let previous = self.host.text_in(range);
        let removed = self.host.offset(range.start(), range.end());
        let doc = self.host.document_range();
        let len_before = self.host.offset(doc.start(), doc.end());
        if !self.host.apply_edit(range, replacement) {
            return false;
        }

        // The range the replacement occupies now; undoing it restores the
        // previous text. The host may normalize what it stores (line
        // endings), so the inserted length comes from the document, not
        // from `replacement`.
        let doc = self.host.document_range();
        let len_after = self.host.offset(doc.start(), doc.end());
        let inserted =
            isize::try_from(len_after + removed - len_before).unwrap_or(isize::MAX);
        let new_end = self
            .host
            .location(range.start(), inserted)
            .unwrap_or_else(|| doc.end());
        let undo_range = TextRange::new(range.start(), new_end);
        self.undo.check_coalescing(undo_range);
        self.undo.record(RecordedEdit {
            range: undo_range,
            text: previous,
        });

        self.plugins.did_change_text(&range, replacement);
        self.caret = new_end;
        self.anchor = None;
        self.refresh_completion();
        true
    }

    /// Insert at the caret, replacing the selection if there is one.
    pub fn insert_text(&mut self, text: &str) -> bool {
        let range = self
            .selection_range()
            .unwrap_or_else(|| TextRange::caret(self.caret));
        self.replace_text(range, text)
    }

    /// Delete the selection, or the character before the caret.
    pub fn delete_backward(&mut self) -> bool {
        let range = match self.selection_range() {
            Some(sel) => sel,
            None => {
                let Some(before) =
                    self.host
                        .destination(self.caret, Direction::Backward, MoveUnit::Character)
                else {
                    return false;
                };
                TextRange::new(before, self.caret)
            }
        };
        self.replace_text(range, "")
    }

    pub fn undo(&mut self) -> bool {
        let host = &mut self.host;
        let mut caret_after = None;
        let done = self.undo.undo(&mut |edit| {
            let flipped = apply_recorded(host, edit);
            caret_after = Some(flipped.range.end());
            flipped
        });
        self.finish_history_step(caret_after);
        done
    }

    pub fn redo(&mut self) -> bool {
        let host = &mut self.host;
        let mut caret_after = None;
        let done = self.undo.redo(&mut |edit| {
            let flipped = apply_recorded(host, edit);
            caret_after = Some(flipped.range.end());
            flipped
        });
        self.finish_history_step(caret_after);
        done
    }

    fn finish_history_step(&mut self, caret_after: Option<Location>) {
        if let Some(caret) = caret_after {
            self.caret = caret;
            self.anchor = None;
        }
        self.completion.close();
    }

    // ==================== caret and selection ====================

    /// Move the caret. With `extending` the anchor stays put and the gap
    /// becomes the selection; otherwise any selection collapses. A move that
    /// runs off the document clamps to its boundary.
    pub fn move_caret(&mut self, direction: Direction, unit: MoveUnit, count: usize, extending: bool) {
        if extending {
            if self.anchor.is_none() {
                self.anchor = Some(self.caret);
            }
        } else {
            self.anchor = None;
        }
        let doc = self.host.document_range();
        self.caret = navigation::move_location(&self.host, self.caret, direction, unit, count)
            .unwrap_or_else(|| document_boundary(direction, doc));
    }

    pub fn selection_range(&self) -> Option<TextRange> {
        let anchor = self.anchor?;
        if anchor == self.caret {
            return None;
        }
        Some(TextRange::new(anchor, self.caret))
    }

    pub fn selected_text(&self) -> String {
        self.selection_range()
            .map(|range| self.host.text_in(range))
            .unwrap_or_default()
    }

    pub fn select_all(&mut self) {
        let doc = self.host.document_range();
        self.anchor = Some(doc.start());
        self.caret = doc.end();
    }

    pub fn clear_selection(&mut self) {
        self.anchor = None;
    }

    // ==================== plugin surfaces ====================

    /// Menu for a right-click at `at`: the first plugin that builds one wins,
    /// otherwise the stock menu.
    pub fn context_menu(&self, at: Location) -> Menu {
        self.plugins
            .context_menu(at, &self.host)
            .unwrap_or_else(default_menu)
    }

    /// Tell plugins which part of the document is laid out on screen.
    pub fn viewport_did_layout(&self, visible: Option<&TextRange>) {
        self.plugins.did_layout_viewport(visible);
    }

    // ==================== completion ====================

    /// Toggle the completion popover at the caret.
    pub fn complete(&mut self) {
        if self.completion.is_visible() {
            self.completion.close();
            return;
        }
        self.present_completion();
    }

    pub fn completion_visible(&self) -> bool {
        self.completion.is_visible()
    }

    /// Insert the chosen candidate over the completion prefix.
    pub fn commit_completion(&mut self, index: usize, movement: Movement) {
        let Some(session) = self.completion.session() else {
            return;
        };
        let Some(item) = session.items.get(index).cloned() else {
            return;
        };
        self.completion.close();
        if movement == Movement::Cancel {
            return;
        }
        let range = TextRange::new(session.anchor, self.caret);
        self.replace_text(range, &item.insert_text);
    }

    pub fn cancel_completion(&mut self) {
        self.completion.close();
    }

    fn completion_candidates(&self, prefix: &str) -> Vec<CompletionCandidate> {
        if let Some(items) = self.plugins.completion_items(self.caret, &self.host) {
            return items;
        }
        let text = self.host.text_in(self.host.document_range());
        self.words.candidates(&text, prefix)
    }

    fn present_completion(&mut self) {
        let (anchor, prefix) = self.completion_prefix();
        let items = self.completion_candidates(&prefix);
        if items.is_empty() {
            return;
        }
        let Some(origin) = self.popover_origin() else {
            return;
        };
        self.completion
            .show_window(origin, anchor, items, self.parent_window);
    }

    /// After an edit: refresh the popover contents, or dismiss it when
    /// nothing matches anymore.
    fn refresh_completion(&mut self) {
        if !self.completion.is_visible() {
            return;
        }
        let (anchor, prefix) = self.completion_prefix();
        let items = self.completion_candidates(&prefix);
        if items.is_empty() {
            self.completion.close();
            return;
        }
        let Some(origin) = self.popover_origin() else {
            self.completion.close();
            return;
        };
        self.completion
            .show_window(origin, anchor, items, self.parent_window);
    }

    /// The word characters immediately before the caret, and where they start.
    fn completion_prefix(&self) -> (Location, String) {
        let scan_start = self
            .host
            .location(self.caret, -PREFIX_SCAN_LIMIT)
            .unwrap_or_else(|| self.host.document_range().start());
        let before = self.host.text_in(TextRange::new(scan_start, self.caret));
        let prefix: String = before
            .chars()
            .rev()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let len = isize::try_from(prefix.chars().count()).unwrap_or(0);
        let anchor = self.host.location(self.caret, -len).unwrap_or(self.caret);
        (anchor, prefix)
    }

    /// Below the caret's line fragment, nudged left toward the prefix.
    fn popover_origin(&self) -> Option<Point> {
        let fragment = self.host.line_fragment(self.caret)?;
        let index = self.host.offset(fragment.range.start(), self.caret);
        let caret = self.host.caret_position(&fragment, index);
        Some(Point {
            x: caret.x + POPOVER_X_OFFSET,
            y: fragment.bounds.max_y(),
        })
    }
}

/// Apply a stored edit against the host and return its inverse.
fn apply_recorded<H: TextHost>(host: &mut H, edit: &RecordedEdit) -> RecordedEdit {
    let previous = host.text_in(edit.range);
    host.apply_edit(edit.range, &edit.text);
    let len = isize::try_from(edit.text.chars().count()).unwrap_or(0);
    let end = host
        .location(edit.range.start(), len)
        .unwrap_or_else(|| edit.range.start());
    RecordedEdit {
        range: TextRange::new(edit.range.start(), end),
        text: previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::buffer::Buffer;
    use crate::plugins::PluginContext;

    /// Minimal popover host; completion behavior details are covered by the
    /// completion module's own tests.
    #[derive(Clone, Default)]
    struct NullWindow {
        shown: Rc<RefCell<Vec<Point>>>,
    }

    impl PopoverHost for NullWindow {
        fn attach_child(&mut self, origin: Point, _parent: WindowId) {
            self.shown.borrow_mut().push(origin);
        }
        fn reposition(&mut self, origin: Point) {
            self.shown.borrow_mut().push(origin);
        }
        fn order_out(&mut self) {}
        fn observe_will_close(&mut self, _f: Box<dyn Fn()>) -> crate::completion::Subscription {
            crate::completion::Subscription::new(|| {})
        }
        fn observe_parent_resign_key(
            &mut self,
            _parent: WindowId,
            _f: Box<dyn Fn()>,
        ) -> crate::completion::Subscription {
            crate::completion::Subscription::new(|| {})
        }
    }

    fn control(text: &str) -> TextControl<Buffer, NullWindow> {
        TextControl::new(Buffer::from_text(text), NullWindow::default(), WindowId(1))
    }

    fn loc(raw: usize) -> Location {
        Location::new(raw)
    }

    fn range(start: usize, end: usize) -> TextRange {
        TextRange::new(loc(start), loc(end))
    }

    // ==================== editing pipeline tests ====================

    #[test]
    fn replace_text_edits_and_moves_the_caret() {
        let mut ctl = control("hello world");
        assert!(ctl.replace_text(range(6, 11), "there!"));
        assert_eq!(ctl.host().to_text(), "hello there!");
        assert_eq!(ctl.caret(), loc(12));
    }

    #[test]
    fn normalized_line_ending_undoes_cleanly() {
        let mut ctl = control("abc");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 1, false);
        // The buffer stores this as a single '\n'.
        assert!(ctl.insert_text("\r\n"));
        assert_eq!(ctl.host().to_text(), "a\nbc");
        assert_eq!(ctl.caret(), loc(2));
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "abc");
    }

    #[test]
    fn vetoed_edit_leaves_everything_untouched() {
        struct Veto;
        impl Plugin for Veto {
            fn set_up(&mut self, context: &mut PluginContext<'_>) {
                context.events.should_change_text(|_, _| false);
            }
        }
        let mut ctl = control("abc");
        ctl.add_plugin(Box::new(Veto));
        ctl.attach();
        assert!(!ctl.replace_text(range(0, 1), "x"));
        assert_eq!(ctl.host().to_text(), "abc");
        assert!(!ctl.can_undo());
    }

    #[test]
    fn change_notifications_surround_the_edit() {
        type Trail = Rc<RefCell<Vec<String>>>;
        struct Witness(Trail);
        impl Plugin for Witness {
            fn set_up(&mut self, context: &mut PluginContext<'_>) {
                let trail = Rc::clone(&self.0);
                context.events.on_will_change_text(move |_| {
                    trail.borrow_mut().push("will".into());
                });
                let trail = Rc::clone(&self.0);
                context.events.on_did_change_text(move |_, replacement| {
                    trail.borrow_mut().push(format!("did:{replacement}"));
                });
            }
        }
        let trail: Trail = Trail::default();
        let mut ctl = control("abc");
        ctl.add_plugin(Box::new(Witness(Rc::clone(&trail))));
        ctl.attach();
        ctl.replace_text(range(1, 2), "X");
        assert_eq!(*trail.borrow(), vec!["will", "did:X"]);
    }

    #[test]
    fn insert_text_replaces_the_selection() {
        let mut ctl = control("hello world");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 5, false);
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 6, true);
        assert_eq!(ctl.selected_text(), " world");
        assert!(ctl.insert_text("!"));
        assert_eq!(ctl.host().to_text(), "hello!");
        assert!(ctl.selection_range().is_none());
    }

    #[test]
    fn delete_backward_removes_one_character() {
        let mut ctl = control("abc");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 3, false);
        assert!(ctl.delete_backward());
        assert_eq!(ctl.host().to_text(), "ab");
        assert_eq!(ctl.caret(), loc(2));
    }

    #[test]
    fn delete_backward_at_document_start_is_rejected() {
        let mut ctl = control("abc");
        assert!(!ctl.delete_backward());
        assert_eq!(ctl.host().to_text(), "abc");
    }

    // ==================== undo pipeline tests ====================

    #[test]
    fn typed_run_undoes_in_one_step() {
        let mut ctl = control("");
        for ch in ["a", "b", "c"] {
            let caret = ctl.caret();
            assert!(ctl.replace_text(TextRange::caret(caret), ch));
        }
        assert_eq!(ctl.host().to_text(), "abc");
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "");
        assert!(!ctl.can_undo());
    }

    #[test]
    fn separated_edits_undo_separately() {
        let mut ctl = control("0123456789");
        assert!(ctl.replace_text(range(0, 0), "x"));
        assert!(ctl.replace_text(range(8, 8), "y"));
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "x0123456789");
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "0123456789");
    }

    #[test]
    fn undo_then_redo_round_trips_the_document() {
        let mut ctl = control("hello");
        assert!(ctl.replace_text(range(0, 5), "goodbye"));
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "hello");
        assert!(ctl.redo());
        assert_eq!(ctl.host().to_text(), "goodbye");
        assert_eq!(ctl.caret(), loc(7));
    }

    #[test]
    fn undo_restores_deleted_text() {
        let mut ctl = control("hello world");
        assert!(ctl.replace_text(range(5, 11), ""));
        assert_eq!(ctl.host().to_text(), "hello");
        assert!(ctl.undo());
        assert_eq!(ctl.host().to_text(), "hello world");
    }

    #[test]
    fn new_edit_discards_redo() {
        let mut ctl = control("abc");
        assert!(ctl.replace_text(range(0, 1), "x"));
        assert!(ctl.undo());
        assert!(ctl.replace_text(range(0, 1), "y"));
        assert!(!ctl.can_redo());
    }

    // ==================== caret and selection tests ====================

    #[test]
    fn caret_moves_clamp_at_document_boundaries() {
        let mut ctl = control("ab");
        ctl.move_caret(Direction::Backward, MoveUnit::Character, 1, false);
        assert_eq!(ctl.caret(), loc(0));
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 10, false);
        assert_eq!(ctl.caret(), loc(2));
        ctl.move_caret(Direction::Down, MoveUnit::Line, 1, false);
        assert_eq!(ctl.caret(), loc(2));
    }

    #[test]
    fn extending_moves_grow_the_selection_from_a_fixed_anchor() {
        let mut ctl = control("one two three");
        ctl.move_caret(Direction::Forward, MoveUnit::Word, 1, true);
        assert_eq!(ctl.selected_text(), "one ");
        ctl.move_caret(Direction::Forward, MoveUnit::Word, 1, true);
        assert_eq!(ctl.selected_text(), "one two ");
        // A plain move collapses it.
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 1, false);
        assert!(ctl.selection_range().is_none());
    }

    #[test]
    fn select_all_spans_the_document() {
        let mut ctl = control("abc\ndef");
        ctl.select_all();
        assert_eq!(ctl.selected_text(), "abc\ndef");
        ctl.clear_selection();
        assert!(ctl.selection_range().is_none());
    }

    // ==================== plugin surface tests ====================

    #[test]
    fn context_menu_falls_back_to_the_stock_menu() {
        let ctl = control("abc");
        let menu = ctl.context_menu(loc(1));
        assert_eq!(menu.items.len(), 3);
        assert_eq!(menu.items[0].command, "cut");
    }

    #[test]
    fn plugin_context_menu_takes_precedence() {
        use crate::plugins::{Menu, MenuItem};
        struct Menus;
        impl Plugin for Menus {
            fn set_up(&mut self, context: &mut PluginContext<'_>) {
                context.events.on_context_menu(|_, _| Menu {
                    items: vec![MenuItem::new("Reverse", "reverse")],
                });
            }
        }
        let mut ctl = control("abc");
        ctl.add_plugin(Box::new(Menus));
        ctl.attach();
        let menu = ctl.context_menu(loc(0));
        assert_eq!(menu.items[0].command, "reverse");
    }

    // ==================== completion tests ====================

    #[test]
    fn complete_toggles_the_popover() {
        let mut ctl = control("alpha alto al");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 13, false);
        ctl.complete();
        assert!(ctl.completion_visible());
        ctl.complete();
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn complete_with_no_candidates_stays_hidden() {
        let mut ctl = control("zz qq");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 2, false);
        ctl.complete();
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn commit_replaces_the_prefix_with_the_candidate() {
        let mut ctl = control("alpha al");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 8, false);
        ctl.complete();
        assert!(ctl.completion_visible());
        ctl.commit_completion(0, Movement::Return);
        assert_eq!(ctl.host().to_text(), "alpha alpha");
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn cancel_movement_closes_without_editing() {
        let mut ctl = control("alpha al");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 8, false);
        ctl.complete();
        ctl.commit_completion(0, Movement::Cancel);
        assert_eq!(ctl.host().to_text(), "alpha al");
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn plugin_candidates_override_the_word_scan() {
        struct Snippets;
        impl Plugin for Snippets {
            fn set_up(&mut self, context: &mut PluginContext<'_>) {
                context.events.on_completion_items(|_, _| {
                    vec![CompletionCandidate::with_insert_text("for loop", "for x in xs {}")]
                });
            }
        }
        let mut ctl = control("fo");
        ctl.add_plugin(Box::new(Snippets));
        ctl.attach();
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 2, false);
        ctl.complete();
        assert!(ctl.completion_visible());
        ctl.commit_completion(0, Movement::Return);
        assert_eq!(ctl.host().to_text(), "for x in xs {}");
    }

    #[test]
    fn editing_refreshes_or_dismisses_the_popover() {
        let mut ctl = control("alpha al");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 8, false);
        ctl.complete();
        assert!(ctl.completion_visible());
        // Still a prefix of "alpha": stays up.
        assert!(ctl.insert_text("p"));
        assert!(ctl.completion_visible());
        // No word matches "alpz": goes away.
        assert!(ctl.insert_text("z"));
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn undo_dismisses_the_popover() {
        let mut ctl = control("alpha a");
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 7, false);
        assert!(ctl.insert_text("l"));
        ctl.complete();
        assert!(ctl.completion_visible());
        assert!(ctl.undo());
        assert!(!ctl.completion_visible());
    }

    #[test]
    fn popover_origin_sits_below_the_caret_line() {
        let window = NullWindow::default();
        let shown = Rc::clone(&window.shown);
        let mut ctl = TextControl::new(Buffer::from_text("alpha al"), window, WindowId(1));
        ctl.move_caret(Direction::Forward, MoveUnit::Character, 8, false);
        ctl.complete();
        let origin = shown.borrow().first().copied().expect("popover shown");
        let line_height = ctl.host().line_height();
        assert!((origin.y - line_height).abs() < f64::EPSILON);
        // Nudged left of the caret x.
        assert!(origin.x < 8.0 * ctl.host().cell_width());
    }
}
