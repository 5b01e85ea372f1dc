//! Completion popover lifecycle.
//!
//! The controller drives a host-provided popover window through a strict
//! visible/hidden state machine. Window-system callbacks (the window closing
//! on its own, the parent losing key status) arrive through observer
//! subscriptions that are installed once per visibility cycle and always
//! released before the window is ordered out, so a close never re-enters the
//! controller through its own notification.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use log::debug;
use regex::Regex;

use crate::types::{Location, Movement, Point};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    /// What the popover displays.
    pub label: String,
    /// What lands in the document when chosen.
    pub insert_text: String,
}

impl CompletionCandidate {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            insert_text: label.clone(),
            label,
        }
    }

    pub fn with_insert_text(label: impl Into<String>, insert_text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insert_text: insert_text.into(),
        }
    }
}

/// Receives the outcome of a completion session. Closing the popover is the
/// delegate's decision, not the controller's.
pub trait CompletionDelegate {
    fn completion_chosen(&mut self, item: &CompletionCandidate, movement: Movement);
    fn completion_cancelled(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// Cancels an observer registration when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Window-system surface the popover lives on.
///
/// Hosts must tolerate a subscription being cancelled while its handler is
/// running and keep that handler alive until the dispatch returns.
pub trait PopoverHost {
    /// Attach the popover to `parent` at `origin` and show it without taking
    /// key status.
    fn attach_child(&mut self, origin: Point, parent: WindowId);
    fn reposition(&mut self, origin: Point);
    /// Hide and detach the popover.
    fn order_out(&mut self);
    fn observe_will_close(&mut self, f: Box<dyn Fn()>) -> Subscription;
    fn observe_parent_resign_key(&mut self, parent: WindowId, f: Box<dyn Fn()>) -> Subscription;
}

/// State carried while the popover is up.
#[derive(Debug, Clone)]
pub struct CompletionSession {
    /// Document location the completion prefix starts at.
    pub anchor: Location,
    pub items: Vec<CompletionCandidate>,
}

struct Inner<W: PopoverHost> {
    window: W,
    visible: bool,
    session: Option<CompletionSession>,
    will_close_sub: Option<Subscription>,
    resign_key_sub: Option<Subscription>,
}

impl<W: PopoverHost> Inner<W> {
    /// Shared close path: release observers, then hide. Idempotent.
    fn close(cell: &Rc<RefCell<Self>>) {
        let mut inner = cell.borrow_mut();
        if !inner.visible {
            return;
        }
        debug!("completion popover closing");
        inner.visible = false;
        inner.session = None;
        // Observers go first so ordering the window out cannot call back in.
        inner.will_close_sub = None;
        inner.resign_key_sub = None;
        inner.window.order_out();
    }
}

pub struct CompletionController<W: PopoverHost> {
    inner: Rc<RefCell<Inner<W>>>,
}

impl<W: PopoverHost + 'static> CompletionController<W> {
    pub fn new(window: W) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                window,
                visible: false,
                session: None,
                will_close_sub: None,
                resign_key_sub: None,
            })),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.inner.borrow().visible
    }

    pub fn session(&self) -> Option<CompletionSession> {
        self.inner.borrow().session.clone()
    }

    /// Show the popover, or refresh it in place when already visible.
    ///
    /// The hidden-to-visible transition attaches the window and installs both
    /// observers. A repeated call only swaps the session and repositions; the
    /// observers installed earlier stay as they are.
    pub fn show_window(
        &self,
        origin: Point,
        anchor: Location,
        items: Vec<CompletionCandidate>,
        parent: WindowId,
    ) {
        let mut inner = self.inner.borrow_mut();
        inner.session = Some(CompletionSession { anchor, items });
        if inner.visible {
            inner.window.reposition(origin);
            return;
        }
        debug!("completion popover opening at ({}, {})", origin.x, origin.y);
        inner.visible = true;
        inner.window.attach_child(origin, parent);

        // The window may close behind our back (e.g. the window system
        // dismisses it). Drop the stale items but keep the subscriptions;
        // they are released on the next explicit close.
        let weak = Rc::downgrade(&self.inner);
        let sub = inner.window.observe_will_close(Box::new(move || {
            if let Some(cell) = weak.upgrade() {
                let mut inner = cell.borrow_mut();
                inner.visible = false;
                inner.session = None;
            }
        }));
        inner.will_close_sub = Some(sub);

        // The parent losing key status dismisses the popover.
        let weak: Weak<RefCell<Inner<W>>> = Rc::downgrade(&self.inner);
        let sub = inner
            .window
            .observe_parent_resign_key(parent, Box::new(move || {
                if let Some(cell) = weak.upgrade() {
                    Inner::close(&cell);
                }
            }));
        inner.resign_key_sub = Some(sub);
    }

    /// Hide the popover and release its observers. Safe to call when hidden.
    pub fn close(&self) {
        Inner::close(&self.inner);
    }

    /// Forward the chosen item to the delegate. The controller stays visible;
    /// the delegate decides when to close.
    pub fn commit(&self, index: usize, movement: Movement, delegate: &mut dyn CompletionDelegate) {
        let item = {
            let inner = self.inner.borrow();
            if !inner.visible {
                return;
            }
            inner
                .session
                .as_ref()
                .and_then(|s| s.items.get(index).cloned())
        };
        if let Some(item) = item {
            delegate.completion_chosen(&item, movement);
        }
    }

    pub fn cancel(&self, delegate: &mut dyn CompletionDelegate) {
        if self.inner.borrow().visible {
            delegate.completion_cancelled();
        }
    }
}

/// Fallback candidate source: words already present in the document.
pub struct WordCandidates {
    word: Regex,
}

impl WordCandidates {
    pub fn new() -> Self {
        Self {
            // Static pattern, cannot fail to compile.
            word: Regex::new(r"\w+").expect("static word pattern"),
        }
    }

    /// Distinct words in `text` that extend `prefix`, sorted. An empty
    /// prefix offers nothing.
    pub fn candidates(&self, text: &str, prefix: &str) -> Vec<CompletionCandidate> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let mut words = BTreeSet::new();
        for m in self.word.find_iter(text) {
            let word = m.as_str();
            if word.starts_with(prefix) && word != prefix {
                words.insert(word);
            }
        }
        words.into_iter().map(CompletionCandidate::new).collect()
    }
}

impl Default for WordCandidates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Handler = Rc<dyn Fn()>;

    #[derive(Default)]
    struct FakeWindowState {
        attached: bool,
        origin: Option<Point>,
        events: Vec<String>,
        will_close: BTreeMap<u64, Handler>,
        resign_key: BTreeMap<u64, Handler>,
        next_token: u64,
    }

    /// Test double for the window system. Observer lists are keyed so a
    /// handler can unsubscribe itself mid-dispatch.
    #[derive(Clone, Default)]
    struct FakeWindow {
        state: Rc<RefCell<FakeWindowState>>,
    }

    impl FakeWindow {
        fn fire_will_close(&self) {
            let handlers: Vec<Handler> =
                self.state.borrow().will_close.values().cloned().collect();
            for h in handlers {
                h();
            }
        }

        fn fire_resign_key(&self) {
            let handlers: Vec<Handler> =
                self.state.borrow().resign_key.values().cloned().collect();
            for h in handlers {
                h();
            }
        }

        fn events(&self) -> Vec<String> {
            self.state.borrow().events.clone()
        }

        fn observer_count(&self) -> usize {
            let s = self.state.borrow();
            s.will_close.len() + s.resign_key.len()
        }
    }

    impl PopoverHost for FakeWindow {
        fn attach_child(&mut self, origin: Point, _parent: WindowId) {
            let mut s = self.state.borrow_mut();
            s.attached = true;
            s.origin = Some(origin);
            s.events.push("attach".into());
        }

        fn reposition(&mut self, origin: Point) {
            let mut s = self.state.borrow_mut();
            s.origin = Some(origin);
            s.events.push("reposition".into());
        }

        fn order_out(&mut self) {
            let mut s = self.state.borrow_mut();
            s.attached = false;
            s.events.push("order_out".into());
        }

        fn observe_will_close(&mut self, f: Box<dyn Fn()>) -> Subscription {
            let mut s = self.state.borrow_mut();
            s.next_token += 1;
            let token = s.next_token;
            s.will_close.insert(token, Rc::from(f));
            let state = Rc::clone(&self.state);
            Subscription::new(move || {
                state.borrow_mut().will_close.remove(&token);
            })
        }

        fn observe_parent_resign_key(&mut self, _parent: WindowId, f: Box<dyn Fn()>) -> Subscription {
            let mut s = self.state.borrow_mut();
            s.next_token += 1;
            let token = s.next_token;
            s.resign_key.insert(token, Rc::from(f));
            let state = Rc::clone(&self.state);
            Subscription::new(move || {
                state.borrow_mut().resign_key.remove(&token);
            })
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        chosen: Vec<(String, Movement)>,
        cancelled: usize,
    }

    impl CompletionDelegate for RecordingDelegate {
        fn completion_chosen(&mut self, item: &CompletionCandidate, movement: Movement) {
            self.chosen.push((item.insert_text.clone(), movement));
        }

        fn completion_cancelled(&mut self) {
            self.cancelled += 1;
        }
    }

    fn origin() -> Point {
        Point { x: 10.0, y: 20.0 }
    }

    fn items(labels: &[&str]) -> Vec<CompletionCandidate> {
        labels.iter().map(|l| CompletionCandidate::new(*l)).collect()
    }

    fn shown(window: &FakeWindow) -> CompletionController<FakeWindow> {
        let controller = CompletionController::new(window.clone());
        controller.show_window(origin(), Location::new(0), items(&["alpha"]), WindowId(1));
        controller
    }

    // ==================== visibility tests ====================

    #[test]
    fn show_attaches_and_installs_both_observers() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        assert!(controller.is_visible());
        assert_eq!(window.events(), vec!["attach"]);
        assert_eq!(window.observer_count(), 2);
    }

    #[test]
    fn repeated_show_updates_in_place_without_new_observers() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        controller.show_window(
            Point { x: 30.0, y: 40.0 },
            Location::new(2),
            items(&["beta", "gamma"]),
            WindowId(1),
        );
        assert_eq!(window.events(), vec!["attach", "reposition"]);
        assert_eq!(window.observer_count(), 2);
        let session = controller.session().unwrap();
        assert_eq!(session.anchor, Location::new(2));
        assert_eq!(session.items.len(), 2);
    }

    #[test]
    fn close_releases_observers_before_ordering_out() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        controller.close();
        assert!(!controller.is_visible());
        assert!(controller.session().is_none());
        assert_eq!(window.observer_count(), 0);
        assert_eq!(window.events(), vec!["attach", "order_out"]);
    }

    #[test]
    fn close_when_hidden_is_a_no_op() {
        let window = FakeWindow::default();
        let controller = CompletionController::new(window.clone());
        controller.close();
        controller.close();
        assert!(window.events().is_empty());
    }

    #[test]
    fn reopening_after_close_installs_fresh_observers() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        controller.close();
        controller.show_window(origin(), Location::new(5), items(&["beta"]), WindowId(1));
        assert!(controller.is_visible());
        // Exactly one pair again, never an accumulated duplicate.
        assert_eq!(window.observer_count(), 2);
        assert_eq!(window.events(), vec!["attach", "order_out", "attach"]);
    }

    // ==================== window-system callback tests ====================

    #[test]
    fn external_will_close_drops_the_session() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        window.fire_will_close();
        assert!(!controller.is_visible());
        assert!(controller.session().is_none());
        // The window closed itself; the controller must not order it out again.
        assert_eq!(window.events(), vec!["attach"]);
    }

    #[test]
    fn parent_resigning_key_closes_the_popover() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        window.fire_resign_key();
        assert!(!controller.is_visible());
        assert_eq!(window.events(), vec!["attach", "order_out"]);
        assert_eq!(window.observer_count(), 0);
    }

    #[test]
    fn resign_key_after_close_does_nothing() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        controller.close();
        window.fire_resign_key();
        assert!(!controller.is_visible());
        assert_eq!(window.events(), vec!["attach", "order_out"]);
    }

    // ==================== delegate tests ====================

    #[test]
    fn commit_forwards_the_item_and_stays_visible() {
        let window = FakeWindow::default();
        let controller = CompletionController::new(window.clone());
        controller.show_window(
            origin(),
            Location::new(0),
            items(&["alpha", "beta"]),
            WindowId(1),
        );
        let mut delegate = RecordingDelegate::default();
        controller.commit(1, Movement::Return, &mut delegate);
        assert_eq!(
            delegate.chosen,
            vec![("beta".to_string(), Movement::Return)]
        );
        // Closing is the delegate's job.
        assert!(controller.is_visible());
    }

    #[test]
    fn commit_out_of_bounds_is_ignored() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        let mut delegate = RecordingDelegate::default();
        controller.commit(9, Movement::Return, &mut delegate);
        assert!(delegate.chosen.is_empty());
    }

    #[test]
    fn commit_while_hidden_is_ignored() {
        let window = FakeWindow::default();
        let controller = CompletionController::new(window.clone());
        let mut delegate = RecordingDelegate::default();
        controller.commit(0, Movement::Return, &mut delegate);
        controller.cancel(&mut delegate);
        assert!(delegate.chosen.is_empty());
        assert_eq!(delegate.cancelled, 0);
    }

    #[test]
    fn cancel_reaches_the_delegate() {
        let window = FakeWindow::default();
        let controller = shown(&window);
        let mut delegate = RecordingDelegate::default();
        controller.cancel(&mut delegate);
        assert_eq!(delegate.cancelled, 1);
    }

    // ==================== word candidate tests ====================

    #[test]
    fn word_candidates_extend_the_prefix() {
        let words = WordCandidates::new();
        let found = words.candidates("alpha beta alto alpha al", "al");
        let labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
        // Sorted, deduplicated, and never the prefix itself.
        assert_eq!(labels, vec!["alpha", "alto"]);
    }

    #[test]
    fn word_candidates_empty_prefix_offers_nothing() {
        let words = WordCandidates::new();
        assert!(words.candidates("alpha beta", "").is_empty());
    }

    #[test]
    fn word_candidates_cross_punctuation_boundaries() {
        let words = WordCandidates::new();
        let found = words.candidates("self.alpha(alim)", "al");
        let labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["alim", "alpha"]);
    }
}
