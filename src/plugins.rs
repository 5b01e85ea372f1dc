//! Plugin registration, lifecycle, and event fan-out.
//!
//! Plugins attach behavior to the editing pipeline through an event bundle
//! they fill in during setup. The hub owns every registration, sets plugins
//! up exactly once, and fans events out in registration order.

pub mod script;

use std::any::Any;
use std::fmt;

use log::debug;

use crate::completion::CompletionCandidate;
use crate::host::TextContent;
use crate::types::{Location, TextRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub title: String,
    pub command: String,
}

impl MenuItem {
    pub fn new(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    pub items: Vec<MenuItem>,
}

/// Menu shown when no plugin supplies one.
pub fn default_menu() -> Menu {
    Menu {
        items: vec![
            MenuItem::new("Cut", "cut"),
            MenuItem::new("Copy", "copy"),
            MenuItem::new("Paste", "paste"),
        ],
    }
}

type WillChangeFn = Box<dyn Fn(&TextRange)>;
type DidChangeFn = Box<dyn Fn(&TextRange, &str)>;
type ShouldChangeFn = Box<dyn Fn(&TextRange, &str) -> bool>;
type ContextMenuFn = Box<dyn Fn(Location, &dyn TextContent) -> Menu>;
type ViewportFn = Box<dyn Fn(Option<&TextRange>)>;
type CompletionFn = Box<dyn Fn(Location, &dyn TextContent) -> Vec<CompletionCandidate>>;

/// A plugin's event subscriptions, filled in during [`Plugin::set_up`].
///
/// Each setter stores a single handler; subscribing twice to the same event
/// replaces the earlier handler. Setters chain.
#[derive(Default)]
pub struct PluginEvents {
    will_change_text: Option<WillChangeFn>,
    did_change_text: Option<DidChangeFn>,
    should_change_text: Option<ShouldChangeFn>,
    context_menu: Option<ContextMenuFn>,
    did_layout_viewport: Option<ViewportFn>,
    completion_items: Option<CompletionFn>,
}

impl PluginEvents {
    pub fn on_will_change_text(&mut self, f: impl Fn(&TextRange) + 'static) -> &mut Self {
        self.will_change_text = Some(Box::new(f));
        self
    }

    pub fn on_did_change_text(&mut self, f: impl Fn(&TextRange, &str) + 'static) -> &mut Self {
        self.did_change_text = Some(Box::new(f));
        self
    }

    /// Consulted before every edit; returning `false` vetoes it.
    pub fn should_change_text(
        &mut self,
        f: impl Fn(&TextRange, &str) -> bool + 'static,
    ) -> &mut Self {
        self.should_change_text = Some(Box::new(f));
        self
    }

    pub fn on_context_menu(
        &mut self,
        f: impl Fn(Location, &dyn TextContent) -> Menu + 'static,
    ) -> &mut Self {
        self.context_menu = Some(Box::new(f));
        self
    }

    pub fn on_did_layout_viewport(&mut self, f: impl Fn(Option<&TextRange>) + 'static) -> &mut Self {
        self.did_layout_viewport = Some(Box::new(f));
        self
    }

    pub fn on_completion_items(
        &mut self,
        f: impl Fn(Location, &dyn TextContent) -> Vec<CompletionCandidate> + 'static,
    ) -> &mut Self {
        self.completion_items = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for PluginEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEvents")
            .field("will_change_text", &self.will_change_text.is_some())
            .field("did_change_text", &self.did_change_text.is_some())
            .field("should_change_text", &self.should_change_text.is_some())
            .field("context_menu", &self.context_menu.is_some())
            .field("did_layout_viewport", &self.did_layout_viewport.is_some())
            .field("completion_items", &self.completion_items.is_some())
            .finish()
    }
}

/// Everything a plugin gets to see during setup.
pub struct PluginContext<'a> {
    pub events: &'a mut PluginEvents,
    /// Per-registration scratch state created by [`Plugin::make_coordinator`].
    pub coordinator: &'a mut dyn Any,
}

pub trait Plugin {
    /// State object owned by the hub for this registration. Created once,
    /// right before [`set_up`](Self::set_up).
    fn make_coordinator(&self) -> Box<dyn Any> {
        Box::new(())
    }

    /// Subscribe to events. Called exactly once per registration, when the
    /// hub activates (or immediately on registration into an active hub).
    fn set_up(&mut self, context: &mut PluginContext<'_>);

    /// Release external resources. Called on unregistration and on hub drop.
    fn tear_down(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(u64);

struct Registration {
    id: PluginId,
    instance: Box<dyn Plugin>,
    coordinator: Box<dyn Any>,
    /// Present if and only if the plugin has been set up.
    events: Option<PluginEvents>,
}

/// Owns plugin registrations and dispatches editing events to them.
#[derive(Default)]
pub struct PluginHub {
    registrations: Vec<Registration>,
    active: bool,
    next_id: u64,
}

impl PluginHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. If the hub is already active the plugin is set up
    /// immediately, otherwise setup waits for [`activate`](Self::activate).
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        self.next_id += 1;
        let id = PluginId(self.next_id);
        self.registrations.push(Registration {
            id,
            instance: plugin,
            coordinator: Box::new(()),
            events: None,
        });
        debug!("plugin {id:?} registered");
        if self.active {
            if let Some(reg) = self.registrations.last_mut() {
                set_up(reg);
            }
        }
        id
    }

    /// Tear down and drop the given registration. Returns `false` when the id
    /// is unknown.
    pub fn unregister(&mut self, id: PluginId) -> bool {
        let Some(index) = self.registrations.iter().position(|r| r.id == id) else {
            return false;
        };
        let mut reg = self.registrations.remove(index);
        if reg.events.is_some() {
            reg.instance.tear_down();
        }
        debug!("plugin {id:?} unregistered");
        true
    }

    /// Set up every plugin that has not been set up yet. Idempotent.
    pub fn activate(&mut self) {
        self.active = true;
        for reg in &mut self.registrations {
            set_up(reg);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the given plugin has had its `set_up` call. Hosts use this to
    /// guard coordinator access; the hub itself does not.
    pub fn is_setup(&self, id: PluginId) -> bool {
        self.registrations
            .iter()
            .any(|r| r.id == id && r.events.is_some())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Ask every subscriber whether the edit may proceed. All subscribers are
    /// consulted, even after one of them has already said no.
    pub fn should_change_text(&self, range: &TextRange, replacement: &str) -> bool {
        let mut allowed = true;
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.should_change_text.as_deref()) {
                if !f(range, replacement) {
                    debug!("edit at {range:?} vetoed by plugin {:?}", reg.id);
                    allowed = false;
                }
            }
        }
        allowed
    }

    pub fn will_change_text(&self, range: &TextRange) {
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.will_change_text.as_deref()) {
                f(range);
            }
        }
    }

    pub fn did_change_text(&self, range: &TextRange, replacement: &str) {
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.did_change_text.as_deref()) {
                f(range, replacement);
            }
        }
    }

    pub fn did_layout_viewport(&self, visible: Option<&TextRange>) {
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.did_layout_viewport.as_deref()) {
                f(visible);
            }
        }
    }

    /// First subscriber in registration order wins.
    pub fn context_menu(&self, at: Location, content: &dyn TextContent) -> Option<Menu> {
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.context_menu.as_deref()) {
                return Some(f(at, content));
            }
        }
        None
    }

    /// First subscriber in registration order wins.
    pub fn completion_items(
        &self,
        at: Location,
        content: &dyn TextContent,
    ) -> Option<Vec<CompletionCandidate>> {
        for reg in &self.registrations {
            if let Some(f) = handler(reg, |e| e.completion_items.as_deref()) {
                return Some(f(at, content));
            }
        }
        None
    }
}

fn set_up(reg: &mut Registration) {
    if reg.events.is_some() {
        return;
    }
    reg.coordinator = reg.instance.make_coordinator();
    let mut events = PluginEvents::default();
    reg.instance.set_up(&mut PluginContext {
        events: &mut events,
        coordinator: reg.coordinator.as_mut(),
    });
    debug!("plugin {:?} set up: {events:?}", reg.id);
    reg.events = Some(events);
}

fn handler<'a, T: ?Sized>(
    reg: &'a Registration,
    pick: impl FnOnce(&'a PluginEvents) -> Option<&'a T>,
) -> Option<&'a T> {
    reg.events.as_ref().and_then(pick)
}

impl Drop for PluginHub {
    fn drop(&mut self) {
        for reg in &mut self.registrations {
            if reg.events.is_some() {
                reg.instance.tear_down();
            }
        }
    }
}
