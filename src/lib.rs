//! `padkit` — the interactive control core of a text editing view: caret
//! movement, undo with typing coalescing, plugins, and completion.
//!
//! The crate is host-agnostic: text storage and layout live behind the
//! traits in [`host`], so the same control logic drives any backend that can
//! answer layout queries and apply edits. A rope-backed monospace host ships
//! in [`buffer`] as a working reference.
//!
//! ## Reading guide (high level architecture)
//! - **`types`**: locations, ranges, geometry, and the shared edit record.
//! - **`host`**: the traits a text backend implements (`LayoutQuery`,
//!   `TextContent`, `DocumentEdit`).
//! - **`navigation`**: directional caret moves; vertical moves correct the
//!   naive character-offset target back to the origin's visual column.
//! - **`undo`**: grouped inverse-edit history plus the coalescing layer that
//!   merges a typing run into one undo step.
//! - **`plugins`**: registration, setup/teardown lifecycle, and event
//!   fan-out (edit consent, change notifications, context menus, viewport
//!   layout, completion items). **`plugins::script`** loads Rhai-scripted
//!   plugins from `plugins/*/plugin.toml`.
//! - **`completion`**: the popover state machine and its window-system
//!   observer handling.
//! - **`control::TextControl`**: ties the pieces together; every edit runs
//!   through its pipeline.

pub mod buffer;
pub mod completion;
pub mod control;
pub mod host;
pub mod navigation;
pub mod plugins;
pub mod types;
pub mod undo;

pub use buffer::Buffer;
pub use completion::{
    CompletionCandidate, CompletionController, CompletionDelegate, CompletionSession, PopoverHost,
    Subscription, WindowId, WordCandidates,
};
pub use control::TextControl;
pub use host::{DocumentEdit, LayoutQuery, TextContent, TextHost};
pub use plugins::{Menu, MenuItem, Plugin, PluginContext, PluginEvents, PluginHub, PluginId};
pub use types::{
    Direction, LineFragment, Location, MoveUnit, Movement, Point, RecordedEdit, Rect, TextRange,
};
pub use undo::{CoalescingUndo, EditLog, UndoLog};
