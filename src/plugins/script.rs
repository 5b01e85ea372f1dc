//! Script-defined plugins: loads Rhai scripts from `plugins/*/plugin.toml`.
//!
//! A manifest names the script file and which script functions handle which
//! editing events. Hook calls are best-effort: a script error is logged and
//! the editing pipeline keeps going. A failing consent hook counts as
//! consent, so a broken plugin cannot lock the document.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use super::{Plugin, PluginContext};
use crate::types::TextRange;

/// Parsed representation of a plugin's `plugin.toml` manifest.
///
/// This tells us:
/// - the plugin identity (`id`, `name`)
/// - which Rhai script file to load (`script`)
/// - which script functions handle editing events (`hooks`)
#[derive(Debug, Deserialize)]
struct PluginManifest {
    id: String,
    name: Option<String>,
    script: String,

    #[serde(default)]
    hooks: PluginHooks,
}

/// Optional hook function names (in the Rhai script).
#[derive(Debug, Clone, Deserialize, Default)]
struct PluginHooks {
    will_change_text: Option<String>,
    did_change_text: Option<String>,
    should_change_text: Option<String>,
}

/// Compiled script shared by the event handlers of one plugin.
struct ScriptRuntime {
    id: String,
    engine: rhai::Engine,
    ast: rhai::AST,
}

impl ScriptRuntime {
    /// Run a hook function for its side effects. Errors are logged, not
    /// propagated.
    fn call_hook(&self, func: &str, args: impl rhai::FuncArgs) {
        let mut scope = rhai::Scope::new();
        if let Err(e) = self
            .engine
            .call_fn::<rhai::Dynamic>(&mut scope, &self.ast, func, args)
        {
            warn!("plugin hook error ({}::{func}): {e}", self.id);
        }
    }

    /// Run a consent hook. Errors are logged and count as consent.
    fn call_consent_hook(&self, func: &str, args: impl rhai::FuncArgs) -> bool {
        let mut scope = rhai::Scope::new();
        match self
            .engine
            .call_fn::<bool>(&mut scope, &self.ast, func, args)
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("plugin consent hook error ({}::{func}): {e}", self.id);
                true
            }
        }
    }
}

/// A plugin whose behavior lives in a Rhai script.
pub struct ScriptPlugin {
    name: String,
    runtime: Rc<ScriptRuntime>,
    hooks: PluginHooks,
}

impl ScriptPlugin {
    /// Load a single plugin from its directory (the one holding
    /// `plugin.toml`).
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join("plugin.toml");
        let manifest_s = fs::read_to_string(&manifest_path)
            .with_context(|| format!("Reading {}", manifest_path.display()))?;
        let manifest: PluginManifest = toml::from_str(&manifest_s)
            .with_context(|| format!("Parsing {}", manifest_path.display()))?;

        let mut engine = rhai::Engine::new();
        engine.set_max_operations(2_000_000); // keep scripts from hanging the editor

        let script_path = dir.join(&manifest.script);
        let ast = engine
            .compile_file(script_path.clone())
            .map_err(|e| anyhow!("Compiling {}: {}", script_path.display(), e))?;

        let name = manifest.name.unwrap_or_else(|| manifest.id.clone());
        debug!("script plugin {:?} loaded from {}", manifest.id, dir.display());
        Ok(Self {
            name,
            runtime: Rc::new(ScriptRuntime {
                id: manifest.id,
                engine,
                ast,
            }),
            hooks: manifest.hooks,
        })
    }

    pub fn id(&self) -> &str {
        &self.runtime.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[allow(clippy::cast_possible_wrap)]
fn range_args(range: &TextRange) -> (i64, i64) {
    (range.start().raw() as i64, range.end().raw() as i64)
}

impl Plugin for ScriptPlugin {
    fn set_up(&mut self, context: &mut PluginContext<'_>) {
        if let Some(func) = self.hooks.will_change_text.clone() {
            let runtime = Rc::clone(&self.runtime);
            context.events.on_will_change_text(move |range| {
                let (start, end) = range_args(range);
                runtime.call_hook(&func, (start, end));
            });
        }
        if let Some(func) = self.hooks.did_change_text.clone() {
            let runtime = Rc::clone(&self.runtime);
            context.events.on_did_change_text(move |range, replacement| {
                let (start, end) = range_args(range);
                runtime.call_hook(&func, (start, end, replacement.to_string()));
            });
        }
        if let Some(func) = self.hooks.should_change_text.clone() {
            let runtime = Rc::clone(&self.runtime);
            context.events.should_change_text(move |range, replacement| {
                let (start, end) = range_args(range);
                runtime.call_consent_hook(&func, (start, end, replacement.to_string()))
            });
        }
    }

    fn tear_down(&mut self) {
        debug!("script plugin {:?} torn down", self.runtime.id);
    }
}

/// Load all plugins from `search_dirs`.
///
/// Expected structure: `<dir>/<plugin>/plugin.toml`. Missing directories are
/// skipped; a malformed plugin aborts the load with context.
pub fn load_script_plugins(search_dirs: &[PathBuf]) -> Result<Vec<ScriptPlugin>> {
    let mut plugins = Vec::new();
    for dir in search_dirs {
        if !dir.exists() {
            continue;
        }
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for ent in entries.flatten() {
            let path = ent.path();
            if !path.is_dir() || !path.join("plugin.toml").exists() {
                continue;
            }
            plugins.push(ScriptPlugin::load(&path)?);
        }
    }
    Ok(plugins)
}
