//! Prompt template store.
//!
//! Loads prompt templates from `~/.config/charter/prompts/` at runtime,
//! falling back to compiled-in defaults from `prompts/` in the source tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Well-known prompt keys
// ---------------------------------------------------------------------------

/// Base system prompt sent with every chat turn.
pub const CHAT_SYSTEM: &str = "chat-system";
/// Instruction describing the `<project_plan>` block format. Injected for a
/// single turn when the plan-request detector fires.
pub const PLAN_FORMAT: &str = "plan-format";

const DEFAULTS: &[(&str, &str)] = &[
    (CHAT_SYSTEM, include_str!("../prompts/chat-system.md")),
    (PLAN_FORMAT, include_str!("../prompts/plan-format.md")),
];

// ---------------------------------------------------------------------------
// PromptStore
// ---------------------------------------------------------------------------

/// Runtime prompt store. On construction it loads embedded defaults, then
/// overlays any `.md` files found in `override_dir`, so prompts can be
/// customised without recompiling.
pub struct PromptStore {
    prompts: HashMap<String, String>,
}

impl PromptStore {
    pub fn load(override_dir: Option<&Path>) -> Self {
        let mut prompts: HashMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if let Some(dir) = override_dir {
            Self::overlay_from_dir(&mut prompts, dir);
        }

        Self { prompts }
    }

    /// Get a template by key. Returns `None` for unknown keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.prompts.get(key).map(|s| s.as_str())
    }

    /// Default override dir: `~/.config/charter/prompts/`.
    pub fn default_override_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("charter")
            .join("prompts")
    }

    /// Read every `.md` file in `dir` and insert/overwrite matching keys.
    fn overlay_from_dir(prompts: &mut HashMap<String, String>, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return, // dir doesn't exist — that's fine
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(content) = std::fs::read_to_string(&path) {
                prompts.insert(stem.to_string(), content);
            }
        }
    }
}
