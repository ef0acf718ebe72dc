//! Loads `<name>.prompt.md` files from a directory into a [`PromptRegistry`],
//! with an optional filesystem watcher for hot reload (§4.2).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::RwLock;

use super::{PromptArgument, PromptTemplate};

/// Front-matter shape parsed with `serde_yaml`.
#[derive(Debug, serde::Deserialize)]
struct FrontMatter {
    name: String,
    description: String,
    #[serde(default)]
    arguments: Vec<PromptArgument>,
}

/// Templates shipped so a fresh prompts directory is never empty — the
/// `system` prompt in particular is required by the dispatcher (§6).
const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    (
        "system.prompt.md",
        r#"---
name: system
description: Root system prompt rendered once per agent turn.
arguments:
  - name: agent_name
    description: Display name of the agent.
    required: true
  - name: current_date
    description: Current date/time.
    required: true
  - name: tools_section
    description: Rendered catalog of available tools.
    required: true
  - name: prompts_section
    description: Rendered catalog of available prompts.
    required: true
  - name: resources_section
    description: Rendered catalog of available resources.
    required: true
  - name: role_definition
    description: Free-form role description for this agent.
    required: true
  - name: memory_summary
    description: Current Window Memory cumulative summary.
    required: true
---
You are {{ agent_name }}, an autonomous agent. The current date is {{ current_date }}.

{{ role_definition }}

## Capabilities

### Tools
{{ tools_section }}

### Prompts
{{ prompts_section }}

### Resources
{{ resources_section }}

## Conversation memory so far
{{ memory_summary }}
"#,
    ),
    (
        "summarize.prompt.md",
        r#"---
name: summarize
description: Produce a TL;DR of the given text within a token budget.
arguments:
  - name: text
    description: Text to summarise.
    required: true
  - name: max_tokens
    description: Target maximum length of the summary, in tokens.
    required: true
---
Summarise the following text in no more than {{ max_tokens }} tokens. Respond with only the summary, no preamble.

{{ text }}
"#,
    ),
];

/// Registry of loaded prompt templates, backed by a `RwLock`-protected map.
pub struct PromptRegistry {
    dir: PathBuf,
    templates: RwLock<HashMap<String, PromptTemplate>>,
}

impl PromptRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.into(),
            templates: RwLock::new(HashMap::new()),
        })
    }

    /// Seed `dir` with [`DEFAULT_TEMPLATES`] if it is empty or missing.
    pub fn ensure_defaults(&self) -> Result<(), String> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| format!("PROMPT_DIR_ERROR: {e}"))?;
        }
        let has_prompts = std::fs::read_dir(&self.dir)
            .map_err(|e| format!("PROMPT_DIR_ERROR: {e}"))?
            .flatten()
            .any(|entry| is_prompt_file(&entry.path()));
        if has_prompts {
            return Ok(());
        }
        for (filename, content) in DEFAULT_TEMPLATES {
            std::fs::write(self.dir.join(filename), content)
                .map_err(|e| format!("PROMPT_DIR_ERROR: {e}"))?;
        }
        Ok(())
    }

    /// (Re-)load every `*.prompt.md` file in `dir`. Parse errors on one file
    /// skip only that file (§4.2 failure modes).
    pub async fn load(&self) -> Result<(), String> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| format!("PROMPT_DIR_ERROR: {e}"))?;

        let mut loaded = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_prompt_file(&path) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                tracing::warn!(path = %path.display(), "failed to read prompt file");
                continue;
            };
            match parse_template(&content) {
                Ok(template) => {
                    loaded.insert(template.name.clone(), template);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparsable prompt file");
                }
            }
        }

        let mut templates = self.templates.write().await;
        *templates = loaded;
        Ok(())
    }

    /// Fails if no template named `system` was loaded (§6: "The `system`
    /// prompt is required").
    pub async fn require_system_prompt(&self) -> Result<(), String> {
        if self.templates.read().await.contains_key("system") {
            Ok(())
        } else {
            Err("CONFIG_FATAL: no `system` prompt template found".to_string())
        }
    }

    pub async fn get(&self, name: &str) -> Option<PromptTemplate> {
        self.templates.read().await.get(name).cloned()
    }

    /// All templates, sorted by name for deterministic listing.
    pub async fn list(&self) -> Vec<PromptTemplate> {
        let mut all: Vec<PromptTemplate> = self.templates.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Render template `name` against `vars`. Unknown `name` → caller maps to
    /// `PROMPT_NOT_FOUND` (§4.5).
    pub async fn render(&self, name: &str, vars: &HashMap<String, String>) -> Result<String, String> {
        let template = self
            .get(name)
            .await
            .ok_or_else(|| format!("PROMPT_NOT_FOUND: {name}"))?;

        let mut context = tera::Context::new();
        for (k, v) in vars {
            context.insert(k, v);
        }

        let mut engine = tera::Tera::default();
        engine
            .add_raw_template(&template.name, &template.template_source)
            .map_err(|e| format!("template parse error: {e}"))?;
        engine
            .render(&template.name, &context)
            .map_err(|e| format!("template render error: {e}"))
    }

    /// Start a background task that reloads templates whenever a file under
    /// `dir` changes. Returns the watcher — drop it to stop watching.
    pub fn watch(self: &Arc<Self>) -> Result<RecommendedWatcher, String> {
        let registry = self.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| format!("watcher init error: {e}"))?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("watcher attach error: {e}"))?;

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event.is_ok() {
                    if let Err(e) = registry.load().await {
                        tracing::warn!(error = %e, "prompt hot-reload failed");
                    }
                }
            }
        });

        Ok(watcher)
    }
}

fn is_prompt_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".prompt.md"))
        .unwrap_or(false)
}

fn parse_template(content: &str) -> Result<PromptTemplate, String> {
    let rest = content
        .strip_prefix("---\n")
        .ok_or_else(|| "missing YAML front-matter".to_string())?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| "unterminated YAML front-matter".to_string())?;
    let frontmatter_src = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n').to_string();

    let frontmatter: FrontMatter =
        serde_yaml::from_str(frontmatter_src).map_err(|e| format!("front-matter parse error: {e}"))?;

    Ok(PromptTemplate {
        name: frontmatter.name,
        description: frontmatter.description,
        arguments: frontmatter.arguments,
        template_source: body,
    })
}
