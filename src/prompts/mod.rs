//! Prompt templates: files with YAML front-matter rendered through Tera
//! (§4.2, §6 "Prompt file format").

use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::PromptRegistry;

/// One named, optionally-required argument a template accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A Capability Entry of kind Prompt Template (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    /// Raw Jinja-style body, rendered on demand — not part of the on-disk
    /// front-matter, so it is never (de)serialised with it.
    #[serde(skip)]
    pub template_source: String,
}

/// Variables the engine exposes when rendering the required `system` prompt
/// (§6): the prompt body may reference any of these via `{{ name }}`.
#[derive(Debug, Clone)]
pub struct SystemPromptVars {
    pub agent_name: String,
    pub current_date: String,
    pub tools_section: String,
    pub prompts_section: String,
    pub resources_section: String,
    pub role_definition: String,
    pub memory_summary: String,
}

impl SystemPromptVars {
    pub fn into_map(self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        map.insert("agent_name".to_string(), self.agent_name);
        map.insert("current_date".to_string(), self.current_date);
        map.insert("tools_section".to_string(), self.tools_section);
        map.insert("prompts_section".to_string(), self.prompts_section);
        map.insert("resources_section".to_string(), self.resources_section);
        map.insert("role_definition".to_string(), self.role_definition);
        map.insert("memory_summary".to_string(), self.memory_summary);
        map
    }
}
