use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use kestrel_core::{KestrelError, Result};

/// Persona description loaded from a JSON character file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    /// Explicit system prompt. The persona fields are appended to it.
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub bio: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub lore: Vec<String>,
    #[serde(default)]
    pub style: StyleGuide,
    /// Preferred provider, e.g. "openai" or "together".
    #[serde(default, alias = "modelProvider")]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleGuide {
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub chat: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            name: "Kestrel".into(),
            system: None,
            bio: vec![],
            lore: vec![],
            style: StyleGuide::default(),
            model_provider: None,
            settings: BTreeMap::new(),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl Character {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let character: Character = serde_json::from_str(&raw).map_err(|e| {
            KestrelError::Config(format!("invalid character file {}: {e}", path.display()))
        })?;
        info!(name = %character.name, ?path, "loaded character");
        Ok(character)
    }

    /// Model id from `settings.model`, if the character pins one.
    pub fn model(&self) -> Option<&str> {
        self.settings.get("model").and_then(Value::as_str)
    }

    /// The system prompt sent with every model turn.
    pub fn system_prompt(&self) -> String {
        let mut prompt = self
            .system
            .clone()
            .unwrap_or_else(|| format!("You are {}.", self.name));

        let mut section = |title: &str, lines: &[String]| {
            if lines.is_empty() {
                return;
            }
            prompt.push_str("\n\n");
            prompt.push_str(title);
            prompt.push(':');
            for line in lines {
                prompt.push_str("\n- ");
                prompt.push_str(line);
            }
        };
        section(&format!("About {}", self.name), &self.bio);
        section("Background", &self.lore);
        let style: Vec<String> = self
            .style
            .all
            .iter()
            .chain(&self.style.chat)
            .cloned()
            .collect();
        section("Style", &style);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bio_accepts_string_or_list() {
        let c: Character = serde_json::from_str(r#"{"name": "a", "bio": "one line"}"#).unwrap();
        assert_eq!(c.bio, vec!["one line"]);
        let c: Character = serde_json::from_str(r#"{"name": "a", "bio": ["x", "y"]}"#).unwrap();
        assert_eq!(c.bio.len(), 2);
    }

    #[test]
    fn test_system_prompt_sections() {
        let c: Character = serde_json::from_str(
            r#"{
                "name": "Kes",
                "bio": ["watches the timeline"],
                "lore": "was once a bird",
                "style": {"all": ["be brief"], "chat": ["no emojis"], "post": ["ignored"]},
                "modelProvider": "together",
                "settings": {"model": "meta-llama/Llama-3-70b"}
            }"#,
        )
        .unwrap();
        let prompt = c.system_prompt();
        assert!(prompt.starts_with("You are Kes."));
        assert!(prompt.contains("About Kes:\n- watches the timeline"));
        assert!(prompt.contains("Background:\n- was once a bird"));
        assert!(prompt.contains("- be brief\n- no emojis"));
        assert!(!prompt.contains("ignored"));
        assert_eq!(c.model_provider.as_deref(), Some("together"));
        assert_eq!(c.model(), Some("meta-llama/Llama-3-70b"));
    }

    #[test]
    fn test_explicit_system_prompt_is_kept() {
        let c = Character {
            system: Some("Stay on topic.".into()),
            ..Default::default()
        };
        assert_eq!(c.system_prompt(), "Stay on topic.");
    }
}
