use super::{split_model_id, LlmError, LlmResult};
use std::collections::BTreeMap;

/// Bots that can be added to a room: short name -> `provider:model`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCatalog {
    entries: BTreeMap<String, String>,
}

/// Short names must be usable in an `@name` mention
fn is_mention_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ModelCatalog {
    pub fn from_pairs<N, M>(pairs: impl IntoIterator<Item = (N, M)>) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(n, m)| (n.into(), m.into()))
                .collect(),
        }
    }

    /// Parse `alpha=openai:gpt-4o-mini, llama=ollama:llama3.2`
    pub fn parse(raw: &str) -> LlmResult<Self> {
        let mut entries = BTreeMap::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, model) = entry.split_once('=').ok_or_else(|| {
                LlmError::ConfigError(format!("Catalog entry '{}' is not name=provider:model", entry))
            })?;
            let (name, model) = (name.trim(), model.trim());

            if !is_mention_name(name) {
                return Err(LlmError::ConfigError(format!(
                    "Bot name '{}' may only contain letters, digits and '_'",
                    name
                )));
            }
            split_model_id(model)?;

            if entries.insert(name.to_string(), model.to_string()).is_some() {
                return Err(LlmError::ConfigError(format!(
                    "Bot name '{}' appears twice in catalog",
                    name
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Model binding for a short name
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Short names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, m)| (n.as_str(), m.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
