//! Sessions, providers and model references as reported by the runtime.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::AgentError;

/// A `provider/model` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelRef {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelRef {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Parse `provider/model`. The model part may itself contain slashes.
    pub fn parse(spec: &str) -> Option<Self> {
        let (provider, model) = spec.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    /// Sorted by model id.
    pub models: Vec<ModelInfo>,
}

/// The runtime's provider catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCatalog {
    pub providers: Vec<ProviderInfo>,
    /// Default model id per provider id.
    pub defaults: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    providers: Vec<RawProvider>,
    #[serde(default)]
    default: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawProvider {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    models: BTreeMap<String, RawModel>,
}

#[derive(Deserialize)]
struct RawModel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ProviderCatalog {
    pub fn from_json(value: serde_json::Value) -> Result<Self, AgentError> {
        let raw: RawCatalog = serde_json::from_value(value)?;
        let providers = raw
            .providers
            .into_iter()
            .map(|p| ProviderInfo {
                name: p.name.unwrap_or_else(|| p.id.clone()),
                models: p
                    .models
                    .into_iter()
                    .map(|(key, m)| ModelInfo {
                        id: m.id.unwrap_or(key),
                        name: m.name,
                    })
                    .collect(),
                id: p.id,
            })
            .collect();
        Ok(Self {
            providers,
            defaults: raw.default,
        })
    }

    /// Whether the catalog lists `model`.
    pub fn contains(&self, model: &ModelRef) -> bool {
        self.providers
            .iter()
            .filter(|p| p.id == model.provider_id)
            .any(|p| p.models.iter().any(|m| m.id == model.model_id))
    }

    /// The catalog-wide default: the first provider that names one.
    pub fn default_model(&self) -> Option<ModelRef> {
        self.providers.iter().find_map(|p| {
            self.defaults
                .get(&p.id)
                .map(|model| ModelRef::new(p.id.clone(), model.clone()))
        })
    }
}

/// A runtime session as returned by the session listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: Option<String>,
    /// Model the session is currently using, when the runtime reports it.
    pub model: Option<ModelRef>,
    /// Last update time (runtime-defined units, larger is newer).
    pub updated: i64,
}

#[derive(Deserialize)]
struct RawSession {
    id: String,
    #[serde(rename = "parentID", default)]
    parent_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    model: Option<RawSessionModel>,
    #[serde(default)]
    time: Option<RawTime>,
}

#[derive(Deserialize)]
struct RawSessionModel {
    #[serde(rename = "providerID")]
    provider_id: String,
    #[serde(rename = "modelID")]
    model_id: String,
}

#[derive(Deserialize)]
struct RawTime {
    #[serde(default)]
    updated: i64,
}

impl SessionInfo {
    pub fn list_from_json(value: serde_json::Value) -> Result<Vec<Self>, AgentError> {
        let raw: Vec<RawSession> = serde_json::from_value(value)?;
        Ok(raw
            .into_iter()
            .map(|s| SessionInfo {
                id: s.id,
                parent_id: s.parent_id.filter(|p| !p.is_empty()),
                title: s.title,
                model: s.model.map(|m| ModelRef::new(m.provider_id, m.model_id)),
                updated: s.time.map(|t| t.updated).unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_ref_parse() {
        assert_eq!(
            ModelRef::parse("anthropic/claude-sonnet"),
            Some(ModelRef::new("anthropic", "claude-sonnet"))
        );
        assert_eq!(
            ModelRef::parse("openrouter/meta/llama"),
            Some(ModelRef::new("openrouter", "meta/llama"))
        );
        assert_eq!(ModelRef::parse("no-slash"), None);
        assert_eq!(ModelRef::parse("/model"), None);
    }

    #[test]
    fn catalog_from_json() {
        let catalog = ProviderCatalog::from_json(json!({
            "providers": [
                {"id": "anthropic", "name": "Anthropic", "models": {
                    "claude-b": {"id": "claude-b", "name": "Claude B"},
                    "claude-a": {"name": "Claude A"}
                }},
                {"id": "local", "models": {}}
            ],
            "default": {"anthropic": "claude-b"}
        }))
        .unwrap();
        assert_eq!(catalog.providers.len(), 2);
        assert_eq!(catalog.providers[0].models[0].id, "claude-a");
        assert_eq!(catalog.providers[1].name, "local");
        assert!(catalog.contains(&ModelRef::new("anthropic", "claude-a")));
        assert!(!catalog.contains(&ModelRef::new("local", "claude-a")));
        assert_eq!(
            catalog.default_model(),
            Some(ModelRef::new("anthropic", "claude-b"))
        );
    }

    #[test]
    fn sessions_from_json() {
        let sessions = SessionInfo::list_from_json(json!([
            {"id": "ses_1", "title": "main", "time": {"created": 1, "updated": 5},
             "model": {"providerID": "anthropic", "modelID": "claude-a"}},
            {"id": "ses_2", "parentID": "ses_1"}
        ]))
        .unwrap();
        assert_eq!(sessions[0].model, Some(ModelRef::new("anthropic", "claude-a")));
        assert_eq!(sessions[0].updated, 5);
        assert_eq!(sessions[1].parent_id.as_deref(), Some("ses_1"));
        assert_eq!(sessions[1].updated, 0);
    }
}
