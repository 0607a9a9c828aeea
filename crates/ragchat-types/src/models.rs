//! Catalog of models a user can pick for a conversation.
//!
//! The proxy forwards the selected id untouched; the catalog only drives what
//! clients offer and what new conversations default to.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<&'static str>,
}

pub const DEFAULT_MODEL: &str = "gpt-5";

pub const AVAILABLE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4-mini",
        name: "GPT-4 Mini",
        description: "Fast and efficient",
        badge: None,
    },
    ModelInfo {
        id: "gpt-5",
        name: "GPT-5",
        description: "The most capable",
        badge: None,
    },
    ModelInfo {
        id: "gpt-oss-120b",
        name: "GPT-OSS 120B",
        description: "Open source, free",
        badge: Some("Free"),
    },
];

/// Look up a catalog entry by id.
pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}
