//! Parameter schema declared by triggers and reactions.
//!
//! The schema only drives external form rendering; the engine never
//! interprets field values except for the per-field fallback applied by
//! [`ReactionContext::param_or_fallback`](super::ReactionContext::param_or_fallback).

use serde::{Deserialize, Serialize};

/// Input type of a field, as rendered by the web and mobile clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

/// Value substituted when the user leaves a reaction field empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFallback {
    /// Use the fired event's `text`.
    EventText,
}

/// One declared parameter of a trigger or reaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FieldFallback>,
}

impl FieldSpec {
    pub fn text(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind: FieldKind::Text,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: FieldFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }
}
