//! Serializable catalog of connectors for discovery by the web layer.

use crate::connector::{FieldSpec, ServiceConnector};
use serde::Serialize;

/// Translates a display string for a language code.
///
/// Only `name` and `description` strings go through the translator.
pub trait Translator: Send + Sync {
    fn translate(&self, lang: &str, text: &str) -> String;
}

impl<F> Translator for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn translate(&self, lang: &str, text: &str) -> String {
        self(lang, text)
    }
}

/// Identity translator.
pub struct NoTranslation;

impl Translator for NoTranslation {
    fn translate(&self, _lang: &str, text: &str) -> String {
        text.to_string()
    }
}

/// Summary of a trigger or reaction.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OperationSummary {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

/// Catalog entry for one connector.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConnectorSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    pub triggers: Vec<OperationSummary>,
    pub reactions: Vec<OperationSummary>,
}

impl ConnectorSummary {
    pub(crate) fn describe(connector: &dyn ServiceConnector, lang: &str, t: &dyn Translator) -> Self {
        let info = connector.info();
        Self {
            id: info.id.clone(),
            name: t.translate(lang, &info.name),
            description: t.translate(lang, &info.description),
            color: info.color.clone(),
            icon: info.icon.clone(),
            triggers: connector
                .triggers()
                .iter()
                .map(|tr| operation(tr.id(), tr.name(), tr.description(), tr.fields(), lang, t))
                .collect(),
            reactions: connector
                .reactions()
                .iter()
                .map(|r| operation(r.id(), r.name(), r.description(), r.fields(), lang, t))
                .collect(),
        }
    }
}

fn operation(
    id: u32,
    name: &str,
    description: &str,
    fields: &[FieldSpec],
    lang: &str,
    t: &dyn Translator,
) -> OperationSummary {
    OperationSummary {
        id,
        name: t.translate(lang, name),
        description: t.translate(lang, description),
        fields: fields
            .iter()
            .map(|f| FieldSpec {
                name: t.translate(lang, &f.name),
                description: t.translate(lang, &f.description),
                ..f.clone()
            })
            .collect(),
    }
}
