//! Connector registry - the set of available service connectors.
//!
//! Built once at process start with [`ConnectorRegistry::builder`] and shared
//! read-only (`Arc<ConnectorRegistry>`) with the scheduler and the web layer.

mod catalog;

pub use catalog::{ConnectorSummary, NoTranslation, OperationSummary, Translator};

use crate::connector::{Reaction, ServiceConnector, Trigger};
use crate::error::AreaError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Immutable, id-indexed set of connectors.
pub struct ConnectorRegistry {
    /// Registration order, used for the catalog
    connectors: Vec<Arc<dyn ServiceConnector>>,
    /// id → position in `connectors`
    index: HashMap<String, usize>,
}

/// Collects connectors before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    connectors: Vec<Arc<dyn ServiceConnector>>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    /// Adds a connector.
    ///
    /// Rejects a connector whose id is already registered, and a connector
    /// declaring the same trigger or reaction id twice.
    pub fn register(mut self, connector: Arc<dyn ServiceConnector>) -> Result<Self, AreaError> {
        let id = connector.id().to_string();
        if self.index.contains_key(&id) {
            return Err(AreaError::DuplicateConnector {
                kind: "connector",
                id,
            });
        }

        let mut trigger_ids = HashSet::new();
        for trigger in connector.triggers() {
            if !trigger_ids.insert(trigger.id()) {
                return Err(AreaError::DuplicateConnector {
                    kind: "trigger",
                    id: format!("{}/{}", id, trigger.id()),
                });
            }
        }
        let mut reaction_ids = HashSet::new();
        for reaction in connector.reactions() {
            if !reaction_ids.insert(reaction.id()) {
                return Err(AreaError::DuplicateConnector {
                    kind: "reaction",
                    id: format!("{}/{}", id, reaction.id()),
                });
            }
        }

        info!(
            connector = %id,
            triggers = connector.triggers().len(),
            reactions = connector.reactions().len(),
            "Registered connector"
        );
        self.index.insert(id, self.connectors.len());
        self.connectors.push(connector);
        Ok(self)
    }

    pub fn build(self) -> ConnectorRegistry {
        ConnectorRegistry {
            connectors: self.connectors,
            index: self.index,
        }
    }
}

impl ConnectorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// All connectors, in registration order.
    pub fn connectors(&self) -> &[Arc<dyn ServiceConnector>] {
        &self.connectors
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ServiceConnector>> {
        self.index.get(id).map(|&i| Arc::clone(&self.connectors[i]))
    }

    pub fn get_trigger(&self, service_id: &str, trigger_id: u32) -> Option<Arc<dyn Trigger>> {
        self.get(service_id)?.trigger(trigger_id)
    }

    pub fn get_reaction(&self, service_id: &str, reaction_id: u32) -> Option<Arc<dyn Reaction>> {
        self.get(service_id)?.reaction(reaction_id)
    }

    /// Read-only catalog of every connector with its triggers and reactions.
    pub fn catalog(&self) -> Vec<ConnectorSummary> {
        self.catalog_translated("", &NoTranslation)
    }

    /// Same as [`catalog`](Self::catalog), with every `name`/`description`
    /// passed through `translator` for `lang`.
    pub fn catalog_translated(&self, lang: &str, translator: &dyn Translator) -> Vec<ConnectorSummary> {
        self.connectors
            .iter()
            .map(|c| ConnectorSummary::describe(c.as_ref(), lang, translator))
            .collect()
    }

    /// Catalog entry of a single connector, `None` when the id is unknown.
    pub fn connector_summary(
        &self,
        id: &str,
        translation: Option<(&str, &dyn Translator)>,
    ) -> Option<ConnectorSummary> {
        let connector = self.get(id)?;
        let (lang, translator): (&str, &dyn Translator) = match translation {
            Some(t) => t,
            None => ("", &NoTranslation),
        };
        Some(ConnectorSummary::describe(connector.as_ref(), lang, translator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        CheckContext, CheckOutcome, FieldSpec, ReactionContext, ServiceInfo,
    };
    use crate::model::{OAuthToken, UserId};
    use async_trait::async_trait;

    struct StubTrigger(u32);

    #[async_trait]
    impl Trigger for StubTrigger {
        fn id(&self) -> u32 {
            self.0
        }
        fn name(&self) -> &str {
            "Ping"
        }
        fn description(&self) -> &str {
            "Fires on ping"
        }
        fn fields(&self) -> &[FieldSpec] {
            &[]
        }
        async fn check(&self, _: &CheckContext<'_>) -> anyhow::Result<CheckOutcome> {
            Ok(CheckOutcome::idle())
        }
    }

    struct StubReaction(u32);

    #[async_trait]
    impl Reaction for StubReaction {
        fn id(&self) -> u32 {
            self.0
        }
        fn name(&self) -> &str {
            "Pong"
        }
        fn description(&self) -> &str {
            "Answers with pong"
        }
        fn fields(&self) -> &[FieldSpec] {
            &[]
        }
        async fn execute(&self, _: &ReactionContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubConnector {
        info: ServiceInfo,
        triggers: Vec<Arc<dyn Trigger>>,
        reactions: Vec<Arc<dyn Reaction>>,
    }

    impl StubConnector {
        fn new(id: &str, trigger_ids: &[u32], reaction_ids: &[u32]) -> Arc<dyn ServiceConnector> {
            Arc::new(Self {
                info: ServiceInfo {
                    id: id.to_string(),
                    name: format!("{} name", id),
                    description: format!("{} description", id),
                    color: "#000000".to_string(),
                    icon: format!("/{}.png", id),
                },
                triggers: trigger_ids
                    .iter()
                    .map(|&i| Arc::new(StubTrigger(i)) as Arc<dyn Trigger>)
                    .collect(),
                reactions: reaction_ids
                    .iter()
                    .map(|&i| Arc::new(StubReaction(i)) as Arc<dyn Reaction>)
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl ServiceConnector for StubConnector {
        fn info(&self) -> &ServiceInfo {
            &self.info
        }
        fn triggers(&self) -> &[Arc<dyn Trigger>] {
            &self.triggers
        }
        fn reactions(&self) -> &[Arc<dyn Reaction>] {
            &self.reactions
        }
        async fn connect(&self, _: UserId) -> Result<String, AreaError> {
            Err(AreaError::Configuration("stub".to_string()))
        }
        async fn callback(&self, _: &str) -> Result<OAuthToken, AreaError> {
            Ok(OAuthToken::bearer("stub"))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ConnectorRegistry::builder()
            .register(StubConnector::new("alpha", &[1, 2], &[1]))
            .unwrap()
            .register(StubConnector::new("beta", &[1], &[]))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert_eq!(registry.get_trigger("alpha", 2).unwrap().id(), 2);
        assert_eq!(registry.get_reaction("alpha", 1).unwrap().name(), "Pong");
    }

    #[test]
    fn test_unresolved_lookups_are_absent() {
        let registry = ConnectorRegistry::builder()
            .register(StubConnector::new("alpha", &[1], &[1]))
            .unwrap()
            .build();

        assert!(registry.get("gamma").is_none());
        assert!(registry.get_trigger("alpha", 9).is_none());
        assert!(registry.get_trigger("gamma", 1).is_none());
        assert!(registry.get_reaction("alpha", 9).is_none());
        assert!(registry.connector_summary("gamma", None).is_none());
    }

    #[test]
    fn test_duplicate_connector_rejected() {
        let result = ConnectorRegistry::builder()
            .register(StubConnector::new("alpha", &[1], &[]))
            .unwrap()
            .register(StubConnector::new("alpha", &[2], &[]));

        match result {
            Err(AreaError::DuplicateConnector { kind, id }) => {
                assert_eq!(kind, "connector");
                assert_eq!(id, "alpha");
            }
            _ => panic!("expected duplicate connector error"),
        }
    }

    #[test]
    fn test_duplicate_trigger_id_rejected() {
        let result = ConnectorRegistry::builder().register(StubConnector::new("alpha", &[1, 1], &[]));
        assert!(matches!(
            result,
            Err(AreaError::DuplicateConnector { kind: "trigger", .. })
        ));
    }

    #[test]
    fn test_catalog_keeps_registration_order() {
        let registry = ConnectorRegistry::builder()
            .register(StubConnector::new("zeta", &[1], &[]))
            .unwrap()
            .register(StubConnector::new("alpha", &[], &[1]))
            .unwrap()
            .build();

        let catalog = registry.catalog();
        let ids: Vec<&str> = catalog.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert_eq!(catalog[0].triggers.len(), 1);
        assert_eq!(catalog[1].reactions[0].name, "Pong");
    }

    #[test]
    fn test_translation_only_touches_names_and_descriptions() {
        let registry = ConnectorRegistry::builder()
            .register(StubConnector::new("alpha", &[1], &[1]))
            .unwrap()
            .build();

        let shout = |_lang: &str, text: &str| text.to_uppercase();
        let catalog = registry.catalog_translated("fr", &shout);
        let alpha = &catalog[0];

        assert_eq!(alpha.id, "alpha");
        assert_eq!(alpha.icon, "/alpha.png");
        assert_eq!(alpha.name, "ALPHA NAME");
        assert_eq!(alpha.description, "ALPHA DESCRIPTION");
        assert_eq!(alpha.triggers[0].name, "PING");
        assert_eq!(alpha.triggers[0].id, 1);
        assert_eq!(alpha.reactions[0].description, "ANSWERS WITH PONG");

        let single = registry
            .connector_summary("alpha", Some(("fr", &shout as &dyn Translator)))
            .unwrap();
        assert_eq!(single.name, "ALPHA NAME");
    }
}
