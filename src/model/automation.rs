use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AutomationId, UserId};

/// A user-defined binding of one trigger (with parameters) to one reaction
/// (with parameters).
///
/// `trigger_check_data` is the trigger's checkpoint. Its shape belongs to the
/// trigger implementation; the scheduler stores and forwards it as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub user_id: UserId,
    pub name: String,
    pub trigger_service_id: String,
    pub trigger_id: u32,
    pub trigger_params: Value,
    pub trigger_check_data: Value,
    pub reaction_service_id: String,
    pub reaction_id: u32,
    pub reaction_params: Value,
    pub active: bool,
    pub favorite: bool,
}

/// Payload for creating an automation.
///
/// New automations start active, not favorite, with an empty checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAutomation {
    pub name: String,
    pub trigger_service_id: String,
    pub trigger_id: u32,
    #[serde(default = "empty_object")]
    pub trigger_params: Value,
    pub reaction_service_id: String,
    pub reaction_id: u32,
    #[serde(default = "empty_object")]
    pub reaction_params: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Targeted partial update of an automation row.
///
/// Only the fields set to `Some` are written. The scheduler only ever builds
/// [`AutomationUpdate::checkpoint`]; the other fields are owned by the user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_check_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

impl AutomationUpdate {
    /// Checkpoint-only update written by the scheduler.
    pub fn checkpoint(value: Value) -> Self {
        Self {
            trigger_check_data: Some(value),
            ..Default::default()
        }
    }

    /// Parameters and name, as edited by the user.
    pub fn settings(trigger_params: Value, reaction_params: Value, name: impl Into<String>) -> Self {
        Self {
            trigger_params: Some(trigger_params),
            reaction_params: Some(reaction_params),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
