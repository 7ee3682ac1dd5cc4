//! Change events emitted after a mutation has committed to the record store.
//!
//! Wire form (JSON):
//!
//! ```text
//! {"action":"add","product":{...}}
//! {"action":"update","product":{...}}
//! {"action":"delete","productId":"..."}
//! ```
//!
//! Delivery is best-effort: consumers must tolerate duplicates and
//! reordering across different products.

use serde::{Deserialize, Serialize};

use crate::product::Product;

/// Kind of change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification that a product was added, updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ChangeEvent {
    Add {
        product: Product,
    },
    Update {
        product: Product,
    },
    Delete {
        #[serde(rename = "productId")]
        product_id: String,
    },
}

impl ChangeEvent {
    pub fn added(product: Product) -> Self {
        ChangeEvent::Add { product }
    }

    pub fn updated(product: Product) -> Self {
        ChangeEvent::Update { product }
    }

    pub fn deleted(product_id: impl Into<String>) -> Self {
        ChangeEvent::Delete {
            product_id: product_id.into(),
        }
    }

    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeEvent::Add { .. } => ChangeAction::Add,
            ChangeEvent::Update { .. } => ChangeAction::Update,
            ChangeEvent::Delete { .. } => ChangeAction::Delete,
        }
    }

    /// Id of the product this event is about.
    pub fn product_id(&self) -> &str {
        match self {
            ChangeEvent::Add { product } | ChangeEvent::Update { product } => &product.id,
            ChangeEvent::Delete { product_id } => product_id,
        }
    }

    /// Serialize to the JSON payload sent to the broker.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
