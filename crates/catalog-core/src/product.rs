//! Product entity and the inputs accepted by create and update.
//!
//! Products are schema-less documents: apart from the store-assigned `id`,
//! every field is optional and absent fields are omitted from the JSON form.

use serde::{Deserialize, Serialize};

/// A catalog product as stored in the record store and returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned identifier, immutable once created.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Product {
    /// Build a product from a draft and the id the store assigned to it.
    pub fn from_draft(id: impl Into<String>, draft: ProductDraft) -> Self {
        Self {
            id: id.into(),
            name: draft.name,
            price: draft.price,
        }
    }

    /// Return a copy of this product with `patch` merged over it.
    ///
    /// `name` is replaced only by a non-empty value. `price` is replaced by
    /// any supplied value, zero included. Absent fields keep the stored value.
    #[must_use]
    pub fn merged(&self, patch: &ProductPatch) -> Self {
        let name = match patch.name.as_deref() {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => self.name.clone(),
        };

        Self {
            id: self.id.clone(),
            name,
            price: patch.price.or(self.price),
        }
    }
}

/// Fields supplied when creating a product. Accepted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: Some(name.into()),
            price: Some(price),
        }
    }
}

/// Partial update. `None` (absent or `null` in JSON) leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl ProductPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            price: None,
        }
    }

    pub fn price(price: f64) -> Self {
        Self {
            name: None,
            price: Some(price),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget() -> Product {
        Product::from_draft("p1", ProductDraft::new("Widget", 9.99))
    }

    #[test]
    fn price_only_patch_keeps_name() {
        let updated = widget().merged(&ProductPatch::price(12.5));
        assert_eq!(updated.name.as_deref(), Some("Widget"));
        assert_eq!(updated.price, Some(12.5));
        assert_eq!(updated.id, "p1");
    }

    #[test]
    fn empty_name_does_not_overwrite() {
        let patch = ProductPatch::name("").with_price(50.0);
        let updated = widget().merged(&patch);
        assert_eq!(updated.name.as_deref(), Some("Widget"));
        assert_eq!(updated.price, Some(50.0));
    }

    #[test]
    fn zero_price_is_applied() {
        let updated = widget().merged(&ProductPatch::price(0.0));
        assert_eq!(updated.price, Some(0.0));
    }

    #[test]
    fn empty_patch_is_identity() {
        let product = widget();
        assert_eq!(product.merged(&ProductPatch::default()), product);
    }

    #[test]
    fn absent_fields_are_omitted_from_json() {
        let product = Product::from_draft("p2", ProductDraft::default());
        assert_eq!(serde_json::to_value(&product).unwrap(), json!({ "id": "p2" }));

        let product = widget();
        assert_eq!(
            serde_json::to_value(&product).unwrap(),
            json!({ "id": "p1", "name": "Widget", "price": 9.99 })
        );
    }

    #[test]
    fn patch_treats_null_as_absent() {
        let patch: ProductPatch = serde_json::from_value(json!({ "name": null, "price": 3 })).unwrap();
        assert_eq!(patch.name, None);
        assert_eq!(patch.price, Some(3.0));
    }
}
