//! Core types shared by every catalog crate.
//!
//! - [`product`]: the `Product` entity and its create/update inputs
//! - [`events`]: change events emitted after successful mutations
//! - [`id`]: identifier generation for store backends

pub mod events;
pub mod id;
pub mod product;

pub use events::{ChangeAction, ChangeEvent};
pub use id::generate_id;
pub use product::{Product, ProductDraft, ProductPatch};
