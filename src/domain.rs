//! Domain records shared between extraction and persistence.

pub mod product;

pub use product::{ProductRecord, ReviewRecord, VariantRecord};
