//! Data-driven unit type definitions.
//!
//! Pure data structures deserialized from RON, plus the catalog that
//! indexes them by id. The catalog parses from an in-memory string; file
//! IO stays with the host application.

mod unit_data;

pub use unit_data::{UnitCatalog, UnitCategory, UnitData, WeaponData};
