//! # Material Visibility
//!
//! Repairs materials so every mesh of an uploaded model is visible under the
//! viewer's neutral lighting. See [`engine`] for the three strategies.

pub mod color;
pub mod engine;

pub use color::Hsl;
pub use engine::{
    classify, synthesize_material, EnhancementReport, MaterialEngine, PreparedScene, Strategy,
};
