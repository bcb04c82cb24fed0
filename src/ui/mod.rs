//! # User Interface Module
//!
//! Dear ImGui overlay drawn on top of the model pass.
//!
//! - [`UiManager`] - ImGui integration with winit and wgpu, input capture
//! - [`panel`] - status banner, error overlay, controls panel and the
//!   coordinate readout
//!
//! When the UI wants the pointer, camera drags and wheel zoom are not
//! forwarded to the session.

pub mod manager;
pub mod panel;

// Re-export main types
pub use manager::UiManager;
pub use panel::{viewer_overlay, PanelAction};
