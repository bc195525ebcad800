//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout (settings, catalogue, cart, status bar, overlays)
//! - `input`: keyboard handling
//! - `styles`: colors and text styling

pub mod input;
pub mod render;
pub mod styles;
