//! # Workflows Module
//!
//! The public driver API. [`step`] is the per-sub-step entry point an external food-web
//! solver calls; [`simulate`] wraps it in a self-contained scenario runner that integrates
//! the rates of change itself.

pub mod simulate;
pub mod step;
