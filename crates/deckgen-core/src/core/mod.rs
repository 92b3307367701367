//! Core module: UI-agnostic generation domain.
//!
//! This module contains:
//! - `outline`: Outline parsing into per-slide blocks
//! - `events`: Progress event types for streaming
//! - `normalize`: Slide fragment normalization
//! - `assemble`: Final document assembly from fragments
//! - `pipeline`: Generation pipelines and event channels

pub mod assemble;
pub mod events;
pub mod normalize;
pub mod outline;
pub mod pipeline;
