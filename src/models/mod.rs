//! Core data models for the media offload service.
//!
//! These are the values exchanged with the CMS over the hook surface; they
//! serialize as JSON via `serde`.

pub mod asset;
pub mod image_slim;
pub mod upload;
