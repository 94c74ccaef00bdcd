//! Everything that talks to the narrator model.
//!
//! Contains the model seam, the context compiler that builds each prompt,
//! action enrichment, and chronicle summarization.

pub mod chronicler;
mod client;
pub mod context;
mod enrich;

pub use client::{extract_json, turn_response_schema, ModelClient};
pub use context::{compile_prompt, compile_rule_update_prompt, retrieve, Retrieval};
pub use enrich::enrich_action;
