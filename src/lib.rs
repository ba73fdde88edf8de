//! inbox-todo: turn incoming email into todo items.
//!
//! Two halves live here. `llm` summarizes message bodies with a
//! fallback chain of Gemini models under a rolling token budget.
//! `services` connects the gateway to the summary, todo and database
//! services and holds startup until they are all serving.

pub mod config;
pub mod error;
pub mod llm;
pub mod services;
