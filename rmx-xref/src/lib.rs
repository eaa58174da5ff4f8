//! rmx-xref: raw-material cross-reference pipeline
//!
//! Gathers raw ingredient records from several providers, decomposes and
//! cleans them, clusters them into canonical Definitions, links derivative
//! ingredients to their base, merges specs per cluster and attaches curated
//! seed data as overrides.

pub mod broker;
pub mod derivative;
pub mod garbage;
pub mod lexicon;
pub mod merger;
pub mod name_parser;
pub mod pipeline;
pub mod reconciler;
pub mod seed_linker;
pub mod seeds;
pub mod spec_extractor;
pub mod splitter;
pub mod store;
pub mod text;
pub mod types;

pub use pipeline::{Pipeline, PipelineSettings, StageSummary};
pub use store::{SqliteStore, XrefStore};
