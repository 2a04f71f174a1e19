// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # grokken
//!
//! Turns noisy OCR'd book text into two things: cleaned prose, and
//! long-document summarization / Q&A training data produced with a
//! large language model.
//!
//! ## Architecture
//!
//! - **Tokenizer** (`tokenizer`): pluggable token counting (o200k BPE, approximate, HF)
//! - **Analyzer** (`analyzer`): short vs. long book classification, segment estimates
//! - **Segmenter** (`segment`): chapter detection, token-budget fallback, per-book handlers
//! - **Provider adapter** (`provider`): OpenAI / Anthropic over sync HTTP with retry and pricing
//! - **Prompts** (`prompts`): pure template formatting and Q&A response parsing
//! - **Simulated reader** (`reader`): multi-turn study-partner conversation generation
//! - **Generator** (`generator`): resumable, checkpointed, cost-tracked orchestration
//! - **Cleaning** (`clean`): generic OCR cleanup transforms and the built-in book catalog
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use grokken::config::GenerationConfig;
//! use grokken::generator::Generator;
//! use grokken::provider::create_provider;
//! use grokken::source::SourceTable;
//! use grokken::tokenizer::build_counter;
//!
//! let config = GenerationConfig::load(std::path::Path::new("generation.toml")).unwrap();
//! let counter = build_counter(&config.tokenizer).unwrap();
//! let provider = create_provider(&config.provider, Arc::clone(&counter)).unwrap();
//! let source = SourceTable::from_jsonl(&config.source).unwrap();
//! let mut generator = Generator::new(config, provider, counter);
//! let result = generator.run(&source).unwrap();
//! println!("{} succeeded, ${:.4}", result.success_count(), result.total_cost);
//! ```

pub mod analyzer;
pub mod clean;
pub mod config;
pub mod error;
pub mod generator;
pub mod prompts;
pub mod provider;
pub mod reader;
pub mod schema;
pub mod segment;
pub mod source;
pub mod tokenizer;
