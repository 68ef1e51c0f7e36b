//! meetflow - Meeting pipeline orchestrator
//!
//! Watches meeting folders across accounts and drives each recording through
//! a fixed stage chain: compress, extract audio, transcribe, summarize, and
//! sync the summary to a notes store. Completed work is content-addressed so
//! unchanged inputs are never reprocessed, every cycle leaves an immutable
//! snapshot behind, and notifications fire only when a cycle actually
//! changed something.
//!
//! # Architecture
//!
//! - **domain**: stages, artifact folders, stage records, cycle snapshots
//! - **core**: scanner, content cache, pipeline, retry, diffing, scheduler
//! - **adapters**: ffmpeg, whisper, summarizer, Notion, Telegram
//! - **cli**: service entrypoint and operator commands

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

pub use crate::core::{ContentCache, CycleRunner, Scheduler, StagePipeline};
pub use crate::domain::{CycleKind, CycleSnapshot, Stage};
