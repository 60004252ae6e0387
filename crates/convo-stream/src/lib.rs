//! # convo-stream
//!
//! Streaming event reconciliation engine.
//!
//! Transport chunks flow through:
//!
//! 1. [`decoder`]: bytes → [`RawEvent`](convo_core::events::RawEvent) frames
//! 2. [`fragment`]: per-id reassembly until a completion predicate holds
//! 3. [`classifier`]: completed events → [`ClassifiedEvent`](convo_core::events::ClassifiedEvent)
//! 4. [`tracker`] and [`transcript`]: tool-call state and ordered messages
//!
//! [`engine::StreamEngine`] wires these together synchronously;
//! [`controller::StreamController`] drives an engine from an async byte
//! stream with inactivity timeout and cancellation.

#![deny(unsafe_code)]

pub mod classifier;
pub mod controller;
pub mod decoder;
pub mod engine;
pub mod fragment;
pub mod tool_parsing;
pub mod tracker;
pub mod transcript;

pub use classifier::Classifier;
pub use controller::{StreamController, StreamOutcome};
pub use decoder::{EventDecoder, Frame};
pub use engine::{FeedReport, StreamEngine, TranscriptSnapshot};
pub use fragment::{CompletionPredicate, FragmentBuffer, ParseCompletion, TerminalCharCompletion};
pub use tracker::ToolCallTracker;
pub use transcript::{ApplyOutcome, LocalIds, Thread, TranscriptStore};
