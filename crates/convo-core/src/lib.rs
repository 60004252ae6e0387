//! # convo-core
//!
//! Foundation types shared by every convo crate:
//!
//! - **Branded IDs**: `SessionId`, `ThreadId` as newtypes for type safety
//! - **Messages**: `Message`, `Role`, and the tool-call state attached to them
//! - **Wire events**: `RawEvent` as decoded from the stream, `ClassifiedEvent` after classification
//! - **Errors**: `StreamError` taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod text;
