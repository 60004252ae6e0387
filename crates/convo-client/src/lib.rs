//! # convo-client
//!
//! Outer surfaces of the reconciliation engine:
//!
//! - [`transport`]: the [`Transport`](transport::Transport) seam and its
//!   reqwest-backed HTTP implementation
//! - [`state`]: persisted session identity (`~/.convo/state.json`)
//! - [`render`]: plain-text rendering of transcript snapshots
//!
//! The `convo` binary wires these to a
//! [`StreamController`](convo_stream::StreamController).

#![deny(unsafe_code)]

pub mod render;
pub mod state;
pub mod transport;

pub use render::render_transcript;
pub use state::{SessionState, SessionStore, StateError};
pub use transport::{ByteStream, ChatRequest, HttpTransport, Transport, TransportError};
