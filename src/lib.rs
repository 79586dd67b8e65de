//! chatwire is a client for streaming chat-agent backends.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the camelCase wire payloads: token responses, chat
//!   requests, stream packets, conversations and stored message rows.
//! - [`core`] owns the session and everything built on it. The token store
//!   persists the session, the request client attaches bearer tokens and
//!   recovers from 401s through a single-flight refresh coordinator, the
//!   streaming client decodes server-sent events into typed callbacks, and
//!   the reconstructor turns stored rows back into display messages.
//! - [`utils`] holds URL and timestamp helpers shared by the layers above.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which loads
//! configuration, installs logging and dispatches the subcommands.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
