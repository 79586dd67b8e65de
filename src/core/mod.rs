pub mod attachments;
pub mod auth;
pub mod catalog;
pub mod chat_stream;
pub mod client;
pub mod config;
pub mod conversations;
pub mod error;
pub mod keyring;
pub mod message;
pub mod reconstruct;
pub mod refresh;
pub mod token_store;
