//! Legal intake service: scripted and assisted client interviews.

pub mod admin;
pub mod api;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod flow;
pub mod mail;
pub mod server;
pub mod store;
