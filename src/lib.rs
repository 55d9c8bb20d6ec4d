//! # roomchat
//!
//! Live chat panel for a single room: subscribes to new messages in a
//! message store, resolves sender names (marking the room owner), keeps an
//! append-only buffer, and tells its host when to scroll to the bottom.
//!
//! The store is a trait seam with an in-memory implementation and a
//! `PostgreSQL` implementation built on `LISTEN/NOTIFY`.

pub mod config;
pub mod db;
pub mod panel;
pub mod render;
pub mod services;
pub mod state;
pub mod store;
