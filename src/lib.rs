//! Room placement and hosting for collaborative documents.
//!
//! One binary plays two roles: the orchestrator spawns worker processes and
//! places document rooms on them; each worker hosts rooms and speaks the
//! client WebSocket protocol.

pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod replica;
pub mod routes;
pub mod utils;
pub mod worker;
