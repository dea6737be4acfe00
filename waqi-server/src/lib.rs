//! Air quality update server.
//!
//! Fetches measurements from the World Air Quality Index API, keeps them
//! in a persistent TTL cache, and notifies subscribers when a watched
//! station's readings change.

pub mod cache;
pub mod config;
pub mod domain;
pub mod service;
pub mod updates;
pub mod waqi;
pub mod web;
