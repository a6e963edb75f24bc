//! Orenda Bot - Telegram front-end for rental housing channels.
//!
//! The bot routes user commands through a sliding-window rate limiter,
//! tracks a small per-user dialogue state machine, resolves free-form city
//! input against an alias index, caches the channel-subscription check and
//! runs admin-triggered broadcasts with per-recipient failure isolation.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Domain records shared between storage and handlers
pub mod models;
/// Persistence layer (PostgreSQL / SQLite behind one trait)
pub mod storage;
