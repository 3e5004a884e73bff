//! Moodgate server library.
//!
//! The identity front door for the moodgate service: anonymous device
//! registration, refresh-token session renewal, Telegram signed-login
//! identity binding, and the policy decision point the request router
//! consults before every protected call.

pub mod auth;
pub mod config;
pub mod db;
pub mod web;
