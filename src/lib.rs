//! Terminal dashboard for the ethfee gas API.
//!
//! Data flow:
//! API → Poller (per resource) → App (delta tracker + countdown) → Dashboard

pub mod api;
pub mod app;
pub mod config;
pub mod countdown;
pub mod delta;
pub mod error;
pub mod logger;
pub mod model;
pub mod poller;
pub mod ui;
