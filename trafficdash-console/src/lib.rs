//! TrafficDash console: polls the traffic backend, turns state transitions
//! into operator alerts and serves the dashboard model over HTTP.

pub mod alerts;
pub mod client;
pub mod config;
pub mod console;
pub mod differ;
pub mod health;
pub mod http;
pub mod models;
pub mod poller;
pub mod state;
pub mod view;

pub use console::Console;
