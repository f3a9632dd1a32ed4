pub mod config;
pub mod mission;
pub mod planning;
pub mod telemetry;
pub mod vehicle;
pub mod view;
pub mod web;
