// Adaptive SAT module scoring plus the practice, session and progress layers
// around it. The binary in main.rs is a thin command-line front end.

pub mod app;
pub mod bank;
pub mod config;
pub mod engine;
pub mod progress;
pub mod session;
pub mod store;
