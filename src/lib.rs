pub mod backend;
pub mod config;
pub mod logging;
pub mod models;
pub mod runtime;
pub mod sync;
pub mod ui;
