pub mod app;
pub mod chart;
pub mod cli;
pub mod logging;
pub mod realm;
pub mod service;
pub mod settings;
pub mod theme;
pub mod types;
pub mod ui;
