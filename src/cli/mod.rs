pub mod app;
pub mod check;
pub mod commands;
pub mod config;
pub mod env;
pub mod runtime;
pub mod view;
