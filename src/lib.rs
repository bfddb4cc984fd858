pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod filename;
pub mod grouping;
pub mod http;
pub mod images;
pub mod launcher;
pub mod lifecycle;
pub mod output;
pub mod remote;
pub mod store;
pub mod tui;
