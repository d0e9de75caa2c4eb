pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod export;
pub mod feed;
pub mod global;
pub mod meetings;
pub mod notify;
pub mod page;
pub mod session;
pub mod status;
pub mod webhook;
