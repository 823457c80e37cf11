pub mod config;
pub mod http;
pub mod logs;
pub mod server;
