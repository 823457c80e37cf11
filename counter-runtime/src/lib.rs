// request handling must not bring the server down
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod runtime;
pub mod server;
pub mod tools;
