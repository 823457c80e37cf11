pub mod dns;
pub mod upload;
