pub mod client;
pub mod quota;
