mod handler;
mod relay;
mod types;

pub use handler::{GenerateState, handle_generate};
