pub mod api;
pub mod server;

pub use server::{app, run_server};
