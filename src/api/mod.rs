pub mod dispatch;
mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use dispatch::{JobInput, dispatch};
pub use error::ApiError;
pub use server::{build_state, router, run};
