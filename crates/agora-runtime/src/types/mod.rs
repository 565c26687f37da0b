//! Core types for the Agora runtime

mod errors;
mod ids;
mod return_code;
mod state;

pub use errors::*;
pub use ids::*;
pub use return_code::*;
pub use state::*;
