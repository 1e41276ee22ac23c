pub mod by_period;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod models;
pub mod period;
pub mod recommendation;
pub mod session;
pub mod stats;
pub mod store;
pub mod window;

#[cfg(test)]
mod testing;

pub use error::GlucoseError;
pub use session::{Session, SessionRegistry};
