pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod synchronizer;
pub mod transport;

pub use controller::{Controller, ControllerStatus};
pub use error::{ControllerError, Result};
