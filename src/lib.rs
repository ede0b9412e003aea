pub mod config;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod ledger;
pub mod tracker;
pub mod utils;

pub use error::{Error, Result};
