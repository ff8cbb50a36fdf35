#![doc = include_str!("../README.md")]

mod config;
mod error;
mod job;
mod monitor;
mod pool;
mod render;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::job::{DocumentId, JobId, JobReceipt};
pub use crate::monitor::*;
pub use crate::pool::manager::RenderPool;
pub use crate::pool::state::PoolStatus;
pub use crate::render::*;
