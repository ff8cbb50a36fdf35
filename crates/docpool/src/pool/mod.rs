//! Worker pool internals.
//!
//! ## Structure
//!
//! - [`manager`] - the [`RenderPool`](manager::RenderPool) controller:
//!   lifecycle, submission and introspection.
//! - [`dispatcher`] - single loop moving jobs from the queue to ready workers.
//! - [`worker`] - persistent worker loop around the renderer.
//! - [`state`] - lifecycle flags and atomic statistics.

use crate::job::Job;
use tokio::sync::mpsc;

pub(crate) mod dispatcher;
pub(crate) mod manager;
pub(crate) mod state;
pub(crate) mod worker;


/// A worker's private inbox, as advertised in the ready-pool.
pub(crate) type Inbox = mpsc::Sender<Job>;
