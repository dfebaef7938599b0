//! A user-space runtime for the three IPC primitives this codebase's
//! message-passing code is built on: message pipes, data pipes, and shared
//! buffers, all addressed through opaque per-process handle values.
//!
//! [`Core`] is the entry point: it owns the handle table and orchestrates
//! creation, waiting, and atomic multi-handle transfer. Individual resources
//! (`message_pipe`, `data_pipe`, `shared_buffer`) are reference-counted
//! secondary objects reached only through a [`dispatcher::Dispatcher`]
//! trait object stored in the handle table.

pub mod awakable;
pub mod channel;
pub mod config;
pub mod core;
pub mod data_pipe;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod handle_table;
pub mod message_pipe;
pub mod options;
pub mod platform;
pub mod shared_buffer;
pub mod signals;
pub mod time;

pub use crate::core::Core;
pub use config::Config;
pub use error::{IpcResult, Status};
pub use handle::{HandleValue, Rights};
pub use signals::{HandleSignalsState, Signals};
