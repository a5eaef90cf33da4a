//! Core infrastructure for the Kiln runtime shell.
//!
//! This crate provides the services every plugin shares: a typed registry
//! for cross-plugin singletons, a synchronous publish/subscribe event bus, a
//! frame clock driven by an injectable refresh scheduler, and the shell that
//! owns them and manages plugin lifecycles. Logging setup and a tick-rate
//! counter round out the ambient pieces hosts need.

pub mod bus;
pub mod clock;
pub mod context;
pub mod disposer;
pub mod error;
pub mod fps;
pub mod logging;
pub mod plugin;
pub mod registry;
pub mod scheduler;
pub mod shell;

pub use bus::{EventBus, Handler, Topic};
pub use clock::{FrameClock, FrameTime, TickCallback};
pub use context::Context;
pub use disposer::Disposer;
pub use error::ShellError;
pub use plugin::{FnPlugin, Plugin};
pub use registry::{Key, Registry};
pub use scheduler::{FrameCallback, FrameRequest, ManualScheduler, RefreshScheduler};
pub use shell::{Shell, ShellState, HOST_API_VERSION};
