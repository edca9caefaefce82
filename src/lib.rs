//! # heartwatch
//!
//! Terminal front end for the heartwatch server and client programs.
//!
//! Both programs run the heartbeat core from `heartwatch-sdk` on a tokio
//! runtime and show its state in a read-only terminal UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Application                          │
//! │  ┌─────────┐    ┌──────────┐    ┌──────────┐    ┌─────────┐  │
//! │  │ source  │───▶│   app    │───▶│    ui    │───▶│ Terminal│  │
//! │  │ (poll)  │    │ (state)  │    │(rendering)    │         │  │
//! │  └────┬────┘    └──────────┘    └──────────┘    └─────────┘  │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  ServerHandle | ClientHeartbeat   (heartwatch-sdk)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: [`StatusSource`] trait copying state out of a running
//!   server or client
//! - **[`app`]**: Application state and key handling targets
//! - **[`ui`]**: Programs table for the server, labelled status for the client
//! - **[`settings`]**: Layered configuration (defaults, file, env, flags)
//!
//! ## Usage
//!
//! ```bash
//! # Run the server on the default port
//! heartwatch server
//!
//! # Run a client that retries when the server goes away
//! heartwatch client --name worker-1 --reconnect
//!
//! # Log status lines instead of drawing the terminal UI
//! heartwatch server --headless --log-file -
//! ```

pub mod app;
pub mod events;
pub mod format;
pub mod settings;
pub mod source;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use settings::{ClientSettings, Overrides, ServerSettings};
pub use source::{ClientSource, Role, ServerSource, StatusRow, StatusSource, StatusView};
