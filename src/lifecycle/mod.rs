//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI instruction (instruction.rs):
//!     install | uninstall | start | stop → systemd.rs (unit file + systemctl)
//!     anything else                      → service.rs (serve in foreground)
//!
//! Foreground run (service.rs):
//!     Bind listener → Spawn server → Wait for signal → Drain → Close deps
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown (shutdown.rs)
//! ```
//!
//! # Design Decisions
//! - One broadcast shutdown shared by the server and the signal listener
//! - systemd control is synchronous; it runs before the runtime serves

pub mod instruction;
pub mod service;
pub mod shutdown;
pub mod signals;
pub mod systemd;

pub use instruction::Instruction;
pub use service::DashboardService;
pub use shutdown::Shutdown;
pub use systemd::{ServiceError, ServiceManager, Systemd, UnitFile};
