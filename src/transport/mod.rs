//! Transport layer: duplex connection, bookkeeping, and fallback.
//!
//! This module owns everything between the public facade and the wire.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────────────┐
//! │    Client    │────────────►│       Connection actor       │
//! │   (facade)   │             │  state machine + event loop  │
//! └──────────────┘             │   ├── PendingTable           │
//!        │                     │   ├── OutboundQueue          │
//!        │ snapshots           │   └── WebSocket (duplex)     │
//!        ▼                     └──────────────┬───────────────┘
//! ┌──────────────┐                            │ race (opt-in)
//! │ state/depth  │             ┌──────────────▼───────────────┐
//! └──────────────┘             │   FallbackTransport (HTTP)   │
//!                              └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection state machine and event loop |
//! | `pending` | Pending-request table (correlation id → waiter) |
//! | `queue` | Outbound queue for messages held while not connected |
//! | `fallback` | Single-shot fallback transport |

// ============================================================================
// Submodules
// ============================================================================

/// Connection state machine and event loop.
pub mod connection;

/// Single-shot fallback transport.
pub mod fallback;

/// Pending-request table.
pub mod pending;

/// Outbound queue.
pub mod queue;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::ConnectionState;
pub use fallback::{FallbackTransport, HttpFallback};
pub use pending::{PendingTable, Responder};
pub use queue::{OutboundQueue, QueuedMessage};
