#![deny(clippy::all)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: protocol dispatch is inherently branchy
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Struct field patterns
#![allow(clippy::struct_excessive_bools)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]

//! Stratus - per-connection MQTT protocol engine.
//!
//! The engine is the single coordination point between a client's
//! transport, its long-lived session, and the broker fabric. It is a
//! pure state object driven by three entry points: `received` (inbound
//! packet from the framer), `deliver` (outbound event from session,
//! broker, or itself), and `shutdown` (terminal cleanup). MQTT 3.1,
//! 3.1.1 and 5.0 are spoken on the wire; reason codes are downgraded
//! for pre-5.0 peers from a pure compatibility table.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Zone policy configuration
//! - `core::time` - Deterministic time sourcing
//!
//! ## Protocol
//! - `protocol` - Decoded packet model, versions, QoS
//! - `protocol::reason` - Reason codes and version compat
//! - `protocol::encode` - Outbound frame construction
//! - `protocol::validate` - Structural packet validation
//! - `protocol::topic` - Filters, shared groups, mountpoints
//!
//! ## Engine
//! - `engine::connection` - The connection state machine
//! - `engine::checks` - Check-chain fold
//!
//! ## Services
//! - `services::session` - Session manager / session / broker seams
//! - `services::auth` - Authentication and ACL
//! - `services::caps` - Zone capability policy
//! - `services::registry` - Connection manager registry
//! - `services::hooks` - Named synchronous hook chains
//! - `services::metrics` - Counter sink
//! - `services::transport` - Byte sink and keepalive timer handles

pub mod core;
pub mod engine;
pub mod protocol;
pub mod services;

// Re-exports for convenience
pub use self::core::{config, time};
pub use engine::{
    Connection, ConnectionAction, ConnectionCtx, ConnectionInit, Delivery, EngineError,
    ShutdownReason,
};
pub use protocol::{ControlPacket, ProtocolVersion, Qos, ReasonCode};
pub use services::session::{Message, MessageHeaders};
