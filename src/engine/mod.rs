pub mod checks;
pub mod connection;

pub use connection::{
    Connection, ConnectionAction, ConnectionCtx, ConnectionInit, Delivery, EngineError,
    PacketStats, ShutdownReason, StatsSnapshot,
};
