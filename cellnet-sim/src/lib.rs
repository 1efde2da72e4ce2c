#![forbid(unsafe_code)]

//! Discrete-tick simulation engine for a small cellular data network:
//! towers, UEs, backhaul forwarding, stop-and-wait ARQ, and a distance-
//! and code-rate-dependent channel model.
//!
//! The engine is single-threaded and purely synchronous — advancing time
//! is just calling [`world::World::step`] repeatedly. Nothing in this
//! crate spawns a thread, sleeps, or talks to I/O; that is a driver's
//! job, not the engine's.

pub mod channel;
pub mod metrics;
pub mod packet;
pub mod tower;
pub mod ue;
pub mod world;

pub use metrics::{TickMetrics, TowerTick, UeTick};
pub use packet::{Packet, PacketKind};
pub use tower::Tower;
pub use ue::Ue;
pub use world::World;
