//! Actor-based runtime
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │   Hub (main)    │
//!                  └────────┬────────┘
//!                           │ spawns
//!                  ┌────────▼────────┐      ┌──────────────────┐
//!                  │  MonitorActor   │─────▶│  probe executor  │
//!                  │  (owns Monitor) │◀─────│  (one task/probe)│
//!                  └────────┬────────┘      └──────────────────┘
//!                           │ events
//!                  ┌────────▼────────┐
//!                  │ Broadcast (MPMC)│
//!                  └────────┬────────┘
//!                           │ subscribe
//!              ┌────────────┴────────────┐
//!      ┌───────▼───────┐         ┌───────▼───────┐
//!      │  AlertActor   │         │ other clients │
//!      └───────────────┘         └───────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Raised and cleared events are published on a broadcast channel
//! 3. **Request/Response**: oneshot channels for queries

pub mod alert;
pub mod messages;
pub mod monitor;
