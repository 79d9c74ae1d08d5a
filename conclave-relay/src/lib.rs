// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capability-enforcing relay core for a threshold-keyed community.
//!
//! Validates inbound signed events against capability state and group
//! membership: signature check, size and policy limits, group tag and
//! timeline-reference validation, then the authorization decision (write
//! capability or membership for content, admin permissions for moderation,
//! group-key signatures for capability events). The pub/sub transport is a
//! collaborator: a host feeds frames in and delivers the returned frames;
//! this crate never touches a socket.

#![forbid(unsafe_code)]

/// Event admission pipeline.
mod auth;
/// Relay configuration.
pub mod config;
/// DKG coordination events (kinds 28000-28003).
pub mod coordination;
/// Error types, result alias, and the OK-frame rejection taxonomy.
pub mod error;
/// The signed event and its kind table.
pub mod event;
/// Subscription filters.
pub mod filter;
/// Client/relay wire frames.
pub mod frame;
/// Group state and admin permissions.
pub mod group;
/// The relay's single-writer state and frame loop.
pub mod relay;
/// Durable state (redb).
pub mod storage;
/// In-memory stores: capabilities, events, recent ids, rate counters.
pub mod store;

pub use config::RelayConfig;
pub use error::{Reject, RelayError, Result};
pub use event::{kinds, Event};
pub use filter::Filter;
pub use frame::{ClientFrame, RelayFrame};
pub use group::{Access, AdminPermissions, Group, Visibility};
pub use relay::{ConnectionId, Relay};
