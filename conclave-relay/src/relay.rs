// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The relay: single-writer state plus the frame loop.
//!
//! The transport is not here. A host feeds decoded [`ClientFrame`]s in and
//! writes the returned `(connection, frame)` pairs out; every admission
//! decision and all state mutation happens on this one writer.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::Path;

use conclave_core::cipher;
use conclave_core::Keypair;
use tracing::{debug, warn};

use crate::config::{RelayConfig, AUTH_EVENT_WINDOW};
use crate::error::{Reject, Result};
use crate::event::{kinds, Event};
use crate::filter::Filter;
use crate::frame::{ClientFrame, RelayFrame};
use crate::group::Group;
use crate::storage::Storage;
use crate::store::{CapabilityStore, EventStore, RateCounters, RecentIds};

pub type ConnectionId = u64;

pub(crate) struct Connection {
    pub(crate) subscriptions: HashMap<String, Vec<Filter>>,
    pub(crate) auth_pubkey: Option<String>,
    pub(crate) challenge: String,
}

impl Connection {
    fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            auth_pubkey: None,
            challenge: hex::encode(cipher::random_bytes::<16>()),
        }
    }
}

/// Outcome of admitting one inbound event.
pub(crate) enum Admitted {
    /// Accepted and stored; any refreshed group snapshots ride along for
    /// broadcast.
    Stored(Vec<Event>),
    /// Already known; positive OK, no re-broadcast.
    Duplicate,
    /// Unknown kind; a NOTICE, not a disconnect.
    Unsupported,
}

pub struct Relay {
    pub(crate) config: RelayConfig,
    pub(crate) keys: Keypair,
    pub(crate) groups: HashMap<String, Group>,
    pub(crate) capabilities: CapabilityStore,
    pub(crate) events: EventStore,
    pub(crate) recent: RecentIds,
    pub(crate) rates: RateCounters,
    pub(crate) connections: HashMap<ConnectionId, Connection>,
    pub(crate) storage: Option<Storage>,
}

impl Relay {
    pub fn new(config: RelayConfig, keys: Keypair) -> Self {
        Self {
            config,
            keys,
            groups: HashMap::new(),
            capabilities: CapabilityStore::default(),
            events: EventStore::default(),
            recent: RecentIds::default(),
            rates: RateCounters::default(),
            connections: HashMap::new(),
            storage: None,
        }
    }

    /// Open with durable state, rehydrating groups, capabilities, and
    /// revocations.
    pub fn open_persistent(config: RelayConfig, keys: Keypair, path: &Path) -> Result<Self> {
        let storage = Storage::open(path)?;
        let mut relay = Self::new(config, keys);

        for group in storage.load_groups()? {
            relay.groups.insert(group.id.clone(), group);
        }
        for capability in storage.load_capabilities()? {
            relay.capabilities.insert(capability);
        }
        for revoked in storage.load_revocations()? {
            relay.capabilities.revoke(revoked);
        }

        debug!(groups = relay.groups.len(), "relay state rehydrated");
        relay.storage = Some(storage);
        Ok(relay)
    }

    /// The relay's own x-only pubkey (signs the 39000-39002 snapshots).
    pub fn relay_pubkey(&self) -> String {
        self.keys.public_hex()
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Register a group out of band (deployment bootstrap after DKG).
    /// Returns the snapshot events for broadcast by the host.
    pub fn register_group(&mut self, group: Group) -> Result<Vec<Event>> {
        if let Some(storage) = &self.storage {
            storage.store_group(&group)?;
        }
        let id = group.id.clone();
        self.groups.insert(id.clone(), group);
        self.refresh_snapshots(&id)
    }

    /// A client connected. When AUTH is required the challenge goes out
    /// immediately.
    pub fn connect(&mut self, conn: ConnectionId) -> Vec<RelayFrame> {
        let connection = Connection::new();
        let mut frames = Vec::new();
        if self.config.require_auth {
            frames.push(RelayFrame::Auth {
                challenge: connection.challenge.clone(),
            });
        }
        self.connections.insert(conn, connection);
        frames
    }

    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.connections.remove(&conn);
    }

    /// Process one inbound frame; returns every frame to deliver, in
    /// order. The submitter's OK always precedes any broadcast to it.
    pub fn handle(&mut self, conn: ConnectionId, frame: ClientFrame) -> Vec<(ConnectionId, RelayFrame)> {
        self.connections.entry(conn).or_insert_with(Connection::new);

        match frame {
            ClientFrame::Event(event) => self.handle_event(conn, event),
            ClientFrame::Req { sub_id, filters } => self.handle_req(conn, sub_id, filters),
            ClientFrame::Close { sub_id } => {
                if let Some(connection) = self.connections.get_mut(&conn) {
                    connection.subscriptions.remove(&sub_id);
                }
                Vec::new()
            }
            ClientFrame::Auth(event) => self.handle_auth(conn, event),
        }
    }

    fn handle_event(&mut self, conn: ConnectionId, event: Event) -> Vec<(ConnectionId, RelayFrame)> {
        let mut out = Vec::new();

        match self.admit_event(conn, &event) {
            Ok(Admitted::Stored(snapshots)) => {
                out.push((
                    conn,
                    RelayFrame::Ok {
                        event_id: event.id.clone(),
                        accepted: true,
                        message: String::new(),
                    },
                ));
                out.extend(self.broadcast(&event));
                for snapshot in snapshots {
                    out.extend(self.broadcast(&snapshot));
                }
            }
            Ok(Admitted::Duplicate) => {
                out.push((
                    conn,
                    RelayFrame::Ok {
                        event_id: event.id.clone(),
                        accepted: true,
                        message: "duplicate: already have this event".into(),
                    },
                ));
            }
            Ok(Admitted::Unsupported) => {
                out.push((
                    conn,
                    RelayFrame::Notice(format!("unknown event kind: {}", event.kind)),
                ));
            }
            Err(reject) => {
                debug!(kind = event.kind, reason = %reject.message(), "event rejected");
                out.push((
                    conn,
                    RelayFrame::Ok {
                        event_id: event.id.clone(),
                        accepted: false,
                        message: reject.message(),
                    },
                ));
            }
        }

        out
    }

    /// Fan one event out to every matching subscription. Filters are
    /// pre-matched in memory; within a single dispatch each (connection,
    /// subscription) pair is delivered at most once.
    fn broadcast(&self, event: &Event) -> Vec<(ConnectionId, RelayFrame)> {
        let mut out = Vec::new();
        for (&conn, connection) in &self.connections {
            for (sub_id, filters) in &connection.subscriptions {
                if filters.iter().any(|f| f.matches(event)) {
                    out.push((
                        conn,
                        RelayFrame::Event {
                            sub_id: sub_id.clone(),
                            event: event.clone(),
                        },
                    ));
                }
            }
        }
        out
    }

    fn handle_req(
        &mut self,
        conn: ConnectionId,
        sub_id: String,
        filters: Vec<Filter>,
    ) -> Vec<(ConnectionId, RelayFrame)> {
        let connection = self
            .connections
            .get_mut(&conn)
            .expect("connection inserted in handle");

        if self.config.require_auth && connection.auth_pubkey.is_none() {
            return vec![(
                conn,
                RelayFrame::Closed {
                    sub_id,
                    reason: "auth-required: authentication required".into(),
                },
            )];
        }

        let replacing = connection.subscriptions.contains_key(&sub_id);
        if !replacing && connection.subscriptions.len() >= self.config.max_subscriptions {
            return vec![(
                conn,
                RelayFrame::Closed {
                    sub_id,
                    reason: "blocked: too many subscriptions".into(),
                },
            )];
        }

        // Duplicate REQ replaces the prior subscription atomically.
        connection.subscriptions.insert(sub_id.clone(), filters.clone());

        let mut out: Vec<(ConnectionId, RelayFrame)> = self
            .events
            .query(&filters)
            .into_iter()
            .map(|event| {
                (
                    conn,
                    RelayFrame::Event {
                        sub_id: sub_id.clone(),
                        event: event.clone(),
                    },
                )
            })
            .collect();
        out.push((conn, RelayFrame::Eose(sub_id)));
        out
    }

    fn handle_auth(&mut self, conn: ConnectionId, event: Event) -> Vec<(ConnectionId, RelayFrame)> {
        let result = self.verify_auth(conn, &event);
        let frame = match result {
            Ok(()) => {
                let pubkey = event.pubkey.clone();
                if let Some(connection) = self.connections.get_mut(&conn) {
                    connection.auth_pubkey = Some(pubkey);
                }
                RelayFrame::Ok {
                    event_id: event.id.clone(),
                    accepted: true,
                    message: String::new(),
                }
            }
            Err(reject) => {
                warn!(reason = %reject.message(), "auth rejected");
                RelayFrame::Ok {
                    event_id: event.id.clone(),
                    accepted: false,
                    message: reject.message(),
                }
            }
        };
        vec![(conn, frame)]
    }

    fn verify_auth(&self, conn: ConnectionId, event: &Event) -> std::result::Result<(), Reject> {
        if event.kind != kinds::CLIENT_AUTH {
            return Err(Reject::Invalid("wrong kind for auth".into()));
        }
        event.verify()?;

        let connection = self
            .connections
            .get(&conn)
            .ok_or_else(|| Reject::Invalid("unknown connection".into()))?;

        if event.tag_value("relay").is_none() {
            return Err(Reject::Invalid("missing relay tag".into()));
        }
        match event.tag_value("challenge") {
            Some(challenge) if challenge == connection.challenge => {}
            _ => return Err(Reject::Invalid("bad challenge".into())),
        }

        let now = Self::now();
        if (now - event.created_at).abs() > AUTH_EVENT_WINDOW {
            return Err(Reject::Invalid("auth event expired".into()));
        }
        Ok(())
    }

    /// Regenerate the relay-signed snapshots for a group and store them.
    pub(crate) fn refresh_snapshots(&mut self, group_id: &str) -> Result<Vec<Event>> {
        let Some(group) = self.groups.get(group_id) else {
            return Ok(Vec::new());
        };
        let now = Self::now();
        let snapshots = vec![
            group.metadata_event(&self.keys, now)?,
            group.admins_event(&self.keys, now)?,
            group.members_event(&self.keys, now)?,
        ];
        for snapshot in &snapshots {
            self.events.insert(snapshot.clone());
        }
        Ok(snapshots)
    }

    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}
