// SPDX-FileCopyrightText: © 2026 Conclave Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The whole loop: DKG coordinated over the relay bus, a group rooted in
//! the resulting key, and a capability grant signed by the quorum.

#![forbid(unsafe_code)]

use conclave_core::capability::{grant_tags, CapabilityType, Qualifiers};
use conclave_core::cipher;
use conclave_core::dkg::{DkgConfig, DkgSession};
use conclave_core::signing::sign_with_packages;
use conclave_core::{KeyPackage, Keypair};
use conclave_relay::event::kinds;
use conclave_relay::{coordination, ClientFrame, Event, Filter, Group, Relay, RelayConfig, RelayFrame};
use k256::elliptic_curve::rand_core::OsRng;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Events delivered to one connection across a batch of relay outputs.
fn delivered(frames: &[(u64, RelayFrame)], conn: u64) -> Vec<Event> {
    frames
        .iter()
        .filter(|(c, _)| *c == conn)
        .filter_map(|(_, f)| match f {
            RelayFrame::Event { event, .. } => Some(event.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn dkg_over_the_bus_roots_a_group() {
    let mut relay = Relay::new(RelayConfig::default(), Keypair::generate(&mut OsRng));

    // Three admins, each on their own connection, subscribed to the DKG
    // kinds.
    let admins: Vec<Keypair> = (0..3).map(|_| Keypair::generate(&mut OsRng)).collect();
    let conns: Vec<u64> = vec![1, 2, 3];
    for &conn in &conns {
        relay.connect(conn);
        relay.handle(
            conn,
            ClientFrame::Req {
                sub_id: "dkg".into(),
                filters: vec![Filter {
                    kinds: Some(vec![
                        kinds::DKG_INIT,
                        kinds::DKG_ROUND1,
                        kinds::DKG_ROUND2,
                        kinds::DKG_COMPLETE,
                    ]),
                    ..Filter::default()
                }],
            },
        );
    }

    let session_id: [u8; 32] = cipher::random_bytes();
    let pubkeys: Vec<[u8; 32]> = admins.iter().map(|k| *k.public_bytes()).collect();
    let mut sessions: Vec<DkgSession> = admins
        .iter()
        .map(|key| {
            DkgSession::new(
                DkgConfig::new(session_id, 2, 3, pubkeys.clone(), key.clone()).unwrap(),
            )
        })
        .collect();

    // The initiator announces the session.
    let init = coordination::init_event(&admins[0], &session_id, 2, &pubkeys, now()).unwrap();
    let frames = relay.handle(conns[0], ClientFrame::Event(init));
    assert!(frames
        .iter()
        .any(|(_, f)| matches!(f, RelayFrame::Ok { accepted: true, .. })));

    // Round 1: everyone broadcasts commitments through the relay; each
    // participant ingests what the bus delivers to them.
    let mut round1_deliveries: Vec<Vec<Event>> = vec![Vec::new(); admins.len()];
    for (i, session) in sessions.iter_mut().enumerate() {
        let package = session.round1(&mut OsRng).unwrap();
        let event = coordination::round1_event(&admins[i], &package, now()).unwrap();
        let frames = relay.handle(conns[i], ClientFrame::Event(event));
        for (j, deliveries) in round1_deliveries.iter_mut().enumerate() {
            deliveries.extend(delivered(&frames, conns[j]));
        }
    }
    for (i, session) in sessions.iter_mut().enumerate() {
        for event in &round1_deliveries[i] {
            if event.kind != kinds::DKG_ROUND1 {
                continue;
            }
            let package = coordination::parse_round1(event).unwrap();
            if package.sender != session.config().my_index() {
                session.ingest_round1(&package).unwrap();
            }
        }
    }

    // Round 2: encrypted shares routed by recipient pubkey.
    let mut round2_deliveries: Vec<Vec<Event>> = vec![Vec::new(); admins.len()];
    for (i, session) in sessions.iter_mut().enumerate() {
        for package in session.round2().unwrap() {
            let recipient = session
                .config()
                .participant(package.recipient)
                .copied()
                .unwrap();
            let event =
                coordination::round2_event(&admins[i], &package, &recipient, now()).unwrap();
            let frames = relay.handle(conns[i], ClientFrame::Event(event));
            for (j, deliveries) in round2_deliveries.iter_mut().enumerate() {
                deliveries.extend(delivered(&frames, conns[j]));
            }
        }
    }
    for (i, session) in sessions.iter_mut().enumerate() {
        let my_pubkey = admins[i].public_hex();
        for event in &round2_deliveries[i] {
            if event.kind != kinds::DKG_ROUND2 {
                continue;
            }
            if event.tag_value("p") != Some(my_pubkey.as_str()) {
                continue;
            }
            let package = coordination::parse_round2(event).unwrap();
            session.ingest_round2(&package).unwrap();
        }
    }

    let packages: Vec<KeyPackage> = sessions.iter_mut().map(|s| s.finalize().unwrap()).collect();
    let group_pubkey = packages[0].group_pubkey_xonly();
    for package in &packages {
        assert_eq!(package.group_pubkey_xonly(), group_pubkey);
    }

    // Announce completion on the bus.
    let done =
        coordination::completion_event(&admins[0], &session_id, &group_pubkey, now()).unwrap();
    let frames = relay.handle(conns[0], ClientFrame::Event(done));
    assert!(frames
        .iter()
        .any(|(_, f)| matches!(f, RelayFrame::Ok { accepted: true, .. })));

    // Root a group in the new key and issue a quorum-signed grant.
    relay
        .register_group(Group::new(
            "founders",
            &hex::encode(group_pubkey),
            &admins[0].public_hex(),
        ))
        .unwrap();

    let member = Keypair::generate(&mut OsRng);
    let grant = Event::build_with(
        &hex::encode(group_pubkey),
        kinds::CAP_GRANT,
        grant_tags(
            member.public_bytes(),
            CapabilityType::Write,
            &Qualifiers {
                kinds: Some(vec![kinds::CHAT_MESSAGE, kinds::CHAT_REPLY]),
                ..Qualifiers::default()
            },
            None,
        ),
        String::new(),
        now(),
        |id| sign_with_packages(&packages[..2], id, &mut OsRng).unwrap(),
    )
    .unwrap();
    grant.verify().unwrap();

    let frames = relay.handle(conns[0], ClientFrame::Event(grant));
    assert!(frames
        .iter()
        .any(|(_, f)| matches!(f, RelayFrame::Ok { accepted: true, .. })));

    // The grantee can now post under the threshold-rooted group.
    let chat = Event::build(
        &member,
        kinds::CHAT_MESSAGE,
        vec![vec!["h".into(), "founders".into()]],
        "first post under the root key".into(),
        now(),
    )
    .unwrap();
    let frames = relay.handle(4, ClientFrame::Event(chat));
    assert!(frames
        .iter()
        .any(|(_, f)| matches!(f, RelayFrame::Ok { accepted: true, .. })));
}
