#![forbid(unsafe_code)]

use conclave_core::capability::{
    authorize, grant_tags, Capability, CapabilityType, Qualifiers,
};
use conclave_core::cipher;
use conclave_core::curve::{self, schnorr_verify};
use conclave_core::dkg::{DkgConfig, DkgSession, KeyPackage};
use conclave_core::signing::sign_with_packages;
use conclave_core::Keypair;
use k256::elliptic_curve::rand_core::OsRng;
use proptest::prelude::*;

fn run_dkg(threshold: u16, signers: usize) -> Vec<KeyPackage> {
    let keys: Vec<Keypair> = (0..signers).map(|_| Keypair::generate(&mut OsRng)).collect();
    let session_id: [u8; 32] = cipher::random_bytes();
    let pubkeys: Vec<[u8; 32]> = keys.iter().map(|k| *k.public_bytes()).collect();

    let mut sessions: Vec<DkgSession> = keys
        .iter()
        .map(|key| {
            DkgSession::new(
                DkgConfig::new(
                    session_id,
                    threshold,
                    signers as u16,
                    pubkeys.clone(),
                    key.clone(),
                )
                .unwrap(),
            )
        })
        .collect();

    let round1: Vec<_> = sessions
        .iter_mut()
        .map(|s| s.round1(&mut OsRng).unwrap())
        .collect();
    for session in sessions.iter_mut() {
        for package in &round1 {
            if package.sender != session.config().my_index() {
                session.ingest_round1(package).unwrap();
            }
        }
    }

    let round2: Vec<_> = sessions
        .iter_mut()
        .flat_map(|s| s.round2().unwrap())
        .collect();
    for session in sessions.iter_mut() {
        for package in &round2 {
            if package.recipient == session.config().my_index() {
                session.ingest_round2(package).unwrap();
            }
        }
    }

    sessions.iter_mut().map(|s| s.finalize().unwrap()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn signatures_verify_for_random_messages(message in prop::array::uniform32(any::<u8>())) {
        let packages = run_dkg(2, 3);
        let signature = sign_with_packages(&packages[..2], &message, &mut OsRng).unwrap();
        prop_assert!(
            schnorr_verify(&packages[0].group_pubkey_xonly(), &message, &signature).is_ok()
        );
    }

    #[test]
    fn signature_does_not_verify_for_other_message(
        message in prop::array::uniform32(any::<u8>()),
        other in prop::array::uniform32(any::<u8>())
    ) {
        prop_assume!(message != other);
        let packages = run_dkg(2, 3);
        let signature = sign_with_packages(&packages[..2], &message, &mut OsRng).unwrap();
        prop_assert!(
            schnorr_verify(&packages[0].group_pubkey_xonly(), &other, &signature).is_err()
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scalar_codec_roundtrips(bytes in prop::array::uniform32(1u8..)) {
        if let Ok(scalar) = curve::scalar_from_bytes(&bytes) {
            prop_assert_eq!(curve::scalar_to_bytes(&scalar), bytes);
        }
    }

    #[test]
    fn tagged_hash_is_deterministic(
        data in prop::collection::vec(any::<u8>(), 0..256),
        tag in "[a-z/]{1,32}"
    ) {
        let first = curve::tagged_hash(&tag, &[&data]);
        let second = curve::tagged_hash(&tag, &[&data]);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn authorize_is_deterministic(
        holder in prop::array::uniform32(any::<u8>()),
        kind in any::<u16>(),
        now in 0i64..10_000_000
    ) {
        let tags = grant_tags(
            &holder,
            CapabilityType::Write,
            &Qualifiers { kinds: Some(vec![9, 10]), ..Qualifiers::default() },
            Some(5_000_000),
        );
        let capability = Capability::from_grant([1; 32], [2; 32], 0, &tags).unwrap();
        let candidates = [&capability];
        let event_tags: Vec<Vec<String>> = vec![];

        let first = authorize(
            &candidates,
            &holder,
            CapabilityType::Write,
            now,
            Some((kind, &event_tags)),
        );
        let second = authorize(
            &candidates,
            &holder,
            CapabilityType::Write,
            now,
            Some((kind, &event_tags)),
        );
        prop_assert_eq!(first.is_some(), second.is_some());

        let expected = [9u16, 10].contains(&kind) && now < 5_000_000;
        prop_assert_eq!(first.is_some(), expected);
    }

    #[test]
    fn conversation_aead_roundtrips(
        plaintext in prop::collection::vec(any::<u8>(), 0..128),
        session in prop::array::uniform32(any::<u8>())
    ) {
        let key: [u8; 32] = cipher::random_bytes();
        let aad = cipher::share_aad(&session, "dkg/round2");
        let ciphertext = cipher::encrypt(&key, &plaintext, &aad).unwrap();
        let decrypted = cipher::decrypt(&key, &ciphertext, &aad).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }
}
