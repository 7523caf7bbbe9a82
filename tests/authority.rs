mod util;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use certkit_ca::authority::revocation::{Crl, RevocationList, RevocationReason};
use certkit_ca::authority::{CertificationAuthority, LifecycleState};
use certkit_ca::builder::CertificateBuilder;
use certkit_ca::cert::params::{DistinguishedName, Validity};
use certkit_ca::cert::serial::Serial;
use certkit_ca::config::AuthorityConfig;
use certkit_ca::error::CaError;
use certkit_ca::key::{KeyAlgorithm, KeyPair};
use certkit_ca::validator::{ChainValidator, InvalidReason, ValidationResult};
use time::OffsetDateTime;

#[test]
fn root_and_user_end_to_end() {
    let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
    let root = authority
        .bootstrap(&util::cn("Root"), 2048, 10)
        .unwrap();
    assert!(root.is_ca());
    assert_eq!(root.subject().unwrap().to_string(), "CN=Root");

    let (request, user_key) = util::signing_request(&util::cn("user@example.com"));
    let leaf = authority.issue(&request, 365, false).unwrap();
    assert!(!leaf.is_ca());
    assert_eq!(leaf.public_key().unwrap(), user_key.public_key());
    assert_eq!(leaf.issuer().unwrap(), root.subject().unwrap());

    let now = OffsetDateTime::now_utc();
    let result = authority
        .chain_validator()
        .validate(&leaf, std::slice::from_ref(&root), now);
    assert_eq!(
        result,
        ValidationResult::Valid {
            chain: vec![leaf.clone(), root.clone()]
        }
    );

    let serial = leaf.serial().unwrap();
    let after_expiry = leaf.not_after() + time::Duration::days(1);
    let result = authority
        .chain_validator()
        .validate(&leaf, std::slice::from_ref(&root), after_expiry);
    assert_eq!(
        result,
        ValidationResult::Invalid {
            reason: InvalidReason::Expired,
            serial: Some(serial.clone()),
        }
    );

    let result = authority.chain_validator().validate(&leaf, &[], now);
    assert_eq!(result.reason(), Some(InvalidReason::UntrustedRoot));

    authority.revoke(&serial, RevocationReason::KeyCompromise).unwrap();
    let result = authority.chain_validator().validate(&leaf, &[root], now);
    assert_eq!(
        result,
        ValidationResult::Invalid {
            reason: InvalidReason::Revoked,
            serial: Some(serial.clone()),
        }
    );

    authority.revoke(&serial, RevocationReason::KeyCompromise).unwrap();
    assert_eq!(authority.revocation_list().len(), 1);
}

#[test]
fn serials_increase_and_validate_immediately() {
    let (authority, root) = util::generate_authority(AuthorityConfig::default());
    let roots = [root];
    let mut previous: Option<Serial> = None;

    for i in 0..10 {
        let (request, _) = util::signing_request(&util::cn(&format!("host{i}.local")));
        let cert = authority.issue(&request, 30, false).unwrap();
        let serial = cert.serial().unwrap();
        assert_eq!(serial.as_bytes().len(), 20);
        if let Some(previous) = &previous {
            assert!(serial > *previous, "{serial} should follow {previous}");
        }
        assert!(
            authority
                .chain_validator()
                .validate(&cert, &roots, OffsetDateTime::now_utc())
                .is_valid()
        );
        previous = Some(serial);
    }
    assert_eq!(authority.issued_count(), 10);
}

#[test]
fn tampered_request_is_rejected_without_touching_state() {
    let (authority, _) = util::generate_authority(AuthorityConfig::default());
    let (mut request, _) = util::signing_request(&util::user_subject());
    request.inner.info.subject = util::cn("admin@example.com").to_x509_name().unwrap();

    assert!(matches!(
        authority.issue(&request, 30, false),
        Err(CaError::InvalidProofOfPossession { .. })
    ));
    assert_eq!(authority.issued_count(), 0);
    assert_eq!(authority.state(), LifecycleState::Bootstrapped);

    let (honest, _) = util::signing_request(&util::user_subject());
    let cert = authority.issue(&honest, 30, false).unwrap();
    assert_eq!(cert.serial().unwrap().counter(), Some(1));
}

#[test]
fn intermediate_authority_chain() {
    let (authority, root) = util::generate_authority(AuthorityConfig::default());

    let intermediate_key = KeyPair::generate_ecdsa_p384();
    let intermediate_request =
        CertificateBuilder::build_signing_request(&util::cn("Issuing CA"), &intermediate_key)
            .unwrap();
    let intermediate = authority.issue(&intermediate_request, 1000, true).unwrap();
    assert!(intermediate.is_ca());

    let (request, _) = util::signing_request(&util::cn("service.local"));
    let leaf = CertificateBuilder::sign(
        &request,
        &intermediate,
        &intermediate_key,
        Validity::for_days(90).unwrap(),
        false,
        Serial::random().unwrap(),
    )
    .unwrap();

    let now = OffsetDateTime::now_utc();
    let validator = authority
        .chain_validator()
        .with_intermediates([intermediate.clone()]);
    assert_eq!(
        validator.validate(&leaf, std::slice::from_ref(&root), now).chain().map(<[_]>::len),
        Some(3)
    );

    // revoking the intermediate breaks every chain through it
    let intermediate_serial = intermediate.serial().unwrap();
    authority
        .revoke(&intermediate_serial, RevocationReason::CaCompromise)
        .unwrap();
    let validator = authority
        .chain_validator()
        .with_intermediates([intermediate]);
    assert_eq!(
        validator.validate(&leaf, &[root], now),
        ValidationResult::Invalid {
            reason: InvalidReason::Revoked,
            serial: Some(intermediate_serial),
        }
    );
}

#[test]
fn cyclic_intermediates_hit_the_depth_limit() {
    // two authorities that each certify the other
    let key_a = KeyPair::generate_ecdsa_p256();
    let key_b = KeyPair::generate_ecdsa_p256();
    let long = Validity::for_days(100).unwrap();
    let short = Validity::for_days(50).unwrap();

    let a_self = CertificateBuilder::build_self_signed(&util::cn("A"), &key_a, long, true).unwrap();
    let b_self = CertificateBuilder::build_self_signed(&util::cn("B"), &key_b, long, true).unwrap();
    let a_request = CertificateBuilder::build_signing_request(&util::cn("A"), &key_a).unwrap();
    let b_request = CertificateBuilder::build_signing_request(&util::cn("B"), &key_b).unwrap();
    let a_by_b =
        CertificateBuilder::sign(&a_request, &b_self, &key_b, short, true, Serial::random().unwrap())
            .unwrap();
    let b_by_a =
        CertificateBuilder::sign(&b_request, &a_self, &key_a, short, true, Serial::random().unwrap())
            .unwrap();

    let (leaf_request, _) = util::signing_request(&util::cn("leaf"));
    let leaf = CertificateBuilder::sign(
        &leaf_request,
        &a_by_b,
        &key_a,
        Validity::for_days(10).unwrap(),
        false,
        Serial::random().unwrap(),
    )
    .unwrap();

    let (_, unrelated_root) = util::generate_authority(AuthorityConfig::default());
    let result = ChainValidator::new()
        .with_intermediates([a_by_b, b_by_a])
        .validate(&leaf, &[unrelated_root], OffsetDateTime::now_utc());
    assert_eq!(result.reason(), Some(InvalidReason::ChainTooLong));
}

#[test]
fn crl_carries_revocations_to_relying_parties() {
    let (authority, root) = util::generate_authority(AuthorityConfig::default());
    let (first_request, _) = util::signing_request(&util::cn("one"));
    let (second_request, _) = util::signing_request(&util::cn("two"));
    let first = authority.issue(&first_request, 30, false).unwrap();
    let second = authority.issue(&second_request, 30, false).unwrap();
    authority
        .revoke(&second.serial().unwrap(), RevocationReason::Superseded)
        .unwrap();

    let crl = authority.issue_crl(7).unwrap();
    let pem = crl.to_pem().unwrap();
    assert!(pem.starts_with("-----BEGIN X509 CRL-----"));
    let parsed = Crl::from_pem(&pem).unwrap();
    assert_eq!(parsed, crl);
    assert_eq!(parsed.issuer().unwrap(), root.subject().unwrap());
    assert!(parsed.next_update().unwrap() > parsed.this_update());

    let list = RevocationList::from_crl(&parsed, &root).unwrap();
    assert_eq!(list.len(), 1);
    let entry = list.get(&second.serial().unwrap()).unwrap();
    assert_eq!(entry.reason, RevocationReason::Superseded);

    let validator = ChainValidator::new().with_revocations(list);
    let now = OffsetDateTime::now_utc();
    let roots = [root];
    assert!(validator.validate(&first, &roots, now).is_valid());
    assert_eq!(
        validator.validate(&second, &roots, now).reason(),
        Some(InvalidReason::Revoked)
    );

    // a CRL is only accepted from the authority that signed it
    let (_, other_root) = util::generate_authority(AuthorityConfig::default());
    assert!(RevocationList::from_crl(&parsed, &other_root).is_err());
}

#[test]
fn concurrent_issuance_never_repeats_a_serial() {
    let (authority, root) = util::generate_authority(AuthorityConfig::default());
    let authority = Arc::new(authority);
    let threads = 8;
    let per_thread = 5;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let authority = Arc::clone(&authority);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|i| {
                        let (request, _) =
                            util::signing_request(&util::cn(&format!("worker-{t}-{i}")));
                        authority.issue(&request, 30, false).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let certs: Vec<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    let serials: HashSet<Serial> = certs.iter().map(|c| c.serial().unwrap()).collect();
    assert_eq!(serials.len(), threads * per_thread);

    let mut counters: Vec<u64> = serials.iter().map(|s| s.counter().unwrap()).collect();
    counters.sort_unstable();
    assert_eq!(counters, (1..=(threads * per_thread) as u64).collect::<Vec<_>>());
    assert_eq!(authority.issued_count(), threads * per_thread);

    let validator = authority.chain_validator();
    let roots = [root];
    let now = OffsetDateTime::now_utc();
    assert!(certs.iter().all(|c| validator.validate(c, &roots, now).is_valid()));
}

#[test]
fn concurrent_bootstrap_has_one_winner() {
    let authority = Arc::new(CertificationAuthority::new(AuthorityConfig::default()).unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let authority = Arc::clone(&authority);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                authority.bootstrap_with(
                    &util::cn(&format!("Root {i}")),
                    KeyAlgorithm::Ed25519,
                    Validity::for_days(30).unwrap(),
                )
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| matches!(e, CaError::AlreadyBootstrapped { .. }))
    );
    assert_eq!(authority.state(), LifecycleState::Bootstrapped);
}

#[test]
fn retired_authority_still_validates_what_it_issued() {
    let (authority, root) = util::generate_authority(AuthorityConfig::default());
    let (request, _) = util::signing_request(&util::user_subject());
    let leaf = authority.issue(&request, 30, false).unwrap();
    authority.retire().unwrap();

    let (late_request, _) = util::signing_request(&util::cn("late"));
    assert!(matches!(
        authority.issue(&late_request, 30, false),
        Err(CaError::AuthorityNotReady(_))
    ));
    assert!(
        authority
            .chain_validator()
            .validate(&leaf, &[root], OffsetDateTime::now_utc())
            .is_valid()
    );
}

#[test]
fn persisted_authority_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("authority.toml");
    std::fs::write(&config_path, "reject_duplicate_subjects = true\nmax_chain_depth = 4\n").unwrap();
    let config = AuthorityConfig::from_file(&config_path).unwrap();

    let (authority, root) = util::generate_authority(config.clone());
    let (request, _) = util::signing_request(&util::user_subject());
    let leaf = authority.issue(&request, 30, false).unwrap();

    let state_path = dir.path().join("authority.json");
    std::fs::write(&state_path, authority.serialize("s3cret").unwrap()).unwrap();
    drop(authority);

    let bytes = std::fs::read(&state_path).unwrap();
    let restored = CertificationAuthority::deserialize(&bytes, "s3cret", config).unwrap();
    assert_eq!(restored.root_certificate(), Some(root.clone()));
    assert_eq!(restored.config().max_chain_depth, 4);

    // the duplicate-subject policy still sees the earlier issuance
    let (again, _) = util::signing_request(&util::user_subject());
    assert!(matches!(
        restored.issue(&again, 30, false),
        Err(CaError::DuplicateSubjectPolicyViolation { .. })
    ));

    restored
        .revoke(&leaf.serial().unwrap(), RevocationReason::AffiliationChanged)
        .unwrap();
    assert_eq!(
        restored
            .chain_validator()
            .validate(&leaf, &[root], OffsetDateTime::now_utc())
            .reason(),
        Some(InvalidReason::Revoked)
    );
}

#[test]
fn issue_leaf_uses_configured_lifetime() {
    let config = AuthorityConfig::builder().default_leaf_validity_days(7).build();
    let (authority, _) = util::generate_authority(config);
    let (request, _) = util::signing_request(&DistinguishedName::new().common_name("short"));
    let leaf = authority.issue_leaf(&request).unwrap();
    assert_eq!((leaf.not_after() - leaf.not_before()).whole_days(), 7);
}
