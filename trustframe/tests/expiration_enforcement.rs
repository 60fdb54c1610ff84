//! `ExpirationEnforcement::Safe` (the default) rejects an expired
//! timestamp; `Unsafe` accepts it, per §3.6/§4.4's freeze-attack tradeoff.

mod common;

use common::{sign, timestamp_payload, write_json, Repo};
use trustframe::error::Error;
use trustframe::{Config, DefaultTransport, ExpirationEnforcement, NeverCancel, Updater};

fn expire_timestamp(repo: &Repo) {
    let expired = "2000-01-01T00:00:00Z".to_string();
    let timestamp = timestamp_payload(1, &expired, 1);
    write_json(&repo.metadata, "timestamp.json", &sign(timestamp, &[&repo.timestamp_key]));
}

#[test]
fn safe_rejects_expired_timestamp() {
    let repo = Repo::basic();
    expire_timestamp(&repo);
    let mut updater = Updater::init(
        repo.initial_root().as_slice(),
        &repo.metadata_url(),
        &repo.targets_url(),
        DefaultTransport::new(),
        Config::default(),
    )
    .unwrap();

    let err = updater.refresh(&NeverCancel).unwrap_err();
    assert!(matches!(err, Error::ExpiredMetadata { .. }));
}

#[test]
fn unsafe_accepts_expired_timestamp() {
    let repo = Repo::basic();
    expire_timestamp(&repo);
    let mut updater = Updater::init(
        repo.initial_root().as_slice(),
        &repo.metadata_url(),
        &repo.targets_url(),
        DefaultTransport::new(),
        Config { expiration_enforcement: ExpirationEnforcement::Unsafe, ..Config::default() },
    )
    .unwrap();

    updater.refresh(&NeverCancel).unwrap();
    assert_eq!(u64::from(updater.trusted_set().timestamp().unwrap().signed.version), 1);
}
