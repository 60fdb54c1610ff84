//! `refresh` walks the root chain forward one version at a time until the
//! server has no further `N+1.root.json` to offer (§4.5 step 1), picking up
//! a rotated root-signing key along the way.

mod common;

use common::{expires_in, new_key, root_payload, sign, write_json, Repo};
use trustframe::{Config, DefaultTransport, NeverCancel, Updater};

#[test]
fn refresh_follows_a_rotated_root_to_its_latest_version() {
    let repo = Repo::basic();

    let new_root_key = new_key();
    let expires = expires_in(365);
    let root_v2 = root_payload(
        2,
        &expires,
        false,
        &[&new_root_key, &repo.timestamp_key, &repo.snapshot_key, &repo.targets_key],
        &[
            ("root", &[&new_root_key], 1),
            ("timestamp", &[&repo.timestamp_key], 1),
            ("snapshot", &[&repo.snapshot_key], 1),
            ("targets", &[&repo.targets_key], 1),
        ],
    );
    // Signed by both the outgoing root key (so v1 trusts handing off to v2)
    // and the incoming one (so v2 is self-consistent on its own terms).
    let signed_root_v2 = sign(root_v2, &[&repo.root_key, &new_root_key]);
    write_json(&repo.metadata, "2.root.json", &signed_root_v2);

    let mut updater = Updater::init(
        repo.initial_root().as_slice(),
        &repo.metadata_url(),
        &repo.targets_url(),
        DefaultTransport::new(),
        Config::default(),
    )
    .unwrap();

    updater.refresh(&NeverCancel).unwrap();
    assert_eq!(u64::from(updater.trusted_set().root().signed.version), 2);
    // Rotation invalidates anything trusted under the old root; the
    // refresh must have refetched timestamp/snapshot/targets under v2.
    assert!(updater.trusted_set().timestamp().is_some());
    assert!(updater.trusted_set().snapshot().is_some());
}
