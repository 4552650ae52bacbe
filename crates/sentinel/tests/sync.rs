use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use sentinel::daemon;
use sentinel::object::ObjectType;
use sentinel::store::{self, MemStore, ObjectStore};
use sentinel::testing::{
    hash_of, proposal_fields, superblock_fields, MockDaemon,
};
use sentinel::time::EpochSecs;
use sentinel::voting::{has_voted, vote_command, Outcome, Signal};
use sentinel::{sync, SyncReport};

const FAR_FUTURE: EpochSecs = 4_000_000_000;

fn network() -> MockDaemon {
    let daemon = MockDaemon::default();
    daemon.set_governance_info(10, 62500, dec!(1000));
    daemon.insert_object(
        &hash_of('a'),
        ObjectType::Proposal,
        &proposal_fields("alpha", FAR_FUTURE, dec!(100)),
        50,
    );
    daemon.insert_object(
        &hash_of('b'),
        ObjectType::Proposal,
        &proposal_fields("beta", FAR_FUTURE, dec!(25.5)),
        12,
    );
    daemon.insert_object(
        &hash_of('c'),
        ObjectType::Superblock,
        &superblock_fields(
            62500,
            "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui",
            "100",
        ),
        3,
    );
    daemon
}

fn seeded_store() -> MemStore {
    let mut store = MemStore::new();
    store::seed_vocabulary(&mut store).unwrap();
    store
}

/// Everything a pass could change, in comparable form
fn snapshot(store: &MemStore) -> String {
    let objects = store.objects().unwrap();
    let mut state = serde_json::to_string(&objects).unwrap();
    for object in &objects {
        let record = store.get_record(&object.object_hash).unwrap();
        let votes = store.votes_for(&object.object_hash).unwrap();
        state.push_str(&serde_json::to_string(&(record, votes)).unwrap());
    }
    state
}

#[test]
fn test_sync_is_idempotent() {
    let mut store = seeded_store();
    let daemon = network();

    let first = sync(&mut store, &daemon).unwrap();
    assert_eq!(first.created, 3);
    let after_first = snapshot(&store);

    let second = sync(&mut store, &daemon).unwrap();
    assert_eq!(
        second,
        SyncReport {
            updated: 3,
            ..SyncReport::default()
        }
    );
    assert_eq!(snapshot(&store), after_first);
    assert_eq!(store.proposals().unwrap().len(), 2);
    assert_eq!(store.superblocks().unwrap().len(), 1);
}

#[test]
fn test_purge_cascades() {
    let mut store = seeded_store();
    let daemon = network();
    sync(&mut store, &daemon).unwrap();

    // a vote of ours on the object about to disappear
    let mut broken = proposal_fields("alpha", FAR_FUTURE, dec!(100));
    broken.remove("end_epoch");
    daemon.insert_object(&hash_of('a'), ObjectType::Proposal, &broken, 50);
    sync(&mut store, &daemon).unwrap();
    assert_eq!(store.votes_for(&hash_of('a')).unwrap().len(), 1);

    daemon.remove_object(&hash_of('a'));
    let report = sync(&mut store, &daemon).unwrap();
    assert_eq!(report.purged, 1);
    assert_eq!(store.get_object(&hash_of('a')).unwrap(), None);
    assert_eq!(store.get_record(&hash_of('a')).unwrap(), None);
    assert!(store.votes_for(&hash_of('a')).unwrap().is_empty());
    assert!(store.get_object(&hash_of('b')).unwrap().is_some());
}

#[test]
fn test_malformed_object_gets_one_delete_vote() {
    let mut store = seeded_store();
    let daemon = network();
    let mut too_long = proposal_fields("alpha", FAR_FUTURE, dec!(100));
    too_long.insert("name".into(), serde_json::json!("x".repeat(21)));
    daemon.insert_object(&hash_of('d'), ObjectType::Proposal, &too_long, 0);

    for _ in 0..3 {
        let report = sync(&mut store, &daemon).unwrap();
        assert_eq!(report.malformed, 1);
    }

    // the envelope is kept, without a sub-record
    assert!(store.get_object(&hash_of('d')).unwrap().is_some());
    assert_eq!(store.get_record(&hash_of('d')).unwrap(), None);
    assert_eq!(
        has_voted(
            &store,
            &hash_of('d'),
            Some(Signal::Delete),
            Some(Outcome::Yes)
        )
        .unwrap(),
        1
    );
    assert_eq!(
        daemon.vote_commands(),
        vec![vote_command(&hash_of('d'), Signal::Delete, Outcome::Yes)]
    );
    // the rest of the network synced normally
    assert_eq!(store.proposals().unwrap().len(), 2);
}

#[test]
fn test_rejected_delete_vote_does_not_abort_sync() {
    let mut store = seeded_store();
    let daemon = network();
    daemon.reject_votes(
        "Failure to process vote: time between votes is too soon",
    );
    let mut broken = proposal_fields("delta", FAR_FUTURE, dec!(1));
    broken.insert("payment_amount".into(), serde_json::json!("lots"));
    daemon.insert_object(&hash_of('d'), ObjectType::Proposal, &broken, 0);

    let report = sync(&mut store, &daemon).unwrap();
    // the envelope of the malformed object is stored but not counted
    assert_eq!(report.created, 3);
    assert!(store.get_object(&hash_of('d')).unwrap().is_some());
    assert_eq!(report.malformed, 1);
    assert_eq!(report.delete_votes, 0);
    assert!(store.votes_for(&hash_of('d')).unwrap().is_empty());

    // not recorded, so it is tried again on the next pass
    sync(&mut store, &daemon).unwrap();
    assert_eq!(daemon.vote_commands().len(), 2);
}

#[test]
fn test_transport_error_leaves_store_untouched() {
    let mut store = seeded_store();
    let daemon = network();
    sync(&mut store, &daemon).unwrap();
    let before = snapshot(&store);

    daemon.remove_object(&hash_of('a'));
    daemon.fail_transport("connection refused");
    assert_matches!(
        sync(&mut store, &daemon),
        Err(sentinel::Error::Daemon(daemon::Error::Transport(_)))
    );
    assert_eq!(snapshot(&store), before);

    daemon.restore_transport();
    assert_eq!(sync(&mut store, &daemon).unwrap().purged, 1);
}

#[test]
fn test_sync_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.json");
    let daemon = network();

    let mut store = MemStore::open(&path).unwrap();
    store::seed_vocabulary(&mut store).unwrap();
    sync(&mut store, &daemon).unwrap();
    store.flush().unwrap();
    let before = snapshot(&store);

    let mut reopened = MemStore::open(&path).unwrap();
    assert_eq!(store::seed_vocabulary(&mut reopened).unwrap(), 0);
    assert_eq!(snapshot(&reopened), before);
    assert_eq!(sync(&mut reopened, &daemon).unwrap().created, 0);
}

#[test]
fn test_delete_vote_survives_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.json");
    let daemon = network();
    let mut broken = proposal_fields("delta", FAR_FUTURE, dec!(1));
    broken.remove("payment_address");
    daemon.insert_object(&hash_of('d'), ObjectType::Proposal, &broken, 0);

    {
        let mut store = MemStore::open(&path).unwrap();
        assert_eq!(sync(&mut store, &daemon).unwrap().delete_votes, 1);
        // killed before the final flush
    }

    let mut restarted = MemStore::open(&path).unwrap();
    assert_eq!(
        has_voted(
            &restarted,
            &hash_of('d'),
            Some(Signal::Delete),
            Some(Outcome::Yes)
        )
        .unwrap(),
        1
    );
    let report = sync(&mut restarted, &daemon).unwrap();
    assert_eq!(report.delete_votes, 0);
    assert_eq!(
        daemon.vote_commands(),
        vec![vote_command(&hash_of('d'), Signal::Delete, Outcome::Yes)]
    );
}
