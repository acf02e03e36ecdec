//! End-to-end scenario: one registry, two service-provider nodes.
//!
//! Every process binds to `127.0.0.1:0` so the tests can run in parallel.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use trustshare::platform::{Communicator, Registry};
use trustshare::settings::{CommunicatorConfig, RegistryConfig};
use trustshare::storage::{load_descriptors, read_lines, save_buffer, HomeDirectories, LocalIndex};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn home_with(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, content) in files {
        fs::write(dir.path().join(name), content).expect("write fixture");
    }
    dir
}

async fn start_registry() -> Registry {
    let mut registry = Registry::bind(RegistryConfig {
        name: "registry".into(),
        listen: "127.0.0.1:0".parse().unwrap(),
        ..RegistryConfig::default()
    })
    .await
    .expect("bind registry");
    registry.start().expect("start registry");
    registry
}

async fn start_node(name: &str, registry: &Registry, home: &TempDir) -> Communicator {
    let mut homes = HomeDirectories::new();
    homes.add(name, home.path());

    let config = CommunicatorConfig {
        name: name.into(),
        registry: registry.local_addr(),
        ..CommunicatorConfig::default()
    };
    let mut node = Communicator::bootstrap(config, Arc::new(homes))
        .await
        .expect("bootstrap node");
    node.start().expect("start node");
    node
}

#[tokio::test]
async fn two_nodes_publish_list_and_fetch() {
    let alice_home = home_with(&[
        ("notes.txt", "Meeting notes\nagenda\nactions\n"),
        ("plan.txt", "Release plan\nfreeze on friday\n"),
        ("todo.txt", "Todo list\nno trailing newline"),
    ]);
    let bob_home = home_with(&[
        ("draft.txt", "Draft chapter\nonce upon a time\n"),
        ("ideas.txt", "Ideas\n"),
    ]);

    let mut registry = start_registry().await;
    let mut alice = start_node("alice", &registry, &alice_home).await;
    let mut bob = start_node("bob", &registry, &bob_home).await;

    assert_eq!(alice.com_id(), 1);
    assert_eq!(bob.com_id(), 2);

    let alice_files = alice
        .publish(load_descriptors("alice", alice_home.path()).unwrap())
        .await
        .expect("alice publish");
    let bob_files = bob
        .publish(load_descriptors("bob", bob_home.path()).unwrap())
        .await
        .expect("bob publish");

    let alice_ids: Vec<_> = alice_files.iter().map(|d| d.file_id.unwrap()).collect();
    let bob_ids: Vec<_> = bob_files.iter().map(|d| d.file_id.unwrap()).collect();
    assert_eq!(alice_ids, vec![1, 2, 3]);
    assert_eq!(bob_ids, vec![4, 5]);

    let remote = bob.fetch_remote().await.expect("fetch remote");
    assert_eq!(remote.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(remote.values().all(|d| d.com_id == Some(alice.com_id())));
    assert!(!bob.trusts(alice.com_id()));

    let index = LocalIndex::build(&alice_files);
    let wanted = index.get(1).expect("file 1").clone();
    assert_eq!(remote[&1], wanted);

    let buffer = bob.new_buffer(wanted.clone());
    let fetched = timeout(TEST_TIMEOUT, bob.fetch_file(buffer, "bob"))
        .await
        .expect("fetch timed out")
        .expect("fetch refused");

    let on_disk = read_lines(&alice_home.path().join(&wanted.name)).unwrap();
    assert_eq!(fetched.lines, on_disk);
    assert!(bob.trusts(alice.com_id()));
    assert!(alice.trusts(bob.com_id()));

    let target = tempfile::tempdir().unwrap();
    let saved = save_buffer(&fetched, target.path(), "copy.txt").unwrap();
    assert_eq!(
        fs::read_to_string(saved).unwrap(),
        fs::read_to_string(alice_home.path().join(&wanted.name)).unwrap()
    );

    bob.shutdown().await.unwrap();
    alice.shutdown().await.unwrap();
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_fetch_reuses_cached_trust() {
    let alice_home = home_with(&[("a.txt", "A\nbody\n"), ("b.txt", "B\nbody\n")]);
    let bob_home = home_with(&[]);

    let registry = start_registry().await;
    let alice = start_node("alice", &registry, &alice_home).await;
    let bob = start_node("bob", &registry, &bob_home).await;

    alice
        .publish(load_descriptors("alice", alice_home.path()).unwrap())
        .await
        .unwrap();
    let remote = bob.fetch_remote().await.unwrap();

    for descriptor in remote.values() {
        let buffer = bob.new_buffer(descriptor.clone());
        let fetched = bob.fetch_file(buffer, "bob").await.expect("fetch");
        assert_eq!(fetched.lines[0].trim_end(), descriptor.description);
    }

    assert_eq!(bob.trusted_peers(), vec![alice.com_id()]);
    assert_eq!(alice.trusted_peers(), vec![bob.com_id()]);
}

#[tokio::test]
async fn file_from_unknown_author_is_not_delivered() {
    let alice_home = home_with(&[("a.txt", "A\n")]);
    let bob_home = home_with(&[]);

    let registry = start_registry().await;
    let alice = start_node("alice", &registry, &alice_home).await;
    let bob = start_node("bob", &registry, &bob_home).await;

    let mut published = alice
        .publish(load_descriptors("alice", alice_home.path()).unwrap())
        .await
        .unwrap();
    bob.fetch_remote().await.unwrap();

    // Same owner and id, but an author alice has no home for
    let mut forged = published.remove(0);
    forged.author = "mallory".into();

    let buffer = bob.new_buffer(forged);
    assert!(bob.fetch_file(buffer, "bob").await.is_none());
}
