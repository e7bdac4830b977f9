//! End-to-end sync-by-root tests over the in-memory host.

use std::sync::Arc;
use std::time::Duration;

use blocksync::rpc::{Compression, MemoryHost, PeerId, ResultCode, ZstdCompression};
use blocksync::store::{BlockStore, MemoryBlockStore, StoreError};
use blocksync::sync::SyncError;
use blocksync::{Client, ClientConfig, Error, SyncReport};
use blocksync_testkit::fixtures::{roots, seed_store};
use blocksync_testkit::generators::distinct_blocks;
use proptest::prelude::*;
use blocksync_testkit::{RecordingChain, ScriptStep, ScriptedPeer, TestFixture, TestNetwork};

type TestClient = Client<Arc<MemoryHost>, Arc<MemoryBlockStore>, Arc<RecordingChain>>;

fn uncompressed() -> ClientConfig {
    ClientConfig {
        compression: "none".into(),
        ..Default::default()
    }
}

fn client(network: &TestNetwork, config: ClientConfig) -> (TestClient, Arc<RecordingChain>) {
    let chain = RecordingChain::new();
    let client = Client::new(
        Arc::clone(&network.host),
        Arc::new(MemoryBlockStore::new()),
        Arc::clone(&chain),
        config,
    )
    .unwrap();
    (client, chain)
}

/// A network whose peer replays `steps` for blocks-by-root.
async fn scripted(steps: Vec<ScriptStep>) -> TestNetwork {
    let network = TestNetwork::new();
    let peer = ScriptedPeer::new(steps, None);
    let protocol = blocksync::rpc::blocks_by_root_v1().protocol_for(None);
    network.serve(protocol, peer).await;
    network
}

#[tokio::test]
async fn test_sync_with_default_config() {
    let zstd: Arc<dyn Compression> = Arc::new(ZstdCompression::default());
    let network = TestNetwork::serving(Some(zstd)).await;
    let blocks = TestFixture::with_seed([1; 32]).chain(5);
    seed_store(&*network.remote, &blocks).await;

    let (client, chain) = client(&network, ClientConfig::default());
    let report = client.sync_by_root(network.peer, roots(&blocks)).await.unwrap();

    assert_eq!(
        report,
        SyncReport {
            requested: 5,
            received: 5,
            newly_stored: 5,
            already_known: 0,
            processed: 5,
        }
    );
    assert_eq!(chain.roots(), roots(&blocks));
    for block in &blocks {
        let stored = client.store().get(&block.root()).await.unwrap().unwrap();
        assert_eq!(stored.root(), block.root());
        assert_eq!(stored.signature, block.signature);
    }
}

#[tokio::test]
async fn test_mismatched_root_stops_before_store() {
    let blocks = TestFixture::with_seed([2; 32]).chain(3);
    let network = scripted(vec![
        ScriptStep::Block(blocks[0].clone()),
        ScriptStep::Block(blocks[2].clone()),
        ScriptStep::Block(blocks[1].clone()),
    ])
    .await;

    let (client, chain) = client(&network, uncompressed());
    let err = client
        .sync_by_root(network.peer, roots(&blocks))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::RootMismatch { index: 1, .. })
    ));
    assert_eq!(client.store().stats().count, 1);
    assert!(client.store().contains(&blocks[0].root()).await.unwrap());
    assert_eq!(chain.roots(), vec![blocks[0].root()]);
}

#[tokio::test]
async fn test_error_chunk_keeps_earlier_blocks() {
    let blocks = TestFixture::with_seed([3; 32]).chain(5);
    let network = scripted(vec![
        ScriptStep::Block(blocks[0].clone()),
        ScriptStep::Block(blocks[1].clone()),
        ScriptStep::Error(ResultCode::ResourceUnavailable, "pruned".into()),
        ScriptStep::Block(blocks[3].clone()),
    ])
    .await;

    let (client, _chain) = client(&network, uncompressed());
    let err = client
        .sync_by_root(network.peer, roots(&blocks))
        .await
        .unwrap_err();

    match err {
        Error::Sync(SyncError::PeerReported {
            index,
            code,
            message,
        }) => {
            assert_eq!(index, 2);
            assert_eq!(code, ResultCode::ResourceUnavailable);
            assert_eq!(message, "pruned");
        }
        other => panic!("expected peer error, got {other:?}"),
    }
    assert_eq!(client.store().stats().count, 2);
}

#[tokio::test]
async fn test_undecodable_block_is_rejected() {
    let blocks = TestFixture::with_seed([7; 32]).chain(2);
    let network = scripted(vec![
        ScriptStep::Success(vec![1, 2, 3]),
        ScriptStep::Block(blocks[1].clone()),
    ])
    .await;

    let (client, chain) = client(&network, uncompressed());
    let err = client
        .sync_by_root(network.peer, roots(&blocks))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::InvalidChunk { index: 0, .. })
    ));
    assert_eq!(client.store().stats().count, 0);
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_conflicting_signature_fails_store() {
    let fixture = TestFixture::with_seed([8; 32]);
    let blocks = fixture.chain(3);
    let forged = fixture.resign(&blocks[1], [0x55; 32]);
    let network = scripted(vec![
        ScriptStep::Block(blocks[0].clone()),
        ScriptStep::Block(forged.clone()),
        ScriptStep::Block(blocks[2].clone()),
    ])
    .await;

    let (client, chain) = client(&network, uncompressed());
    seed_store(&**client.store(), &blocks[1..2]).await;

    let err = client
        .sync_by_root(network.peer, roots(&blocks))
        .await
        .unwrap_err();

    match err {
        Error::Sync(SyncError::Store {
            index,
            source: StoreError::Conflict {
                root,
                existing,
                incoming,
            },
        }) => {
            assert_eq!(index, 1);
            assert_eq!(root, blocks[1].root());
            assert_eq!(existing, blocks[1].signature);
            assert_eq!(incoming, forged.signature);
        }
        other => panic!("expected store conflict, got {other:?}"),
    }

    let kept = client.store().get(&blocks[1].root()).await.unwrap().unwrap();
    assert_eq!(kept.signature, blocks[1].signature);
    assert!(!client.store().contains(&blocks[2].root()).await.unwrap());
    assert_eq!(chain.roots(), vec![blocks[0].root()]);
}

#[tokio::test]
async fn test_unknown_result_code() {
    let network = scripted(vec![ScriptStep::Raw(vec![0x07, 0x02, 0xaa, 0xbb])]).await;

    let (client, _chain) = client(&network, uncompressed());
    let err = client
        .sync_by_root(network.peer, vec![blocksync::BlockRoot::ZERO])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Sync(SyncError::UnknownResultCode {
            index: 0,
            size: 2,
            code: 7,
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_peer_times_out() {
    let network = scripted(vec![ScriptStep::Stall]).await;

    let config = ClientConfig {
        timeout_ms: 50,
        ..uncompressed()
    };
    let (client, _chain) = client(&network, config);
    let err = client
        .sync_by_root(network.peer, vec![blocksync::BlockRoot::ZERO])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Sync(SyncError::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_waits_for_slow_peer() {
    let blocks = TestFixture::with_seed([4; 32]).chain(2);
    let network = scripted(vec![
        ScriptStep::Delay(Duration::from_secs(3600)),
        ScriptStep::Block(blocks[0].clone()),
        ScriptStep::Delay(Duration::from_secs(3600)),
        ScriptStep::Block(blocks[1].clone()),
    ])
    .await;

    let config = ClientConfig {
        timeout_ms: 0,
        ..uncompressed()
    };
    let (client, chain) = client(&network, config);
    let report = client.sync_by_root(network.peer, roots(&blocks)).await.unwrap();

    assert_eq!(report.received, 2);
    assert_eq!(chain.len(), 2);
}

#[tokio::test]
async fn test_short_response_is_not_an_error() {
    let blocks = TestFixture::with_seed([5; 32]).chain(3);
    let network = scripted(vec![ScriptStep::Block(blocks[0].clone())]).await;

    let (client, _chain) = client(&network, uncompressed());
    let report = client.sync_by_root(network.peer, roots(&blocks)).await.unwrap();

    assert_eq!(report.requested, 3);
    assert_eq!(report.received, 1);
}

#[tokio::test]
async fn test_client_serves_its_store() {
    let blocks = TestFixture::with_seed([6; 32]).chain(3);
    let host = MemoryHost::new(PeerId::from_bytes([1; 32]));
    let seeder_id = PeerId::from_bytes([9; 32]);

    let seeder = Client::new(
        Arc::clone(&host),
        Arc::new(MemoryBlockStore::new()),
        RecordingChain::new(),
        ClientConfig::default(),
    )
    .unwrap();
    seed_store(&**seeder.store(), &blocks).await;
    let responder = seeder.responder();
    host.register(seeder_id, responder.protocol(), Arc::new(responder))
        .await;

    let chain = RecordingChain::new();
    let leecher = Client::new(
        Arc::clone(&host),
        Arc::new(MemoryBlockStore::new()),
        Arc::clone(&chain),
        ClientConfig::default(),
    )
    .unwrap();
    let report = leecher.sync_by_root(seeder_id, roots(&blocks)).await.unwrap();

    assert_eq!(report.newly_stored, 3);
    assert_eq!(chain.roots(), roots(&blocks));
}

#[tokio::test]
async fn test_ping_through_client() {
    let network = TestNetwork::serving(None).await;
    let (client, _chain) = client(&network, uncompressed());

    let pong = client.ping(network.peer, 11).await.unwrap();
    assert_eq!(pong, Some(blocksync::rpc::Pong(0)));
}

#[test]
fn test_unknown_compression_rejected() {
    let network = TestNetwork::new();
    let config = ClientConfig {
        compression: "snappy".into(),
        ..Default::default()
    };
    let result = Client::new(
        Arc::clone(&network.host),
        Arc::new(MemoryBlockStore::new()),
        RecordingChain::new(),
        config,
    );
    assert!(matches!(result, Err(Error::Codec(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_sync_delivers_every_served_block(blocks in distinct_blocks(8)) {
        prop_assume!(!blocks.is_empty());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (report, forwarded, stored) = runtime.block_on(async {
            let zstd: Arc<dyn Compression> = Arc::new(ZstdCompression::default());
            let network = TestNetwork::serving(Some(zstd)).await;
            seed_store(&*network.remote, &blocks).await;

            let (client, chain) = client(&network, ClientConfig::default());
            let report = client.sync_by_root(network.peer, roots(&blocks)).await.unwrap();
            (report, chain.roots(), client.store().stats().count)
        });

        prop_assert_eq!(report.received, blocks.len());
        prop_assert_eq!(report.newly_stored, blocks.len());
        prop_assert_eq!(forwarded, roots(&blocks));
        prop_assert_eq!(stored as usize, blocks.len());
    }
}
