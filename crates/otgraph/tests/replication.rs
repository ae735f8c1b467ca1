//! End-to-end replication between in-process nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use otgraph::core::{
    CommitEntry, CommitId, Ed25519PublicKey, RawCommit, RawCommitHead, RawPullRequest, RawSnapshot, RepoId,
    Signed, ValidationError,
};
use otgraph::store::{MemoryStore, SqliteStore, Store};
use otgraph::sync::{collect_walk, entry_ids, CommitStream, SyncError};
use otgraph::{
    Node, NodeConfig, NodeError, NodeId, NodeProtocol, NodeRole, Peer, PushPolicy,
    StaticDiscovery,
};
use otgraph_testkit::{commit_stream, GraphBuilder, TestFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> NodeConfig {
    NodeConfig {
        push: PushPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        ..NodeConfig::default()
    }
}

fn memory_node(discovery: &Arc<StaticDiscovery>) -> Arc<Node<MemoryStore>> {
    Arc::new(Node::new(
        NodeId::random(),
        Arc::new(MemoryStore::new()),
        discovery.clone(),
        config(),
    ))
}

fn peer_of<S: Store + 'static>(node: &Arc<Node<S>>) -> Peer {
    Peer::new(node.id(), node.clone())
}

async fn head_ids(node: &dyn NodeProtocol, repo: &RepoId) -> anyhow::Result<BTreeSet<CommitId>> {
    Ok(node
        .get_heads(repo)
        .await?
        .iter()
        .map(|h| h.value.commit_id)
        .collect())
}

/// A node that cannot be reached.
struct Unreachable;

fn unreachable<T>() -> otgraph::sync::Result<T> {
    Err(SyncError::PeerUnavailable("connection refused".into()))
}

#[async_trait]
impl NodeProtocol for Unreachable {
    async fn list(&self, _: &Ed25519PublicKey) -> otgraph::sync::Result<BTreeSet<String>> {
        unreachable()
    }
    async fn save(&self, _: &RepoId, _: BTreeMap<CommitId, RawCommit>) -> otgraph::sync::Result<()> {
        unreachable()
    }
    async fn load_commit(&self, _: &RepoId, _: &CommitId) -> otgraph::sync::Result<Option<RawCommit>> {
        unreachable()
    }
    async fn download(&self, _: &RepoId, _: BTreeSet<CommitId>) -> otgraph::sync::Result<CommitStream> {
        unreachable()
    }
    async fn upload(
        &self,
        _: &RepoId,
        _: Vec<Signed<RawCommitHead>>,
        _: CommitStream,
    ) -> otgraph::sync::Result<()> {
        unreachable()
    }
    async fn save_heads(&self, _: &RepoId, _: Vec<Signed<RawCommitHead>>) -> otgraph::sync::Result<()> {
        unreachable()
    }
    async fn get_heads(&self, _: &RepoId) -> otgraph::sync::Result<Vec<Signed<RawCommitHead>>> {
        unreachable()
    }
    async fn poll_heads(&self, _: &RepoId) -> otgraph::sync::Result<Vec<Signed<RawCommitHead>>> {
        unreachable()
    }
    async fn save_snapshot(&self, _: Signed<RawSnapshot>) -> otgraph::sync::Result<()> {
        unreachable()
    }
    async fn load_snapshot(
        &self,
        _: &RepoId,
        _: &CommitId,
    ) -> otgraph::sync::Result<Option<Signed<RawSnapshot>>> {
        unreachable()
    }
    async fn list_snapshots(
        &self,
        _: &RepoId,
        _: BTreeSet<CommitId>,
    ) -> otgraph::sync::Result<BTreeSet<CommitId>> {
        unreachable()
    }
    async fn send_pull_request(&self, _: Signed<RawPullRequest>) -> otgraph::sync::Result<()> {
        unreachable()
    }
    async fn get_pull_requests(
        &self,
        _: &Ed25519PublicKey,
    ) -> otgraph::sync::Result<Vec<Signed<RawPullRequest>>> {
        unreachable()
    }
}

/// Serves another node, with side effects at set points of a transfer.
struct Scripted {
    inner: Arc<Node<MemoryStore>>,
    /// Uploaded to `inner` right after its heads were read.
    write_after_heads: Mutex<Option<(Vec<Signed<RawCommitHead>>, CommitEntry)>>,
    /// Shut the node down once a download has yielded this many commits.
    shutdown_after: Option<(usize, Arc<Node<MemoryStore>>)>,
}

impl Scripted {
    fn new(inner: &Arc<Node<MemoryStore>>) -> Self {
        Self {
            inner: inner.clone(),
            write_after_heads: Mutex::new(None),
            shutdown_after: None,
        }
    }

    fn peer(self) -> Peer {
        Peer::new(self.inner.id(), Arc::new(self))
    }
}

#[async_trait]
impl NodeProtocol for Scripted {
    async fn list(&self, owner: &Ed25519PublicKey) -> otgraph::sync::Result<BTreeSet<String>> {
        self.inner.list(owner).await
    }
    async fn save(&self, repo: &RepoId, commits: BTreeMap<CommitId, RawCommit>) -> otgraph::sync::Result<()> {
        self.inner.save(repo, commits).await
    }
    async fn load_commit(&self, repo: &RepoId, id: &CommitId) -> otgraph::sync::Result<Option<RawCommit>> {
        self.inner.load_commit(repo, id).await
    }
    async fn download(&self, repo: &RepoId, start_nodes: BTreeSet<CommitId>) -> otgraph::sync::Result<CommitStream> {
        let commits = self.inner.download(repo, start_nodes).await?;
        let Some((after, victim)) = self.shutdown_after.clone() else {
            return Ok(commits);
        };
        Ok(commits
            .enumerate()
            .map(move |(i, item)| {
                if i + 1 == after {
                    victim.shutdown();
                }
                item
            })
            .boxed())
    }
    async fn upload(
        &self,
        repo: &RepoId,
        heads: Vec<Signed<RawCommitHead>>,
        commits: CommitStream,
    ) -> otgraph::sync::Result<()> {
        self.inner.upload(repo, heads, commits).await
    }
    async fn save_heads(&self, repo: &RepoId, heads: Vec<Signed<RawCommitHead>>) -> otgraph::sync::Result<()> {
        self.inner.save_heads(repo, heads).await
    }
    async fn get_heads(&self, repo: &RepoId) -> otgraph::sync::Result<Vec<Signed<RawCommitHead>>> {
        let heads = self.inner.get_heads(repo).await?;
        let write = self.write_after_heads.lock().unwrap().take();
        if let Some((new_heads, entry)) = write {
            self.inner
                .upload(repo, new_heads, commit_stream([entry]))
                .await?;
        }
        Ok(heads)
    }
    async fn poll_heads(&self, repo: &RepoId) -> otgraph::sync::Result<Vec<Signed<RawCommitHead>>> {
        self.inner.poll_heads(repo).await
    }
    async fn save_snapshot(&self, snapshot: Signed<RawSnapshot>) -> otgraph::sync::Result<()> {
        self.inner.save_snapshot(snapshot).await
    }
    async fn load_snapshot(
        &self,
        repo: &RepoId,
        id: &CommitId,
    ) -> otgraph::sync::Result<Option<Signed<RawSnapshot>>> {
        self.inner.load_snapshot(repo, id).await
    }
    async fn list_snapshots(
        &self,
        repo: &RepoId,
        known: BTreeSet<CommitId>,
    ) -> otgraph::sync::Result<BTreeSet<CommitId>> {
        self.inner.list_snapshots(repo, known).await
    }
    async fn send_pull_request(&self, request: Signed<RawPullRequest>) -> otgraph::sync::Result<()> {
        self.inner.send_pull_request(request).await
    }
    async fn get_pull_requests(
        &self,
        owner: &Ed25519PublicKey,
    ) -> otgraph::sync::Result<Vec<Signed<RawPullRequest>>> {
        self.inner.get_pull_requests(owner).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_into_empty_node() -> anyhow::Result<()> {
    init_tracing();
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let c1 = fixture.commit(&[CommitId::ROOT], b"first");
    a.save(&repo, [(c1.id, c1.commit.clone())].into()).await?;
    a.save_heads(&repo, fixture.heads([c1.id])).await?;

    // Downloading from the root yields exactly the one commit.
    let sent = collect_walk(a.download(&repo, [CommitId::ROOT].into()).await?).await?;
    assert_eq!(entry_ids(&sent), [c1.id].into());

    let report = b.fetch(&repo, &peer_of(&a)).await?;
    assert_eq!(report.received, 1);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [c1.id].into());
    assert_eq!(b.load_commit(&repo, &c1.id).await?, Some(c1.commit));
    assert_eq!(b.list(&fixture.public_key()).await?, ["test-repo".to_string()].into());
    Ok(())
}

#[tokio::test]
async fn test_fetch_transfers_only_missing_commits() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let chain = graph.chain(CommitId::ROOT, 5);

    // B already holds the first two.
    let early: BTreeMap<_, _> = graph
        .commits()
        .into_iter()
        .filter(|(id, _)| chain[..2].contains(id))
        .collect();
    b.save(&repo, early).await?;
    b.save_heads(&repo, fixture.heads([chain[1]])).await?;

    a.save(&repo, graph.commits()).await?;
    a.save_heads(&repo, graph.signed_heads()).await?;

    let sent = collect_walk(a.download(&repo, [chain[1]].into()).await?).await?;
    let ids: Vec<CommitId> = sent.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![chain[4], chain[3], chain[2]]);

    let report = b.fetch(&repo, &peer_of(&a)).await?;
    assert_eq!(report.received, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [chain[4]].into());

    // Fetching again is a no-op.
    let again = b.fetch(&repo, &peer_of(&a)).await?;
    assert_eq!(again.received, 0);
    assert!(!again.heads.is_changed());
    Ok(())
}

#[tokio::test]
async fn test_fetch_all_merges_branches_from_several_peers() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let p1 = memory_node(&discovery);
    let p2 = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    let x = graph.commit(&[c1]);
    let y = graph.commit(&[c1]);
    let commits = graph.commits();

    for (node, tip) in [(&p1, x), (&p2, y)] {
        let subset = commits
            .iter()
            .filter(|(id, _)| **id == c1 || **id == tip)
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        node.save(&repo, subset).await?;
        node.save_heads(&repo, fixture.heads([tip])).await?;
    }

    let report = b.fetch_all(&repo, &[peer_of(&p1), peer_of(&p2)]).await?;
    assert_eq!(report.peers, 2);
    assert_eq!(report.received, 3);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [x, y].into());
    Ok(())
}

#[tokio::test]
async fn test_fetch_all_skips_unreachable_peer() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    graph.chain(CommitId::ROOT, 2);
    a.save(&repo, graph.commits()).await?;
    a.save_heads(&repo, graph.signed_heads()).await?;

    let down = Peer::new(NodeId::random(), Arc::new(Unreachable));
    let report = b.fetch_all(&repo, &[down, peer_of(&a)]).await?;
    assert_eq!(report.peers, 1);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, graph.heads());
    Ok(())
}

#[tokio::test]
async fn test_fetch_after_divergence_moves_only_new_commits() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let shared = graph.chain(CommitId::ROOT, 50);
    let tip = shared[49];
    let a2 = graph.commit(&[tip]);
    let b2 = graph.commit(&[tip]);

    for (node, own) in [(&a, a2), (&b, b2)] {
        node.save(&repo, graph.subset(shared.iter().copied().chain([own])))
            .await?;
        node.save_heads(&repo, fixture.heads([own])).await?;
    }

    let report = b.fetch(&repo, &peer_of(&a)).await?;
    assert_eq!(report.received, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [a2, b2].into());

    // The other direction, through a push that has to fetch first.
    let c = memory_node(&discovery);
    c.save(&repo, graph.subset(shared.iter().copied().chain([a2])))
        .await?;
    c.save_heads(&repo, fixture.heads([a2])).await?;
    let d = memory_node(&discovery);
    d.save(&repo, graph.subset(shared.iter().copied().chain([b2])))
        .await?;
    d.save_heads(&repo, fixture.heads([b2])).await?;

    let pushed = c.push(&repo, &peer_of(&d)).await?;
    let fetched = pushed.fetched_first.expect("d was ahead");
    assert_eq!((fetched.received, fetched.skipped), (1, 0));
    assert_eq!(pushed.sent, 1);
    assert_eq!(head_ids(d.as_ref(), &repo).await?, [a2, b2].into());
    Ok(())
}

#[tokio::test]
async fn test_fetch_while_peer_heads_advance() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let c1 = fixture.commit(&[CommitId::ROOT], b"1");
    let c2 = fixture.commit(&[c1.id], b"2");
    a.save(&repo, [(c1.id, c1.commit.clone())].into()).await?;
    a.save_heads(&repo, fixture.heads([c1.id])).await?;

    // A client writes c2 to A between its heads being read and the download.
    let scripted = Scripted::new(&a);
    *scripted.write_after_heads.lock().unwrap() = Some((fixture.heads([c2.id]), c2.clone()));
    let report = b.fetch(&repo, &scripted.peer()).await?;
    assert_eq!(report.received, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [c1.id].into());

    let polled: BTreeSet<CommitId> = a
        .poll_heads(&repo)
        .await?
        .iter()
        .map(|h| h.value.commit_id)
        .collect();
    assert_eq!(polled, [c2.id].into());

    // The next fetch picks up the rest.
    let again = b.fetch(&repo, &peer_of(&a)).await?;
    assert_eq!(again.received, 1);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [c2.id].into());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_mid_fetch_leaves_store_untouched() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let chain = graph.chain(CommitId::ROOT, 5);
    a.save(&repo, graph.commits()).await?;
    a.save_heads(&repo, graph.signed_heads()).await?;

    let mut scripted = Scripted::new(&a);
    scripted.shutdown_after = Some((3, b.clone()));
    let err = b.fetch(&repo, &scripted.peer()).await.unwrap_err();
    assert!(matches!(err, NodeError::Sync(SyncError::Cancelled)));

    assert!(b.get_heads(&repo).await?.is_empty());
    for id in &chain {
        assert_eq!(b.load_commit(&repo, id).await?, None);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Push and replica auto-push
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_replica_upload_reaches_master() -> anyhow::Result<()> {
    init_tracing();
    let discovery = Arc::new(StaticDiscovery::new());
    let master = memory_node(&discovery);
    let replica = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();
    discovery
        .register(fixture.public_key(), peer_of(&master))
        .await;

    assert_eq!(master.role(&fixture.public_key()).await?, NodeRole::Master);
    assert_eq!(replica.role(&fixture.public_key()).await?, NodeRole::Replica);

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    replica
        .upload(&repo, graph.signed_heads(), graph.stream())
        .await?;

    assert_eq!(head_ids(replica.as_ref(), &repo).await?, [c1].into());
    assert_eq!(head_ids(master.as_ref(), &repo).await?, [c1].into());

    // A second write on top is pushed as well.
    let c2 = graph.commit(&[c1]);
    replica
        .upload(&repo, fixture.heads([c2]), commit_stream(graph.get(&c2).cloned()))
        .await?;
    assert_eq!(head_ids(master.as_ref(), &repo).await?, [c2].into());
    Ok(())
}

#[tokio::test]
async fn test_auto_push_failure_does_not_fail_upload() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let replica = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();
    discovery
        .register(
            fixture.public_key(),
            Peer::new(NodeId::random(), Arc::new(Unreachable)),
        )
        .await;

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    replica
        .upload(&repo, graph.signed_heads(), graph.stream())
        .await?;
    assert_eq!(head_ids(replica.as_ref(), &repo).await?, [c1].into());
    Ok(())
}

#[tokio::test]
async fn test_unregistered_master_gets_no_auto_push() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let master = memory_node(&discovery);
    let replica = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();
    discovery
        .register(fixture.public_key(), peer_of(&master))
        .await;
    discovery
        .unregister(&fixture.public_key(), &master.id())
        .await;

    assert_eq!(master.role(&fixture.public_key()).await?, NodeRole::Replica);

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    replica
        .upload(&repo, graph.signed_heads(), graph.stream())
        .await?;
    assert_eq!(head_ids(replica.as_ref(), &repo).await?, [c1].into());
    assert!(master.get_heads(&repo).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_push_fetches_first_when_peer_is_ahead() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    let a2 = graph.commit(&[c1]);
    let b2 = graph.commit(&[c1]);
    let entry = |id: CommitId| (id, graph.get(&id).map(|e| e.commit.clone()));

    for (node, tip) in [(&a, a2), (&b, b2)] {
        let subset: BTreeMap<CommitId, RawCommit> = [entry(c1), entry(tip)]
            .into_iter()
            .filter_map(|(id, c)| c.map(|c| (id, c)))
            .collect();
        node.save(&repo, subset).await?;
        node.save_heads(&repo, fixture.heads([tip])).await?;
    }

    let report = a.push(&repo, &peer_of(&b)).await?;
    let fetched = report.fetched_first.expect("b was ahead");
    assert_eq!(fetched.received, 1);
    assert_eq!(report.sent, 1);

    assert_eq!(head_ids(a.as_ref(), &repo).await?, [a2, b2].into());
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [a2, b2].into());

    // Nothing left to send.
    assert!(a.push(&repo, &peer_of(&b)).await?.up_to_date);
    Ok(())
}

#[tokio::test]
async fn test_sync_with_merge_commit() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    let left = graph.chain(c1, 3);
    let right = graph.chain(c1, 1);
    let merge = graph.commit(&[left[2], right[0]]);
    a.save(&repo, graph.commits()).await?;
    a.save_heads(&repo, graph.signed_heads()).await?;
    a.save_snapshot(fixture.snapshot(merge, b"state")).await?;

    let report = b.sync(&repo, &peer_of(&a)).await?;
    assert_eq!(report.fetch.received, graph.len());
    assert!(report.push.up_to_date);
    assert_eq!(report.snapshots, 1);
    assert_eq!(head_ids(b.as_ref(), &repo).await?, [merge].into());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejected input leaves the store untouched
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_forged_commit_is_rejected() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let c1 = fixture.commit(&[CommitId::ROOT], b"honest");
    let mut forged = c1.clone();
    forged.commit.timestamp += 1;

    let err = node
        .upload(&repo, fixture.heads([c1.id]), commit_stream([forged]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::ValidationError(ValidationError::CommitIdMismatch { .. })
    ));
    assert!(node.get_heads(&repo).await?.is_empty());
    assert_eq!(node.load_commit(&repo, &c1.id).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_incomplete_stream_is_rejected() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let chain = graph.chain(CommitId::ROOT, 3);
    let partial = graph.entries().into_iter().filter(|e| e.id != chain[0]);

    let err = node
        .upload(&repo, graph.signed_heads(), commit_stream(partial))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::ValidationError(ValidationError::UnexpectedEndOfStream { missing }) if missing == chain[0]
    ));
    assert_eq!(node.load_commit(&repo, &chain[2]).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_heads_signed_by_stranger_are_rejected() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let owner = TestFixture::new();
    let stranger = TestFixture::new();
    let repo = owner.repo.clone();

    let c1 = owner.commit(&[CommitId::ROOT], b"x");
    node.save(&repo, [(c1.id, c1.commit.clone())].into()).await?;

    let forged = stranger.head_for(&repo, c1.id);
    let err = node.save_heads(&repo, vec![forged]).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::ValidationError(ValidationError::SignatureFailed)
    ));
    assert!(node.get_heads(&repo).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_save_requires_parents() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let c1 = fixture.commit(&[CommitId::ROOT], b"1");
    let c2 = fixture.commit(&[c1.id], b"2");
    let err = node
        .save(&repo, [(c2.id, c2.commit.clone())].into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::ValidationError(ValidationError::StructuralError(_))
    ));

    node.save(&repo, [(c1.id, c1.commit), (c2.id, c2.commit)].into())
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency and lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_to_one_repo() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut tips = BTreeSet::new();
    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let entry = fixture.commit(&[CommitId::ROOT], &[i]);
        tips.insert(entry.id);
        let heads = fixture.heads([entry.id]);
        let node = node.clone();
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            node.upload(&repo, heads, commit_stream([entry])).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(head_ids(node.as_ref(), &repo).await?, tips);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_new_syncs() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();

    b.shutdown();
    let err = b.fetch(&fixture.repo, &peer_of(&a)).await.unwrap_err();
    assert!(matches!(err, NodeError::Shutdown));
    Ok(())
}

#[tokio::test]
async fn test_fetch_from_masters_requires_master() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let fixture = TestFixture::new();

    let err = node.fetch_from_masters(&fixture.repo).await.unwrap_err();
    assert!(matches!(err, NodeError::NoMaster(_)));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots, pull requests, persistent stores
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_snapshots_are_copied_once() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = memory_node(&discovery);
    let b = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let c1 = fixture.commit(&[CommitId::ROOT], b"x");
    a.save(&repo, [(c1.id, c1.commit.clone())].into()).await?;
    a.save_snapshot(fixture.snapshot(c1.id, b"materialized")).await?;

    assert_eq!(b.fetch_snapshots(&repo, &peer_of(&a)).await?, 1);
    assert_eq!(b.fetch_snapshots(&repo, &peer_of(&a)).await?, 0);
    assert!(b.load_snapshot(&repo, &c1.id).await?.is_some());
    assert!(a
        .list_snapshots(&repo, [c1.id].into())
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pull_requests_reach_target_owner() -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let node = memory_node(&discovery);
    let target = TestFixture::new();
    let forker = TestFixture::new();

    let request = forker.pull_request(&target.repo);
    node.send_pull_request(request.clone()).await?;
    node.send_pull_request(request.clone()).await?;

    let received = node.get_pull_requests(&target.public_key()).await?;
    assert_eq!(received, vec![request]);
    assert!(node.get_pull_requests(&forker.public_key()).await?.is_empty());

    // Signed by someone other than the fork owner.
    let forged = Signed::sign(
        RawPullRequest {
            repo: target.repo.clone(),
            fork: forker.repo.clone(),
        },
        &target.keypair,
    );
    assert!(node.send_pull_request(forged).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_node_replicates_from_memory_node() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let discovery = Arc::new(StaticDiscovery::new());
    let source = memory_node(&discovery);
    let fixture = TestFixture::new();
    let repo = fixture.repo.clone();

    let mut graph = GraphBuilder::new(&fixture);
    let c1 = graph.commit(&[CommitId::ROOT]);
    graph.chain(c1, 4);
    source.save(&repo, graph.commits()).await?;
    source.save_heads(&repo, graph.signed_heads()).await?;

    let path = dir.path().join("replica.db");
    {
        let store = Arc::new(SqliteStore::open(&path)?);
        let node = Arc::new(Node::new(NodeId::random(), store, discovery.clone(), config()));
        node.fetch(&repo, &peer_of(&source)).await?;
    }

    // Reopen and serve the same history.
    let store = Arc::new(SqliteStore::open(&path)?);
    let reopened = Arc::new(Node::new(NodeId::random(), store, discovery, config()));
    assert_eq!(head_ids(reopened.as_ref(), &repo).await?, graph.heads());
    let served = collect_walk(reopened.download(&repo, [CommitId::ROOT].into()).await?).await?;
    assert_eq!(served, graph.entries());
    Ok(())
}
