//! Property tests: fetch moves exactly the missing part of random DAGs.

use std::collections::BTreeSet;
use std::sync::Arc;

use otgraph::core::{CommitEntry, CommitId, RepoId};
use otgraph::store::MemoryStore;
use otgraph::sync::{collect_walk, entry_ids};
use otgraph::{Node, NodeConfig, NodeId, NodeProtocol, Peer, StaticDiscovery};
use otgraph_testkit::generators::tips;
use otgraph_testkit::{build_dag, DagShape, TestFixture};
use proptest::prelude::*;

fn node(discovery: &Arc<StaticDiscovery>) -> Arc<Node<MemoryStore>> {
    Arc::new(Node::new(
        NodeId::random(),
        Arc::new(MemoryStore::new()),
        discovery.clone(),
        NodeConfig::default(),
    ))
}

async fn seed(
    node: &Node<MemoryStore>,
    fixture: &TestFixture,
    repo: &RepoId,
    entries: &[CommitEntry],
) -> anyhow::Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let commits = entries.iter().map(|e| (e.id, e.commit.clone())).collect();
    node.save(repo, commits).await?;
    node.save_heads(repo, fixture.heads(tips(entries))).await?;
    Ok(())
}

async fn fetch_prefix(shape: DagShape, split: usize) -> anyhow::Result<()> {
    let discovery = Arc::new(StaticDiscovery::new());
    let a = node(&discovery);
    let b = node(&discovery);
    let fixture = TestFixture::with_seed([9; 32]);
    let repo = fixture.repo.clone();

    let all = build_dag(&fixture, &shape);
    // Parents are created before children, so every prefix is closed.
    let prefix = &all[..split % (all.len() + 1)];
    seed(&a, &fixture, &repo, &all).await?;
    seed(&b, &fixture, &repo, prefix).await?;

    let mut frontier: BTreeSet<CommitId> = tips(prefix);
    if frontier.is_empty() {
        frontier.insert(CommitId::ROOT);
    }
    let sent = collect_walk(a.download(&repo, frontier).await?).await?;
    let expected: BTreeSet<CommitId> = all[prefix.len()..].iter().map(|e| e.id).collect();
    assert_eq!(entry_ids(&sent), expected);
    assert!(sent.windows(2).all(|w| w[0].id < w[1].id));

    let report = b.fetch(&repo, &Peer::new(a.id(), a.clone())).await?;
    assert_eq!(report.received, all.len() - prefix.len());
    assert_eq!(report.skipped, 0);

    let heads: BTreeSet<CommitId> = b
        .get_heads(&repo)
        .await?
        .iter()
        .map(|h| h.value.commit_id)
        .collect();
    assert_eq!(heads, tips(&all));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_fetch_moves_exact_difference(shape: DagShape, split in 0usize..32) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(fetch_prefix(shape, split)).unwrap();
    }
}
