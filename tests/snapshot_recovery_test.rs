use std::fs;

use photosearch::config::SearchConfig;
use photosearch::error::Result;
use photosearch::index::IndexRegistry;
use photosearch::index::snapshot;
use photosearch::vector::Vector;

fn config_at(dir: &tempfile::TempDir) -> SearchConfig {
    let mut config = SearchConfig::with_index_dir(dir.path());
    config.dimension = 2;
    config
}

fn unit(data: Vec<f32>) -> Vector {
    Vector::new(data).normalized()
}

#[test]
fn restarted_registry_serves_from_snapshots() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = IndexRegistry::new(config_at(&dir));
        registry.add(1, 100, Some(7), unit(vec![1.0, 0.0]))?;
        registry.add(1, 101, None, unit(vec![0.0, 1.0]))?;
        registry.remove(1, 101)?;
    }

    // A fresh registry over the same directory sees the persisted state,
    // tombstones included.
    let registry = IndexRegistry::new(config_at(&dir));
    let hits = registry.search(1, &unit(vec![1.0, 0.0]), 10, None, 0.0)?;
    let ids: Vec<_> = hits.iter().map(|h| h.asset_id).collect();
    assert_eq!(ids, vec![100]);

    let stats = registry.stats(1);
    assert_eq!(stats.total_vectors, 2);
    assert_eq!(stats.live_entries, 1);

    let hits = registry.search(1, &unit(vec![1.0, 0.0]), 10, Some(7), 0.0)?;
    assert_eq!(hits.len(), 1);
    Ok(())
}

#[test]
fn corrupt_snapshot_degrades_to_empty_then_rebuild_recovers() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = IndexRegistry::new(config_at(&dir));
        registry.add(1, 100, None, unit(vec![1.0, 0.0]))?;
    }
    fs::write(snapshot::vectors_path(dir.path(), 1), b"not a snapshot").unwrap();

    let registry = IndexRegistry::new(config_at(&dir));
    // Unusable snapshot: the project starts empty instead of erroring.
    assert!(registry
        .search(1, &unit(vec![1.0, 0.0]), 10, None, 0.0)?
        .is_empty());

    // The durable records win: rebuilding restores search and rewrites a
    // healthy snapshot.
    registry.rebuild(1, vec![(100, None, unit(vec![1.0, 0.0]))])?;
    let hits = registry.search(1, &unit(vec![1.0, 0.0]), 10, None, 0.0)?;
    assert_eq!(hits[0].asset_id, 100);

    let reloaded = snapshot::load(dir.path(), 1, 2)?.unwrap();
    assert_eq!(reloaded.live_entries(), 1);
    Ok(())
}

#[test]
fn load_all_warm_starts_every_project_on_disk() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = IndexRegistry::new(config_at(&dir));
        registry.add(3, 1, None, unit(vec![1.0, 0.0]))?;
        registry.add(11, 2, None, unit(vec![0.0, 1.0]))?;
    }

    let registry = IndexRegistry::new(config_at(&dir));
    assert!(registry.resident_projects().is_empty());

    assert_eq!(registry.load_all()?, 2);
    assert_eq!(registry.resident_projects(), vec![3, 11]);
    Ok(())
}

#[test]
fn every_mutation_persists_without_explicit_flush() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let registry = IndexRegistry::new(config_at(&dir));

    registry.add(5, 1, None, unit(vec![1.0, 0.0]))?;
    assert_eq!(snapshot::load(dir.path(), 5, 2)?.unwrap().live_entries(), 1);

    registry.remove(5, 1)?;
    assert_eq!(snapshot::load(dir.path(), 5, 2)?.unwrap().live_entries(), 0);
    Ok(())
}

#[test]
fn dimension_change_invalidates_old_snapshots() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();

    {
        let registry = IndexRegistry::new(config_at(&dir));
        registry.add(1, 100, None, unit(vec![1.0, 0.0]))?;
    }

    // Same directory, different embedding dimension: the stale snapshot is
    // rejected at load and the project starts empty.
    let mut config = SearchConfig::with_index_dir(dir.path());
    config.dimension = 4;
    let registry = IndexRegistry::new(config);
    assert_eq!(registry.stats(1).total_vectors, 0);
    assert_eq!(registry.stats(1).dimension, 4);
    Ok(())
}
