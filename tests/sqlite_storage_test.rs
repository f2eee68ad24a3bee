use reptree::crdt::Engine;
use reptree::storage::{self, PersistenceAdapter, StorageConfig};
use reptree::PropertyValue;
use tempfile::tempdir;

#[tokio::test]
async fn persists_and_replays_ops_through_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("test_reptree.db");
    let config = StorageConfig::Sqlite {
        path: db_path.to_string_lossy().to_string(),
    };

    let adapter = PersistenceAdapter::open(config).await?;

    let mut engine = Engine::new("test-peer-1");
    let rx = storage::attach(&mut engine);

    let root = engine.create_root()?;
    engine.set_property(&root, "name", PropertyValue::String("Root".into()), false)?;
    let child = engine.create_vertex(&root)?;

    // Dropping the engine closes the channel's sender so `run` returns.
    drop(engine);
    adapter.run(rx).await?;

    let replayed = adapter.load_all().await?;
    let mut replica = Engine::new("test-peer-2");
    replica.merge(replayed);

    assert_eq!(
        replica
            .tree()
            .get(&root)
            .unwrap()
            .durable_props
            .get("name")
            .unwrap()
            .0,
        PropertyValue::String("Root".into())
    );
    assert_eq!(replica.tree().get(&child).unwrap().parent, Some(root));

    Ok(())
}
