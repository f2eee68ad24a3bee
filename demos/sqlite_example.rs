use reptree::crdt::Engine;
use reptree::storage::{self, PersistenceAdapter, StorageConfig};
use reptree::PropertyValue;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db_path = "test_reptree.db";
    let config = StorageConfig::Sqlite {
        path: db_path.to_string(),
    };
    let adapter = PersistenceAdapter::open(config).await?;
    println!("SQLite storage initialized at: {}", db_path);

    let mut tree = Engine::new("test-peer-1");
    let rx = storage::attach(&mut tree);
    println!("Engine created with peer ID: {}", tree.peer_id());

    let root_id = tree.create_root()?;
    println!("Added root vertex with ID: {}", root_id);

    tree.set_property(&root_id, "name", PropertyValue::String("Root".into()), false)?;
    println!("Set 'name' property on root vertex");

    let child_id = tree.create_vertex(&root_id)?;
    println!("Added child vertex with ID: {}", child_id);

    tree.set_property(&child_id, "name", PropertyValue::String("Child 1".into()), false)?;
    tree.set_property(&child_id, "value", PropertyValue::F64(42.0), false)?;
    println!("Set properties on child vertex");

    if let Some(vertex) = tree.tree().get(&root_id) {
        println!("Root vertex: {:?}", vertex);
    }
    if let Some(vertex) = tree.tree().get(&child_id) {
        println!("Child vertex: {:?}", vertex);
        for (key, (value, _op_id)) in &vertex.durable_props {
            println!("Property {}: {:?}", key, value);
        }
    }

    // Concurrent edits park on a missing vertex until it arrives; here
    // everything is local, so this move applies immediately.
    tree.move_vertex(&child_id, Some(&root_id))?;
    println!("Moved child vertex");

    if let Some(vertex) = tree.tree().get(&child_id) {
        println!("Child after move: {:?}", vertex);
    }

    drop(tree);
    adapter.run(rx).await?;
    println!("Persisted {} ops to {}", adapter.load_all().await?.len(), db_path);

    println!("Example completed successfully!");
    Ok(())
}
