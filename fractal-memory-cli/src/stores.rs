//! Builds the Volatile Store and Graph Store a [`Config`] describes.

use std::path::Path;
use std::sync::Arc;

use fractal_memory_core::error::Result;
use fractal_memory_core::store::{GraphStore, VolatileStore};
use fractal_memory_core::Config;
use fractal_memory_graph_turso::TursoGraphStore;
use fractal_memory_volatile_redb::RedbVolatileStore;

pub async fn open_volatile(config: &Config) -> Result<Arc<RedbVolatileStore>> {
    let store = RedbVolatileStore::open(Path::new(&config.volatile_url)).await?;
    Ok(Arc::new(store))
}

pub async fn open_graph(config: &Config) -> Result<Arc<TursoGraphStore>> {
    let store = TursoGraphStore::new(&config.graph_uri, &config.graph_password).await?;
    Ok(Arc::new(store))
}

#[must_use]
pub fn as_trait_objects(
    volatile: &Arc<RedbVolatileStore>,
    graph: &Arc<TursoGraphStore>,
) -> (Arc<dyn VolatileStore>, Arc<dyn GraphStore>) {
    (volatile.clone() as Arc<dyn VolatileStore>, graph.clone() as Arc<dyn GraphStore>)
}
