//! Benchmark harness helpers.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use ormlink_core::{ContextConfig, Persistent, StorageContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::fixtures::{author, post, Author, Post, Scale};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ormlink_core=error".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

/// A database file in a temporary directory with the benchmark entities
/// registered.
pub struct BenchContext {
    pub ctx: StorageContext,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl BenchContext {
    /// Create an empty database.
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.db");
        let ctx = open(&path);
        Self {
            ctx,
            path,
            _dir: dir,
        }
    }

    /// A second context on the same database, acting as another process.
    pub fn reopen(&self) -> StorageContext {
        open(&self.path)
    }

    /// Store an author with `scale` posts related to it.
    pub fn populate(&self, scale: Scale) -> (Arc<Persistent<Author>>, Vec<Arc<Persistent<Post>>>) {
        let owner = self.ctx.create(author(0)).unwrap();
        let posts: Vec<_> = (0..scale.count())
            .map(|i| self.ctx.create(post(i)).unwrap())
            .collect();
        self.ctx.relate_all(&owner, "posts", &posts).unwrap();
        self.ctx.update(&owner).unwrap();
        (owner, posts)
    }
}

impl Default for BenchContext {
    fn default() -> Self {
        Self::new()
    }
}

fn open(path: &std::path::Path) -> StorageContext {
    let ctx = StorageContext::open(ContextConfig::file(path)).unwrap();
    ctx.register::<Author>().unwrap();
    ctx.register::<Post>().unwrap();
    ctx.create_schema().unwrap();
    ctx
}
