//! Shared source and target connection handles.
//!
//! One source pool and one target client serve every table task of a run;
//! both are reference counted and closed once, by the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::source::{MysqlSource, SourceReader};
use crate::target::{MongoTarget, TargetWriter};

/// Source and target connections for one run.
///
/// Clones share the connections and the closed flag.
#[derive(Clone)]
pub struct Pools {
    pub source: Arc<dyn SourceReader>,
    pub target: Arc<dyn TargetWriter>,
    closed: Arc<AtomicBool>,
}

impl Pools {
    /// Wrap already-open connections.
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self {
            source,
            target,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open both sides from configuration. Either failure is fatal.
    pub async fn connect(config: &Config) -> Result<Self> {
        let max_conns = config.migration.get_max_source_connections();
        let source = MysqlSource::new(&config.source, max_conns).await?;

        let target = match MongoTarget::new(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        debug!(
            "Opened {} source pool ({} connections) and {} target client",
            source.db_type(),
            max_conns,
            target.db_type()
        );

        Ok(Self::new(Arc::new(source), Arc::new(target)))
    }

    /// Close both sides. Only the first call across all clones closes.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::join!(self.source.close(), self.target.close());
        debug!("Closed source and target connections");
    }
}
