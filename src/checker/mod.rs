//! Batched vulnerability lookups backed by the report cache.

mod remote;
mod update;

pub use remote::HttpReportTransport;
pub use update::UpdateResolver;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheLookup};
use crate::error::AuditResult;
use crate::model::{Coordinate, CoordinateReport};

/// Largest number of coordinates the report service accepts per request.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// One round trip to a component-report service.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    fn name(&self) -> &'static str;
    async fn component_report(&self, coordinates: &[String]) -> AuditResult<Vec<CoordinateReport>>;
}

/// Answers audit requests from the cache first and the remote service second.
pub struct AuditClient {
    transport: Box<dyn ReportTransport>,
    cache: Mutex<Cache>,
    chunk_size: usize,
}

impl AuditClient {
    pub fn new(transport: Box<dyn ReportTransport>, cache: Cache) -> Self {
        Self {
            transport,
            cache: Mutex::new(cache),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the request size, kept within `1..=DEFAULT_CHUNK_SIZE`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, DEFAULT_CHUNK_SIZE);
        self
    }

    /// Returns a report for every key, fetching only the ones the cache lacks.
    ///
    /// Misses are requested in chunks, one request at a time. Each chunk is
    /// written to the cache as soon as it arrives. The first failing chunk
    /// aborts the call and nothing fetched so far is returned.
    ///
    /// The order of the returned reports is unspecified.
    pub async fn audit(&self, keys: &[Coordinate]) -> AuditResult<Vec<CoordinateReport>> {
        // Held until return so this call is the only cache writer
        let cache = self.cache.lock().await;

        let CacheLookup { missing, mut hits } = cache.get(keys);
        if missing.is_empty() {
            debug!("All {} coordinates served from cache", hits.len());
            return Ok(hits);
        }

        let mut fetched = Vec::with_capacity(missing.len());
        for (index, chunk) in missing.chunks(self.chunk_size).enumerate() {
            let coordinates: Vec<String> = chunk.iter().map(|c| c.as_str().to_string()).collect();
            debug!(
                chunk = index,
                size = coordinates.len(),
                "Requesting component reports from {}",
                self.transport.name()
            );

            let records = self.transport.component_report(&coordinates).await?;

            if let Err(e) = cache.put(&records) {
                warn!("Could not write component reports to cache: {}", e);
            }
            fetched.extend(records);
        }

        hits.extend(fetched);
        Ok(hits)
    }

    /// Deletes every cached report.
    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        self.cache.lock().await.clear()
    }
}
