//! The shared ID service and the two byte-oriented front ends built on it.
//!
//! ## Structure
//!
//! - [`stream`] - One-byte batch protocol over raw TCP connections.
//! - [`http`] - The same batch encoding behind `POST /g`.
//!
//! The 9P front end lives in [`crate::server::ninep`] and reaches the
//! generator through [`crate::server::fs::Namespace`].

pub mod http;
pub mod stream;

use crate::server::{config::ServerConfig, stats::StatsRegistry};
use flurry_proto::{Clock, Generator, Result, SnowflakeId};
use std::sync::Arc;

/// Cheaply cloneable handle to the one generator and the one stats registry
/// of the process.
#[derive(Clone)]
pub struct IdService {
    generator: Generator,
    stats: Arc<StatsRegistry>,
}

impl IdService {
    pub fn new(generator: Generator, stats: Arc<StatsRegistry>) -> Self {
        Self { generator, stats }
    }

    /// Builds the process generator, seeding its watermark from
    /// `--last-timestamp` when given.
    pub fn from_config(config: &ServerConfig) -> Self {
        let generator = Generator::from_components(
            config.last_timestamp.unwrap_or(0),
            config.datacenter_id,
            config.worker_id,
            0,
            Clock::default(),
        );
        Self::new(generator, Arc::new(StatsRegistry::new()))
    }

    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Generates `count` IDs in order. Stops at the first failure; IDs
    /// already drawn from the generator are discarded.
    pub fn generate(&self, count: usize) -> Result<Vec<SnowflakeId>> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.generator.try_next_id()?);
        }
        Ok(ids)
    }
}
