use std::sync::Arc;

use crate::accounts::AccountDirectory;
use crate::config::Config;
use crate::network::ConnectionManager;
use crate::network::worker_pool::WorkerPool;
use crate::round_manager::{RoundManager, RoundSettings};
use game_core::RoundSource;

pub mod accounts;
pub mod config;
pub mod network;
pub mod round_manager;

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct GameServices {
    pub accounts: Arc<AccountDirectory>,
    pub rounds: Arc<RoundManager>,
    pub connections: Arc<ConnectionManager>,
    pub worker_pool: WorkerPool,
    pub read_buffer_bytes: usize,
    pub max_line_bytes: usize,
    pub max_pending_requests: usize,
}

impl GameServices {
    pub fn new(config: &Config, source: Box<dyn RoundSource>) -> Self {
        let settings = RoundSettings {
            duration: config.round_duration(),
            rotation_delay: config.rotation_delay(),
            retry_interval: config.retry_interval(),
        };

        Self {
            accounts: Arc::new(AccountDirectory::new()),
            rounds: RoundManager::new(source, settings),
            connections: Arc::new(ConnectionManager::new()),
            worker_pool: WorkerPool::new(config.worker_threads),
            read_buffer_bytes: config.read_buffer_bytes,
            max_line_bytes: config.max_line_bytes,
            max_pending_requests: config.max_pending_requests,
        }
    }

    /// Stops accepting work and cancels the round timer.
    pub fn shutdown(&self) {
        self.worker_pool.close();
        self.rounds.shutdown();
    }
}
