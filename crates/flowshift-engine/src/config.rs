use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Source of the reference time sampled once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(now) => *now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    parallelism: usize,
    chunk_size: usize,
    verify_tree: bool,
    clock: Clock,
    default_job_retries: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            chunk_size: 64,
            verify_tree: true,
            clock: Clock::System,
            default_job_retries: 3,
        }
    }
}

impl MigrationConfig {
    /// Worker threads for batch migration; 0 lets the pool decide.
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads;
        self
    }

    /// Instances handed to the pool at once. An abort is noticed between chunks.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn verify_tree(mut self, verify: bool) -> Self {
        self.verify_tree = verify;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn default_job_retries(mut self, retries: u32) -> Self {
        self.default_job_retries = retries;
        self
    }

    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_verify_tree(&self) -> bool {
        self.verify_tree
    }

    pub fn get_clock(&self) -> Clock {
        self.clock
    }

    pub fn get_default_job_retries(&self) -> u32 {
        self.default_job_retries
    }

    pub fn build_pool(&self) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("flowshift-migrate-{i}"))
            .build()
    }
}
