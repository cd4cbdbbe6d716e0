//! Warm environment pool.
//!
//! Environments are grouped by `language/framework` key. Each key has a
//! bounded idle queue behind its own lock; keys never block each other. A
//! single background task evicts entries that sat idle too long and tops
//! every known key back up to the configured minimum.
//!
//! Entries run an idle command and bind a private host workspace at the test
//! mount point, so graded runs stage files on the host and execute inside the
//! entry with an exec call.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{pool_image_key, PoolConfig};
use crate::errors::EngineError;
use crate::executors::{create_working_dir, EnvironmentGuard};
use crate::models::PoolEntry;
use crate::runtime::{shell_command, ContainerRuntime, EnvironmentDescriptor};
use crate::strategies::{CONTAINER_WORKDIR, TEST_MOUNT_POINT};

const IDLE_COMMAND: &str = "tail -f /dev/null";

/// Clears the bound workspace, dotfiles included, from inside the entry.
fn reset_command() -> String {
    format!("rm -rf {0}/* {0}/.[!.]* 2>/dev/null || true", TEST_MOUNT_POINT)
}

struct IdleEntry {
    entry: PoolEntry,
    last_used: Instant,
}

struct KeyedPool {
    language: String,
    framework: String,
    image: String,
    idle: Mutex<VecDeque<IdleEntry>>,
}

impl KeyedPool {
    fn key(&self) -> String {
        pool_image_key(&self.language, &self.framework)
    }
}

struct PoolInner {
    runtime: Arc<dyn ContainerRuntime>,
    config: PoolConfig,
    work_root: PathBuf,
    pools: RwLock<HashMap<String, Arc<KeyedPool>>>,
    maintenance: Mutex<()>,
    /// Cancelled on shutdown; stops maintenance and refuses new idle entries.
    closed: CancellationToken,
}

pub struct ContainerPool {
    inner: Arc<PoolInner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ContainerPool {
    /// Creates the pool and starts its maintenance task on the current
    /// runtime. Workspaces are created under `work_root`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: PoolConfig, work_root: PathBuf) -> Self {
        let inner = Arc::new(PoolInner {
            runtime,
            config,
            work_root,
            pools: RwLock::new(HashMap::new()),
            maintenance: Mutex::new(()),
            closed: CancellationToken::new(),
        });

        let task = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(maintenance_loop(inner.clone()))),
            Err(_) => {
                log::warn!("No async runtime available; pool maintenance is disabled");
                None
            }
        };

        Self {
            inner,
            task: std::sync::Mutex::new(task),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether a pool image is configured for this pair.
    pub fn supports(&self, language: &str, framework: &str) -> bool {
        self.inner.config.image_for(language, framework).is_some()
    }

    /// Warms the key up to `desired` idle entries, never beyond the maximum.
    /// Returns how many entries were created.
    pub async fn initialize(&self, language: &str, framework: &str, desired: usize) -> Result<usize, EngineError> {
        let pool = self.inner.keyed(language, framework).await?;
        let current = pool.idle.lock().await.len();
        let target = desired.min(self.inner.config.max_per_pool);
        let to_create = target.saturating_sub(current);
        if to_create == 0 {
            return Ok(0);
        }

        log::info!("Warming up pool {} with {} environments", pool.key(), to_create);
        let inner = &self.inner;
        let results: Vec<Result<PoolEntry, EngineError>> = stream::iter(0..to_create)
            .map(|_| inner.create_entry(&pool))
            .buffer_unordered(inner.config.warmup_parallelism.max(1))
            .collect()
            .await;

        let mut created = 0;
        for result in results {
            match result {
                Ok(entry) => {
                    if inner.enqueue(&pool, entry).await {
                        created += 1;
                    }
                }
                Err(e) => log::error!("Failed to create warm environment for {}: {}", pool.key(), e),
            }
        }
        log::info!(
            "Pool {} warmed up with {} environments",
            pool.key(),
            pool.idle.lock().await.len()
        );
        Ok(created)
    }

    /// Takes an idle entry, or creates one when the queue is empty.
    pub async fn checkout(&self, language: &str, framework: &str) -> Result<PoolEntry, EngineError> {
        if self.is_closed() {
            return Err(EngineError::SystemError("container pool is shut down".to_string()));
        }
        let pool = self.inner.keyed(language, framework).await?;
        if let Some(idle) = pool.idle.lock().await.pop_front() {
            log::debug!("Retrieved warm environment {} from pool {}", idle.entry.name, pool.key());
            return Ok(idle.entry);
        }
        log::info!("No warm environment available for {}, creating one", pool.key());
        self.inner.create_entry(&pool).await
    }

    /// Returns an entry after use. Full queues, failed resets and a pool that
    /// has been shut down dispose it.
    pub async fn checkin(&self, entry: PoolEntry) {
        if self.is_closed() {
            log::debug!("Pool is shut down, disposing returned environment {}", entry.name);
            self.inner.dispose(entry).await;
            return;
        }

        let pool = match self.inner.keyed(&entry.language, &entry.framework).await {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Returned environment {} has no pool: {}", entry.name, e);
                self.inner.dispose(entry).await;
                return;
            }
        };

        if pool.idle.lock().await.len() >= self.inner.config.max_per_pool {
            log::debug!("Pool {} is full, disposing {}", pool.key(), entry.name);
            self.inner.dispose(entry).await;
            return;
        }

        if let Err(e) = self.inner.reset(&entry).await {
            log::warn!("Failed to reset {}, disposing it: {}", entry.name, e);
            self.inner.dispose(entry).await;
            return;
        }

        if self.inner.enqueue(&pool, entry).await {
            log::debug!("Returned environment to pool {}", pool.key());
        }
    }

    pub async fn dispose(&self, entry: PoolEntry) {
        self.inner.dispose(entry).await;
    }

    /// One maintenance pass over every known key.
    pub async fn run_maintenance(&self) {
        self.inner.run_maintenance().await;
    }

    pub async fn idle_count(&self, language: &str, framework: &str) -> usize {
        let key = pool_image_key(language, framework);
        let pool = self.inner.pools.read().await.get(&key).cloned();
        match pool {
            Some(pool) => pool.idle.lock().await.len(),
            None => 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Stops maintenance and disposes every idle entry. Entries checked in
    /// afterwards are disposed on return.
    pub async fn shutdown(&self) {
        self.inner.closed.cancel();
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("Pool maintenance task ended abnormally: {}", e);
            }
        }

        let pools: Vec<Arc<KeyedPool>> = self.inner.pools.read().await.values().cloned().collect();
        for pool in pools {
            let drained: Vec<IdleEntry> = pool.idle.lock().await.drain(..).collect();
            for idle in drained {
                self.inner.dispose(idle.entry).await;
            }
        }
        log::info!("Container pool shut down");
    }
}

impl Drop for ContainerPool {
    fn drop(&mut self) {
        self.inner.closed.cancel();
    }
}

impl PoolInner {
    async fn keyed(&self, language: &str, framework: &str) -> Result<Arc<KeyedPool>, EngineError> {
        let key = pool_image_key(language, framework);
        if let Some(pool) = self.pools.read().await.get(&key) {
            return Ok(pool.clone());
        }

        let image = self
            .config
            .image_for(language, framework)
            .ok_or_else(|| EngineError::UnsupportedLanguage(key.clone()))?
            .to_string();

        let mut pools = self.pools.write().await;
        let pool = pools.entry(key).or_insert_with(|| {
            Arc::new(KeyedPool {
                language: language.trim().to_ascii_lowercase(),
                framework: framework.trim().to_ascii_lowercase(),
                image,
                idle: Mutex::new(VecDeque::new()),
            })
        });
        Ok(pool.clone())
    }

    /// Pushes under the key lock unless the queue is full or the pool is
    /// closed; otherwise the entry is disposed.
    async fn enqueue(&self, pool: &KeyedPool, entry: PoolEntry) -> bool {
        let overflow = {
            let mut idle = pool.idle.lock().await;
            if self.closed.is_cancelled() || idle.len() >= self.config.max_per_pool {
                Some(entry)
            } else {
                idle.push_back(IdleEntry {
                    entry,
                    last_used: Instant::now(),
                });
                None
            }
        };
        match overflow {
            Some(entry) => {
                self.dispose(entry).await;
                false
            }
            None => true,
        }
    }

    async fn create_entry(&self, pool: &KeyedPool) -> Result<PoolEntry, EngineError> {
        let name = format!(
            "prewarmed-{}-{}-{}",
            pool.language,
            pool.framework,
            uuid::Uuid::new_v4().simple()
        );
        let workspace = create_working_dir(&self.work_root, &format!("{}-", name))?.keep();

        match self.start_entry(pool, &name, &workspace).await {
            Ok(id) => {
                log::info!(
                    "Created warm environment {} for {}/{}",
                    name,
                    pool.language,
                    pool.framework
                );
                Ok(PoolEntry {
                    id,
                    name,
                    language: pool.language.clone(),
                    framework: pool.framework.clone(),
                    base_image: pool.image.clone(),
                    created_at: Utc::now(),
                    workspace,
                    mount_point: TEST_MOUNT_POINT.to_string(),
                })
            }
            Err(e) => {
                remove_workspace(&workspace).await;
                Err(e)
            }
        }
    }

    async fn start_entry(&self, pool: &KeyedPool, name: &str, workspace: &Path) -> Result<String, EngineError> {
        let descriptor = EnvironmentDescriptor {
            image: pool.image.clone(),
            name: name.to_string(),
            memory_limit_mb: self.config.memory_limit_mb,
            nano_cpus: None,
            host_dir: workspace.to_path_buf(),
            mount_point: TEST_MOUNT_POINT.to_string(),
            working_dir: CONTAINER_WORKDIR.to_string(),
            command: shell_command(IDLE_COMMAND),
            user: Some("root".to_string()),
        };

        self.runtime.ensure_image(&descriptor.image).await?;
        let id = self.runtime.create_container(&descriptor).await?;
        let guard = EnvironmentGuard::new(self.runtime.clone(), id);
        if let Err(e) = self.runtime.start_container(guard.id()).await {
            guard.teardown().await;
            return Err(e.into());
        }
        Ok(guard.disarm())
    }

    async fn reset(&self, entry: &PoolEntry) -> Result<(), EngineError> {
        let output = self
            .runtime
            .exec(&entry.id, &shell_command(&reset_command()), Some(CONTAINER_WORKDIR))
            .await?;
        if output.exit_code != 0 {
            return Err(EngineError::ExecutionFailure(format!(
                "reset exited with code {}: {}",
                output.exit_code, output.stderr
            )));
        }
        log::debug!("Reset {} for reuse", entry.name);
        Ok(())
    }

    async fn dispose(&self, entry: PoolEntry) {
        match self.runtime.remove_container(&entry.id).await {
            Ok(()) => log::debug!("Disposed warm environment {}", entry.name),
            Err(e) => log::warn!("Failed to dispose warm environment {}: {}", entry.name, e),
        }
        remove_workspace(&entry.workspace).await;
    }

    async fn run_maintenance(&self) {
        let _running = self.maintenance.lock().await;
        log::debug!("Starting container pool maintenance");

        let pools: Vec<Arc<KeyedPool>> = self.pools.read().await.values().cloned().collect();
        for pool in pools {
            let evicted = self.evict_idle(&pool).await;
            if !evicted.is_empty() {
                log::info!("Removing {} idle environments from pool {}", evicted.len(), pool.key());
            }
            for entry in evicted {
                self.dispose(entry).await;
            }
            self.replenish(&pool).await;
        }

        log::debug!("Container pool maintenance completed");
    }

    fn idle_timeout_elapsed(&self, idle: &IdleEntry) -> bool {
        idle.last_used.elapsed() > self.config.idle_timeout()
    }

    async fn evict_idle(&self, pool: &KeyedPool) -> Vec<PoolEntry> {
        let mut idle = pool.idle.lock().await;
        let mut remaining = idle.len();
        let mut kept = VecDeque::with_capacity(remaining);
        let mut evicted = Vec::new();

        for entry in idle.drain(..) {
            if remaining > self.config.min_per_pool && self.idle_timeout_elapsed(&entry) {
                remaining -= 1;
                evicted.push(entry.entry);
            } else {
                kept.push_back(entry);
            }
        }
        *idle = kept;
        evicted
    }

    async fn replenish(&self, pool: &KeyedPool) {
        let missing = self
            .config
            .min_per_pool
            .saturating_sub(pool.idle.lock().await.len());
        if missing == 0 {
            return;
        }

        log::info!("Replenishing pool {} with {} environments", pool.key(), missing);
        for _ in 0..missing {
            match self.create_entry(pool).await {
                Ok(entry) => {
                    self.enqueue(pool, entry).await;
                }
                Err(e) => log::error!("Failed to create environment for pool {}: {}", pool.key(), e),
            }
        }
    }
}

async fn remove_workspace(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to delete workspace {}: {}", path.display(), e);
        }
    }
}

async fn maintenance_loop(inner: Arc<PoolInner>) {
    let cancel = inner.closed.clone();
    let period = inner.config.maintenance_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => inner.run_maintenance().await,
        }
    }
    log::debug!("Pool maintenance loop stopped");
}
