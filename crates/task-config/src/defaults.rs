//! §4.4 defaults table: `{Strategy: wait_all, MaxWorkers: 10, BatchSize: 1,
//! ItemVar: "item", IndexVar: "index", CollectionMode: parallel,
//! MaxBatchSize: 1000, MaxParallelWorkers: 100, MaxCollectionItems: 10000}`.
//!
//! `Strategy`/`BatchSize`/`ItemVar`/`IndexVar`/`CollectionMode` already
//! default correctly through `#[serde(default = ...)]` on the `task-core`
//! types; only `MaxWorkers` needs a post-parse pass, since its default
//! depends on the task's own `tasks` list length for `parallel`.

use task_core::{Config, TaskBody};

pub const DEFAULT_MAX_WORKERS: u32 = 10;
pub const MAX_WORKERS_MIN: u32 = 1;
pub const MAX_WORKERS_MAX: u32 = 100;
pub const BATCH_MIN: u32 = 1;
pub const BATCH_MAX: u32 = 1000;
pub const MAX_COLLECTION_ITEMS: usize = 10_000;

/// Recursively fills `MaxWorkers` where unset. For `parallel`, the default
/// is `len(tasks)` (clamped into the valid range); everything else falls
/// back to `DEFAULT_MAX_WORKERS`.
pub fn apply(cfg: &mut Config) {
    if cfg.max_workers.is_none() {
        let default = match &cfg.body {
            TaskBody::Parallel(p) => (p.tasks.len() as u32).clamp(MAX_WORKERS_MIN, MAX_WORKERS_MAX),
            _ => DEFAULT_MAX_WORKERS,
        };
        cfg.max_workers = Some(default);
    }

    match &mut cfg.body {
        TaskBody::Parallel(p) => p.tasks.iter_mut().for_each(apply),
        TaskBody::Composite(c) => c.tasks.iter_mut().for_each(apply),
        TaskBody::Collection(c) => apply(&mut c.task),
        _ => {}
    }
}
