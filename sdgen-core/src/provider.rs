//! The single-slot pipeline cache.
//!
//! At most one pipeline is alive at a time. How a warm slot answers a request
//! for a different mode is decided by [`CachePolicy`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{Loader, Mode, PipelineLike};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// A request for another mode evicts the cached pipeline and builds a new one.
    #[default]
    ByMode,
    /// Whatever pipeline was built first keeps being returned, regardless of
    /// the requested mode.
    MostRecent,
}

pub struct PipelineProvider<L: Loader> {
    loader: L,
    policy: CachePolicy,
    slot: Option<L::Pipeline>,
}

impl<L: Loader> PipelineProvider<L> {
    pub fn new(loader: L, policy: CachePolicy) -> Self {
        Self {
            loader,
            policy,
            slot: None,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn is_warm(&self) -> bool {
        self.slot.is_some()
    }

    pub fn cached_mode(&self) -> Option<Mode> {
        self.slot.as_ref().map(|p| p.mode())
    }

    /// Drops the cached pipeline, releasing its device memory.
    pub fn evict(&mut self) -> Option<Mode> {
        let evicted = self.slot.take().map(|p| p.mode());
        if let Some(mode) = evicted {
            log::info!("Evicted cached {mode} pipeline");
        }
        evicted
    }

    /// Returns the cached pipeline, constructing it first if the slot is empty
    /// (or, under [`CachePolicy::ByMode`], holds a pipeline for another mode).
    pub fn get_pipeline(&mut self, mode: Mode) -> Result<&mut L::Pipeline> {
        let stale = match (&self.slot, self.policy) {
            (Some(cached), CachePolicy::ByMode) => cached.mode() != mode,
            _ => false,
        };
        if stale {
            // The old weights must be gone before the new ones are loaded.
            self.evict();
        }

        let pipeline = match self.slot.take() {
            Some(cached) => {
                log::debug!("Reusing cached {} pipeline for {mode}", cached.mode());
                cached
            }
            None => {
                log::info!("Constructing {mode} pipeline");
                self.loader.load(mode)?
            }
        };
        Ok(self.slot.insert(pipeline))
    }

    /// Like [`get_pipeline`](Self::get_pipeline) but keyed by wire name. An
    /// unrecognised name yields no pipeline.
    pub fn get_pipeline_by_name(&mut self, name: &str) -> Result<Option<&mut L::Pipeline>> {
        match Mode::from_name(name) {
            Some(mode) => self.get_pipeline(mode).map(Some),
            None => Ok(None),
        }
    }
}
