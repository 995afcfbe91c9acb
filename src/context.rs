//! Process context
//!
//! Owns the one storage engine a process works with. It is built once at
//! startup and passed to whatever needs the engine; nothing looks it up
//! globally.

use std::env;
use std::path::PathBuf;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::config::Config;
use crate::engine::StorageEngine;
use crate::error::Result;

/// Fallback when the executable name cannot be determined
const FALLBACK_NAME: &str = "atlasstore";

/// Process-lifetime container for a [`StorageEngine`]
///
/// The engine itself is single-threaded; the mutex serializes callers that
/// share the context.
pub struct StoreContext {
    engine: Mutex<StorageEngine>,
}

impl StoreContext {
    /// Open the engine described by `config`
    pub fn open(config: Config) -> Result<Self> {
        info!(data_dir = %config.data_dir.display(), backing = ?config.backing, "opening store context");
        let engine = StorageEngine::open(config)?;
        Ok(Self {
            engine: Mutex::new(engine),
        })
    }

    /// Exclusive access to the engine
    pub fn lock(&self) -> MutexGuard<'_, StorageEngine> {
        self.engine.lock()
    }

    /// Persist and close the engine
    pub fn close(self) -> Result<()> {
        self.engine.into_inner().close()
    }
}

/// `./<exe>_data`, named after the running executable
pub fn default_data_dir() -> PathBuf {
    let name = env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    PathBuf::from(format!("./{}_data", name))
}
