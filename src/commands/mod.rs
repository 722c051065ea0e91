// ABOUTME: Command implementations for the replicator CLI
// ABOUTME: Exports copy and watch commands plus CLI-over-file config merging

pub mod copy;
pub mod watch;

pub use copy::copy;
pub use watch::watch;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{parse_table_spec, ReplicatorConfig};
use crate::sync::{SchemaDriftPolicy, UnsupportedTypePolicy};

/// Values given on the command line. Each one that is set overrides the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    /// `TABLE:WATERMARK_COLUMN` pairs; when non-empty they replace the file's tables
    pub tables: Vec<String>,
    pub flush_threshold_bytes: Option<usize>,
    pub unsupported_types: Option<UnsupportedTypePolicy>,
    pub schema_drift: Option<SchemaDriftPolicy>,
    pub interval_secs: Option<u64>,
}

/// Load the config file (explicit or default) and apply command-line overrides.
pub fn resolve_config(overrides: ConfigOverrides) -> Result<ReplicatorConfig> {
    let mut config = ReplicatorConfig::load_or_default(overrides.config_path.as_deref())?;
    apply_overrides(&mut config, overrides)?;
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut ReplicatorConfig, overrides: ConfigOverrides) -> Result<()> {
    if let Some(source) = overrides.source_url {
        config.source_url = Some(source);
    }
    if let Some(target) = overrides.target_url {
        config.target_url = Some(target);
    }
    if !overrides.tables.is_empty() {
        config.tables = overrides
            .tables
            .iter()
            .map(|spec| parse_table_spec(spec))
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(threshold) = overrides.flush_threshold_bytes {
        config.flush_threshold_bytes = threshold;
    }
    if let Some(policy) = overrides.unsupported_types {
        config.unsupported_types = policy;
    }
    if let Some(policy) = overrides.schema_drift {
        config.schema_drift = policy;
    }
    if let Some(secs) = overrides.interval_secs {
        config.interval_secs = secs;
    }
    Ok(())
}
