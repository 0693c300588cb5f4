use std::fmt;
use std::sync::Arc;

use crate::core::{Result, ShardingError, Value};
use crate::route::ShardingValue;
use crate::rule::shard_hash::stable_bucket;

/// Maps a sharding value onto a subset of the available targets (data source
/// names or actual table names).
///
/// Implementations return targets in `available` order and never names outside it.
pub trait ShardingAlgorithm: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn do_sharding(&self, available: &[String], value: &ShardingValue) -> Result<Vec<String>>;
}

/// `value mod n`, selecting the target whose trailing number equals the remainder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModShardingAlgorithm;

impl ModShardingAlgorithm {
    fn target_for(&self, available: &[String], value: &Value) -> Result<String> {
        let number = value.as_i64().ok_or_else(|| {
            ShardingError::Routing(format!(
                "mod sharding needs an integer value, got {} '{}'",
                value.type_name(),
                value
            ))
        })?;
        let remainder = number.rem_euclid(available.len() as i64);
        available
            .iter()
            .find(|target| trailing_number(target) == Some(remainder))
            .cloned()
            .ok_or_else(|| {
                ShardingError::Routing(format!(
                    "no target ending in {} among [{}]",
                    remainder,
                    available.join(", ")
                ))
            })
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn name(&self) -> &str {
        "mod"
    }

    fn do_sharding(&self, available: &[String], value: &ShardingValue) -> Result<Vec<String>> {
        ensure_targets(available)?;
        match value {
            ShardingValue::Precise(values) => {
                let mut selected = Vec::with_capacity(values.len());
                for value in values {
                    selected.push(self.target_for(available, value)?);
                }
                Ok(in_available_order(available, &selected))
            }
            ShardingValue::Range { .. } => Ok(available.to_vec()),
        }
    }
}

/// Stable FNV-1a hash of the value text, modulo the number of targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashModShardingAlgorithm;

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn name(&self) -> &str {
        "hash_mod"
    }

    fn do_sharding(&self, available: &[String], value: &ShardingValue) -> Result<Vec<String>> {
        ensure_targets(available)?;
        match value {
            ShardingValue::Precise(values) => {
                let selected: Vec<String> = values
                    .iter()
                    .map(|value| available[stable_bucket(&value.to_string(), available.len())].clone())
                    .collect();
                Ok(in_available_order(available, &selected))
            }
            ShardingValue::Range { .. } => Ok(available.to_vec()),
        }
    }
}

/// Resolves a built-in algorithm by its configuration name.
pub fn sharding_algorithm(name: &str) -> Result<Arc<dyn ShardingAlgorithm>> {
    match name.to_ascii_lowercase().as_str() {
        "mod" => Ok(Arc::new(ModShardingAlgorithm)),
        "hash_mod" => Ok(Arc::new(HashModShardingAlgorithm)),
        other => Err(ShardingError::Config(format!(
            "unknown sharding algorithm '{}'",
            other
        ))),
    }
}

fn ensure_targets(available: &[String]) -> Result<()> {
    if available.is_empty() {
        return Err(ShardingError::Routing(
            "no targets available for sharding".to_string(),
        ));
    }
    Ok(())
}

fn in_available_order(available: &[String], selected: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|target| selected.contains(*target))
        .cloned()
        .collect()
}

fn trailing_number(name: &str) -> Option<i64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}
