use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::core::{Result, ShardingError};

/// Picks one read replica among the available slaves.
pub trait LoadBalanceAlgorithm: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Index into `slaves`, or `None` when the slice is empty.
    fn select(&self, rule_name: &str, slaves: &[&str]) -> Option<usize>;
}

/// Cycles through the slaves; deterministic given the starting counter.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalance {
    counter: AtomicUsize,
}

impl RoundRobinLoadBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: usize) -> Self {
        Self {
            counter: AtomicUsize::new(start),
        }
    }
}

impl LoadBalanceAlgorithm for RoundRobinLoadBalance {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn select(&self, _rule_name: &str, slaves: &[&str]) -> Option<usize> {
        if slaves.is_empty() {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % slaves.len())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomLoadBalance;

impl LoadBalanceAlgorithm for RandomLoadBalance {
    fn name(&self) -> &str {
        "random"
    }

    fn select(&self, _rule_name: &str, slaves: &[&str]) -> Option<usize> {
        if slaves.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..slaves.len()))
    }
}

/// Resolves a built-in load balancer by its configuration name.
pub fn load_balance_algorithm(name: &str) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
    match name.to_ascii_lowercase().as_str() {
        "round_robin" => Ok(Arc::new(RoundRobinLoadBalance::new())),
        "random" => Ok(Arc::new(RandomLoadBalance)),
        other => Err(ShardingError::Config(format!(
            "unknown load balance algorithm '{}'",
            other
        ))),
    }
}

/// One master and its read replicas.
#[derive(Debug, Clone)]
pub struct MasterSlaveRule {
    name: String,
    master: String,
    slaves: Vec<String>,
    disabled_slaves: HashSet<String>,
    load_balance: Arc<dyn LoadBalanceAlgorithm>,
}

impl MasterSlaveRule {
    /// Creates a rule balancing reads round-robin.
    pub fn new<I, S>(name: impl Into<String>, master: impl Into<String>, slaves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            master: master.into(),
            slaves: slaves.into_iter().map(Into::into).collect(),
            disabled_slaves: HashSet::new(),
            load_balance: Arc::new(RoundRobinLoadBalance::new()),
        }
    }

    pub fn load_balance(mut self, algorithm: Arc<dyn LoadBalanceAlgorithm>) -> Self {
        self.load_balance = algorithm;
        self
    }

    pub fn disable_slave(mut self, slave: impl Into<String>) -> Self {
        self.disabled_slaves.insert(slave.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub fn slaves(&self) -> &[String] {
        &self.slaves
    }

    pub fn load_balance_algorithm(&self) -> &Arc<dyn LoadBalanceAlgorithm> {
        &self.load_balance
    }

    /// Slaves not disabled, in configuration order.
    pub fn available_slaves(&self) -> Vec<&str> {
        self.slaves
            .iter()
            .filter(|slave| !self.disabled_slaves.contains(*slave))
            .map(String::as_str)
            .collect()
    }

    /// Data source for a read: a balanced available slave, else the master.
    pub fn read_data_source(&self) -> &str {
        let available = self.available_slaves();
        self.load_balance
            .select(&self.name, &available)
            .and_then(|index| available.get(index).copied())
            .unwrap_or(self.master.as_str())
    }

    /// Master first, then slaves.
    pub fn data_source_names(&self) -> Vec<&str> {
        std::iter::once(self.master.as_str())
            .chain(self.slaves.iter().map(String::as_str))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShardingError::Config(
                "master/slave rule name must not be empty".to_string(),
            ));
        }
        if self.master.trim().is_empty() {
            return Err(ShardingError::Config(format!(
                "master of '{}' must not be empty",
                self.name
            )));
        }

        let mut dedupe = HashSet::new();
        for slave in &self.slaves {
            if slave.trim().is_empty() {
                return Err(ShardingError::Config(format!(
                    "slave name of '{}' must not be empty",
                    self.name
                )));
            }
            if slave == &self.master {
                return Err(ShardingError::Config(format!(
                    "slave '{}' of '{}' cannot be the master",
                    slave, self.name
                )));
            }
            if !dedupe.insert(slave) {
                return Err(ShardingError::Config(format!(
                    "slave '{}' appears more than once in '{}'",
                    slave, self.name
                )));
            }
        }

        if let Some(unknown) = self
            .disabled_slaves
            .iter()
            .find(|slave| !self.slaves.contains(*slave))
        {
            return Err(ShardingError::Config(format!(
                "disabled slave '{}' is not a slave of '{}'",
                unknown, self.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_cycles() {
        let lb = RoundRobinLoadBalance::new();
        let slaves = ["s0", "s1"];
        let picks: Vec<usize> = (0..4).filter_map(|_| lb.select("ms", &slaves)).collect();
        assert_eq!(picks, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_random_stays_in_bounds() {
        let slaves = ["s0", "s1", "s2"];
        for _ in 0..50 {
            assert!(RandomLoadBalance.select("ms", &slaves).unwrap() < 3);
        }
        assert_eq!(RandomLoadBalance.select("ms", &[]), None);
    }

    #[test]
    fn test_disabled_slaves_are_skipped() {
        let rule = MasterSlaveRule::new("ms", "master", ["s0", "s1"]).disable_slave("s0");
        assert_eq!(rule.available_slaves(), vec!["s1"]);
        assert_eq!(rule.read_data_source(), "s1");
    }

    #[test]
    fn test_reads_fall_back_to_master() {
        let rule = MasterSlaveRule::new("ms", "master", ["s0"]).disable_slave("s0");
        assert_eq!(rule.read_data_source(), "master");
    }

    #[test]
    fn test_validate_rejects_master_as_slave() {
        let rule = MasterSlaveRule::new("ms", "master", ["master"]);
        assert!(matches!(rule.validate().unwrap_err(), ShardingError::Config(_)));
    }
}
