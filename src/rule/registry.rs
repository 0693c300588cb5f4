use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::info;

use crate::core::Result;
use crate::rule::context::RuleContext;

/// Holds the current rule snapshot.
///
/// Routing takes an `Arc` snapshot and keeps using it even if a newer rule set
/// is published meanwhile.
#[derive(Debug)]
pub struct RuleRegistry {
    current: RwLock<Arc<RuleContext>>,
    version: AtomicU64,
}

impl RuleRegistry {
    pub fn new(rules: RuleContext) -> Result<Self> {
        rules.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(rules)),
            version: AtomicU64::new(1),
        })
    }

    pub fn snapshot(&self) -> Result<Arc<RuleContext>> {
        Ok(self.current.read()?.clone())
    }

    /// Validates and installs `rules`, returning the new version.
    pub fn publish(&self, rules: RuleContext) -> Result<u64> {
        rules.validate()?;
        let strategy = rules.strategy_name();
        let mut current = self.current.write()?;
        *current = Arc::new(rules);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Published {} rules as version {}", strategy, version);
        Ok(version)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
