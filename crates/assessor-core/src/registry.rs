//! Strategy registry.
//!
//! One table per strategy family. Registration replaces any existing entry
//! under the same key.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, StrategyFamily};
use crate::interpretation::{
    CompositeStrategy, DefaultCompositeStrategy, InterpretStrategy, InterpretStrategyKind,
    RangeStrategy, ThresholdStrategy,
};
use crate::scoring::{ScoringStrategy, ScoringStrategyKind};

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    scoring: HashMap<String, Arc<dyn ScoringStrategy>>,
    interpret: HashMap<InterpretStrategyKind, Arc<dyn InterpretStrategy>>,
    composite: HashMap<InterpretStrategyKind, Arc<dyn CompositeStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("scoring", &self.scoring_names())
            .field("interpret", &self.interpret_kinds())
            .field("composite", &self.composite_kinds())
            .finish()
    }
}

/// Canonical key for a scoring name: built-in aliases collapse onto one tag.
fn scoring_key(name: &str) -> String {
    match name.parse::<ScoringStrategyKind>() {
        Ok(kind) => kind.as_str().to_string(),
        Err(_) => name.trim().to_ascii_lowercase(),
    }
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in scoring, threshold, range, and composite strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in ScoringStrategyKind::ALL {
            registry.register_scoring(Arc::new(kind));
        }
        registry.register_interpret(Arc::new(ThresholdStrategy));
        registry.register_interpret(Arc::new(RangeStrategy));
        registry.register_composite(Arc::new(DefaultCompositeStrategy));
        registry
    }

    pub fn register_scoring(&mut self, strategy: Arc<dyn ScoringStrategy>) {
        let key = scoring_key(strategy.name());
        if self.scoring.insert(key.clone(), strategy).is_some() {
            tracing::debug!("replaced scoring strategy '{key}'");
        }
    }

    pub fn register_interpret(&mut self, strategy: Arc<dyn InterpretStrategy>) {
        let kind = strategy.kind();
        if self.interpret.insert(kind, strategy).is_some() {
            tracing::debug!("replaced interpret strategy '{kind}'");
        }
    }

    pub fn register_composite(&mut self, strategy: Arc<dyn CompositeStrategy>) {
        let kind = strategy.kind();
        if self.composite.insert(kind, strategy).is_some() {
            tracing::debug!("replaced composite strategy '{kind}'");
        }
    }

    pub fn scoring(&self, name: &str) -> Result<Arc<dyn ScoringStrategy>, EngineError> {
        self.scoring
            .get(&scoring_key(name))
            .cloned()
            .ok_or_else(|| EngineError::StrategyNotRegistered {
                family: StrategyFamily::Scoring,
                name: name.to_string(),
            })
    }

    pub fn interpret_strategy(
        &self,
        kind: InterpretStrategyKind,
    ) -> Result<Arc<dyn InterpretStrategy>, EngineError> {
        self.interpret
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::StrategyNotRegistered {
                family: StrategyFamily::Interpretation,
                name: kind.to_string(),
            })
    }

    pub fn composite_strategy(
        &self,
        kind: InterpretStrategyKind,
    ) -> Result<Arc<dyn CompositeStrategy>, EngineError> {
        self.composite
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::StrategyNotRegistered {
                family: StrategyFamily::Composite,
                name: kind.to_string(),
            })
    }

    /// Sorted scoring keys.
    pub fn scoring_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scoring.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn interpret_kinds(&self) -> Vec<InterpretStrategyKind> {
        let mut kinds: Vec<_> = self.interpret.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn composite_kinds(&self) -> Vec<InterpretStrategyKind> {
        let mut kinds: Vec<_> = self.composite.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
