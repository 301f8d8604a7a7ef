//! Solver configuration
//!
//! All tuning knobs are passed explicitly into solver construction; the
//! crate owns no global mutable state. A config is validated once at
//! construction and then shared immutably by the solvers.

use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, Result};

/// Configuration shared by both fixpoint engines.
///
/// # Examples
///
/// ```
/// use interflow::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.call_string_depth, 2);
///
/// let bounded = AnalysisConfig::default().with_node_budget(10_000);
/// assert_eq!(bounded.node_budget, Some(10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Call-string bound K for the monotone solver. Contexts longer than
    /// K are truncated to their most recent K call sites, merging the
    /// calling contexts that collapse to the same suffix.
    pub call_string_depth: usize,

    /// Maximum cardinality of a candidate-value set before it widens to
    /// Bottom.
    pub max_set_size: usize,

    /// Optional limit on processed worklist items. When exceeded the
    /// solver stops and flags the (partial) result as unsound.
    pub node_budget: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            call_string_depth: 2,
            max_set_size: 4,
            node_budget: None,
        }
    }
}

impl AnalysisConfig {
    /// Set the call-string bound K.
    pub fn with_call_string_depth(mut self, k: usize) -> Self {
        self.call_string_depth = k;
        self
    }

    /// Set the candidate-value set cap.
    pub fn with_max_set_size(mut self, cap: usize) -> Self {
        self.max_set_size = cap;
        self
    }

    /// Bound the number of processed worklist items.
    pub fn with_node_budget(mut self, budget: usize) -> Self {
        self.node_budget = Some(budget);
        self
    }

    /// Validate the configuration.
    ///
    /// A zero set cap would widen every non-empty set immediately and a
    /// zero budget would produce an empty, unsound result; both are
    /// almost certainly caller mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.max_set_size == 0 {
            return Err(AnalysisError::config("max_set_size must be at least 1"));
        }
        if self.node_budget == Some(0) {
            return Err(AnalysisError::config("node_budget must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cap_rejected() {
        let config = AnalysisConfig::default().with_max_set_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = AnalysisConfig::default().with_node_budget(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chaining() {
        let config = AnalysisConfig::default()
            .with_call_string_depth(3)
            .with_max_set_size(2);
        assert_eq!(config.call_string_depth, 3);
        assert_eq!(config.max_set_size, 2);
    }
}
