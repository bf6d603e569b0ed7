use crate::core::DisruptionKindName;

pub const DEFAULT_NAMESPACE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CLUSTER_THRESHOLD: f64 = 0.66;
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 500;

/// Operator-level settings shared by every admission review.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub safe_mode: SafeMode,
    pub disabled_kinds: Vec<DisruptionKindName>,

    /// Refuses the creation of new disruptions while still admitting
    /// updates and deletions, so that running ones can be cleaned up.
    pub delete_only: bool,

    /// Bounds the number of items fetched per list call by the safety nets.
    pub list_page_size: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SafeMode {
    pub enabled: bool,

    /// Fractions in `(0, 1]`.
    pub namespace_threshold: f64,
    pub cluster_threshold: f64,

    pub allow_node_failure: bool,
    pub allow_node_level: bool,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            safe_mode: SafeMode::default(),
            disabled_kinds: Vec::new(),
            delete_only: false,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn is_kind_disabled(&self, kind: DisruptionKindName) -> bool {
        self.disabled_kinds.contains(&kind)
    }
}

// === impl SafeMode ===

impl Default for SafeMode {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace_threshold: DEFAULT_NAMESPACE_THRESHOLD,
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
            allow_node_failure: true,
            allow_node_level: true,
        }
    }
}
