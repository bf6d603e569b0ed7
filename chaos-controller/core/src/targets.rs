use crate::injection::{DisruptionKindName, TargetInjectionStatus, TargetInjectorMap};
use rand::{rngs::StdRng, Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Injections of a disruption, by target (pod or node) name.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct TargetInjections(BTreeMap<String, TargetInjectorMap>);

/// Picks targets uniformly at random, without replacement.
///
/// The random source is owned by the selector so that callers (and tests) can
/// seed it.
#[derive(Debug)]
pub struct TargetSelector<R = StdRng> {
    rng: R,
}

// === impl TargetInjections ===

impl TargetInjections {
    /// Builds a pool of targets, each tracking a not-yet-injected entry for
    /// every active kind.
    pub fn eligible<N, K>(names: N, kinds: K) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        K: IntoIterator<Item = DisruptionKindName>,
        K::IntoIter: Clone,
    {
        let kinds = kinds.into_iter();
        Self(
            names
                .into_iter()
                .map(|n| (n.into(), TargetInjectorMap::for_kinds(kinds.clone())))
                .collect(),
        )
    }

    pub fn get(&self, target: &str) -> Option<&TargetInjectorMap> {
        self.0.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut TargetInjectorMap> {
        self.0.get_mut(target)
    }

    pub fn insert(&mut self, target: impl Into<String>, injections: TargetInjectorMap) {
        self.0.insert(target.into(), injections);
    }

    pub fn remove(&mut self, target: &str) -> Option<TargetInjectorMap> {
        self.0.remove(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0.contains_key(target)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TargetInjectorMap)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An empty set is not considered fully injected: nothing has been
    /// selected yet.
    pub fn not_fully_injected(&self) -> bool {
        self.0.is_empty() || self.0.values().any(|m| !m.all_injected())
    }

    /// Number of targets for which every kind is injected.
    pub fn injected_count(&self) -> usize {
        self.0.values().filter(|m| !m.is_empty() && m.all_injected()).count()
    }

    /// Number of target/kind pairs stuck while being cleaned up.
    pub fn stuck_on_removal_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|m| m.iter())
            .filter(|(_, i)| i.injection_status == TargetInjectionStatus::IsStuckOnRemoval)
            .count()
    }

    /// Drops tracked targets that are no longer part of the matching pool.
    ///
    /// Returns the names of the removed targets.
    pub fn remove_dead_targets<S: AsRef<str>>(&mut self, matching: &[S]) -> Vec<String> {
        let alive = matching.iter().map(AsRef::as_ref).collect::<HashSet<_>>();
        let dead = self
            .0
            .keys()
            .filter(|name| !alive.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for name in &dead {
            debug!(target = %name, "Removing target that no longer matches");
            self.0.remove(name);
        }
        dead
    }
}

impl FromIterator<(String, TargetInjectorMap)> for TargetInjections {
    fn from_iter<T: IntoIterator<Item = (String, TargetInjectorMap)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl TargetSelector ===

impl<R: Rng> TargetSelector<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Moves up to `n` randomly chosen targets from `eligible` into `tracked`.
    ///
    /// Selected targets are removed from `eligible`, so a later call with the
    /// same pool cannot select them twice. Returns the selected names.
    pub fn add_targets(
        &mut self,
        tracked: &mut TargetInjections,
        n: i32,
        eligible: &mut TargetInjections,
    ) -> Vec<String> {
        let names = eligible.0.keys().cloned().collect();
        let selected = self.pick(names, n);
        for name in &selected {
            if let Some(injections) = eligible.0.remove(name) {
                debug!(target = %name, "Selected target");
                tracked.0.insert(name.clone(), injections);
            }
        }
        selected
    }

    /// Removes up to `n` randomly chosen targets from `tracked`. Returns the
    /// removed names.
    pub fn remove_targets(&mut self, tracked: &mut TargetInjections, n: i32) -> Vec<String> {
        let names = tracked.0.keys().cloned().collect();
        let selected = self.pick(names, n);
        for name in &selected {
            debug!(target = %name, "Deselected target");
            tracked.0.remove(name);
        }
        selected
    }

    /// Partial Fisher-Yates: each pick swaps the chosen name out of the
    /// working list.
    fn pick(&mut self, mut names: Vec<String>, n: i32) -> Vec<String> {
        let n = usize::try_from(n).unwrap_or(0).min(names.len());
        let mut picked = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = self.rng.gen_range(0..names.len());
            picked.push(names.swap_remove(idx));
        }
        picked
    }
}

impl TargetSelector<StdRng> {
    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl Default for TargetSelector<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}
