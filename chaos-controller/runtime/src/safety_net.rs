use crate::{
    config::{Config, SafeMode},
    core::{count, DisruptionLevel},
    k8s::{
        kinds::DiskFailureSpec, Api, Client, DisruptionSpec, Errors, ListParams, Node, Pod,
        UnsafemodeSpec,
    },
};
use anyhow::Result;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::{fmt, fmt::Debug};
use tracing::{debug, trace};

/// A guard run against new disruptions to bound their blast radius.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SafetyNet {
    CountTooLarge,
    NeitherHostNorPort,
    RootDiskFailure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catch {
    pub safety_net: SafetyNet,
    pub message: String,
}

/// Every safety net that caught an issue with a disruption.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub struct Caught(pub Vec<Catch>);

/// Counts the potential targets of a disruption.
#[async_trait::async_trait]
pub trait TargetCounter {
    /// Counts pods in `namespace`, or in the whole cluster when unset.
    async fn count_pods(&self, namespace: Option<&str>, selector: Option<&str>) -> Result<usize>;

    async fn count_nodes(&self, selector: Option<&str>) -> Result<usize>;
}

/// Lists resources from the API server, one bounded page at a time.
#[derive(Clone)]
pub struct KubeCounter {
    client: Client,
    page_size: u32,
}

pub struct SafetyNets<'a, C> {
    safe_mode: &'a SafeMode,
    counter: &'a C,
}

// === impl SafetyNet ===

impl SafetyNet {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CountTooLarge => "count_too_large",
            Self::NeitherHostNorPort => "neither_host_nor_port",
            Self::RootDiskFailure => "root_disk_failure",
        }
    }
}

impl fmt::Display for SafetyNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Caught ===

impl fmt::Display for Caught {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "at least one of the initial safety nets caught an issue:")?;
        for catch in &self.0 {
            writeln!(f, "\t* {}", catch.message)?;
        }
        Ok(())
    }
}

// === impl KubeCounter ===

impl KubeCounter {
    pub fn new(client: Client, page_size: u32) -> Self {
        Self { client, page_size }
    }

    async fn count<K>(&self, api: Api<K>, selector: Option<&str>) -> Result<usize>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        let mut params = ListParams::default().limit(self.page_size);
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params = params.labels(selector);
        }

        let mut total = 0;
        loop {
            let page = api.list_metadata(&params).await?;
            total += page.items.len();
            trace!(items = page.items.len(), total, "Listed page");
            match page.metadata.continue_.filter(|t| !t.is_empty()) {
                Some(token) => params = params.continue_token(&token),
                None => return Ok(total),
            }
        }
    }
}

#[async_trait::async_trait]
impl TargetCounter for KubeCounter {
    async fn count_pods(&self, namespace: Option<&str>, selector: Option<&str>) -> Result<usize> {
        let api = match namespace {
            Some(ns) => Api::<Pod>::namespaced(self.client.clone(), ns),
            None => Api::<Pod>::all(self.client.clone()),
        };
        self.count(api, selector).await
    }

    async fn count_nodes(&self, selector: Option<&str>) -> Result<usize> {
        self.count(Api::<Node>::all(self.client.clone()), selector)
            .await
    }
}

// === impl SafetyNets ===

impl<'a, C: TargetCounter + Sync> SafetyNets<'a, C> {
    pub fn new(safe_mode: &'a SafeMode, counter: &'a C) -> Self {
        Self { safe_mode, counter }
    }

    /// Runs every safety net the disruption has not opted out of.
    pub async fn check(&self, ns: &str, spec: &DisruptionSpec) -> Result<Vec<Catch>> {
        if !self.safe_mode.enabled {
            return Ok(Vec::new());
        }
        let overrides = spec.unsafe_mode.clone().unwrap_or_default();
        if overrides.disable_all {
            debug!(%ns, "Safety nets disabled");
            return Ok(Vec::new());
        }

        let mut catches = Vec::new();
        if !overrides.disable_count_too_large {
            if let Some(message) = self.count_too_large(ns, spec, &overrides).await? {
                catches.push(Catch {
                    safety_net: SafetyNet::CountTooLarge,
                    message,
                });
            }
        }
        if !overrides.disable_neither_host_nor_port {
            if let Some(message) = missing_network_filters(spec) {
                catches.push(Catch {
                    safety_net: SafetyNet::NeitherHostNorPort,
                    message,
                });
            }
        }
        if spec.level == DisruptionLevel::Node {
            if let Some(disk_failure) = spec.disk_failure.as_ref() {
                catches.extend(
                    node_disk_failure_paths(disk_failure, overrides.allow_root_disk_failure)
                        .into_iter()
                        .map(|message| Catch {
                            safety_net: SafetyNet::RootDiskFailure,
                            message,
                        }),
                );
            }
        }
        Ok(catches)
    }

    /// Estimates the share of the namespace and of the cluster the
    /// disruption would target.
    async fn count_too_large(
        &self,
        ns: &str,
        spec: &DisruptionSpec,
        overrides: &UnsafemodeSpec,
    ) -> Result<Option<String>> {
        let defaults = (
            self.safe_mode.namespace_threshold,
            self.safe_mode.cluster_threshold,
        );
        let (namespace_threshold, cluster_threshold) = overrides
            .count_too_large()
            .map_or(defaults, |c| c.fractions(defaults.0, defaults.1));
        if namespace_threshold >= 1.0 && cluster_threshold >= 1.0 {
            trace!("Count thresholds at 100%, skipping");
            return Ok(None);
        }

        let selector = spec.label_selector().to_string();
        let (matched, namespace_total, cluster_total) = match spec.level {
            DisruptionLevel::Pod => {
                let matched = self.counter.count_pods(Some(ns), Some(&selector)).await?;
                let namespace_total = if namespace_threshold < 1.0 {
                    Some(self.counter.count_pods(Some(ns), None).await?)
                } else {
                    None
                };
                let cluster_total = if cluster_threshold < 1.0 {
                    Some(self.counter.count_pods(None, None).await?)
                } else {
                    None
                };
                (matched, namespace_total, cluster_total)
            }
            // Nodes are not namespaced.
            DisruptionLevel::Node => {
                let matched = self.counter.count_nodes(Some(&selector)).await?;
                let cluster_total = if cluster_threshold < 1.0 {
                    Some(self.counter.count_nodes(None).await?)
                } else {
                    None
                };
                (matched, None, cluster_total)
            }
        };

        // No more targets than the selector matches can ever be disrupted.
        let estimate = count::resolve(spec.count.as_ref(), matched, true)?.clamp(0, matched as i32);
        debug!(%ns, %selector, matched, estimate, ?namespace_total, ?cluster_total, "Estimated targets");

        let mut reasons = Vec::new();
        for (scope, total, threshold) in [
            ("namespace", namespace_total, namespace_threshold),
            ("cluster", cluster_total, cluster_threshold),
        ] {
            let Some(total) = total.filter(|t| *t > 0) else {
                continue;
            };
            let ratio = f64::from(estimate) / total as f64;
            if ratio > threshold {
                reasons.push(format!(
                    "{estimate} targets are {:.0}% of the {scope}, above the {:.0}% threshold",
                    ratio * 100.0,
                    threshold * 100.0,
                ));
            }
        }

        if reasons.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "The specified count represents a large percentage of targets in either the namespace or the kubernetes cluster ({})",
            reasons.join("; ")
        )))
    }
}

fn missing_network_filters(spec: &DisruptionSpec) -> Option<String> {
    let network = spec.network.as_ref()?;
    if network.has_filters() {
        return None;
    }
    Some(
        "The specified network disruption contains neither hosts nor services, which will target all traffic on all ports"
            .to_string(),
    )
}

fn node_disk_failure_paths(spec: &DiskFailureSpec, allow_root: bool) -> Vec<String> {
    let mut messages = Vec::new();
    for path in &spec.paths {
        let trimmed = path.trim();
        if path.is_empty() {
            messages.push(
                "the specified path for the disk failure disruption targeting a node must not be empty."
                    .to_string(),
            );
        } else if trimmed.is_empty() {
            messages.push(
                "the specified path for the disk failure disruption targeting a node must not be blank."
                    .to_string(),
            );
        } else if trimmed == "/" && !allow_root {
            messages.push(
                "the specified path for the disk failure disruption targeting a node must not be \"/\"."
                    .to_string(),
            );
        }
    }
    messages
}

/// Operator policies that disruptions cannot opt out of.
pub(crate) fn check_policy(config: &Config, spec: &DisruptionSpec) -> Errors {
    let mut errors = Errors::default();

    for kind in spec.kind_names() {
        if config.is_kind_disabled(kind) {
            errors.push(
                "Spec",
                format_args!("disruption kind {kind} is currently disabled"),
            );
        }
    }
    if !config.safe_mode.allow_node_failure && spec.node_failure.is_some() {
        errors.push(
            "Spec",
            "node failure disruptions are not allowed in this cluster, please use a disruption type that doesn't affect the node",
        );
    }
    if !config.safe_mode.allow_node_level && spec.level == DisruptionLevel::Node {
        errors.push(
            "Spec",
            "node level disruptions are not allowed in this cluster, please use a pod level disruption",
        );
    }

    errors
}
