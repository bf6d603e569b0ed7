use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    reviews: Family<ReviewLabels, Counter>,
    safety_net_catches: Family<SafetyNetLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    kind: String,
    decision: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SafetyNetLabels {
    safety_net: &'static str,
}

impl AdmissionMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reviews = Family::default();
        prom.register(
            "admission_reviews",
            "Count of admission reviews by resource kind and decision",
            reviews.clone(),
        );

        let safety_net_catches = Family::default();
        prom.register(
            "safety_net_catches",
            "Count of disruptions caught by each safety net",
            safety_net_catches.clone(),
        );

        Self {
            reviews,
            safety_net_catches,
        }
    }

    pub(crate) fn review(&self, kind: &str, allowed: bool) {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                decision: if allowed { "allowed" } else { "denied" },
            })
            .inc();
    }

    pub(crate) fn caught(&self, safety_net: &'static str) {
        self.safety_net_catches
            .get_or_create(&SafetyNetLabels { safety_net })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn caught_count(&self, safety_net: &'static str) -> u64 {
        self.safety_net_catches
            .get_or_create(&SafetyNetLabels { safety_net })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn review_count(&self, kind: &str, allowed: bool) -> u64 {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                decision: if allowed { "allowed" } else { "denied" },
            })
            .get()
    }
}
