use crate::{
    config::Config,
    k8s::{Disruption, DisruptionSpec, Errors},
    metrics::AdmissionMetrics,
    safety_net::{self, Caught, KubeCounter, SafetyNets, TargetCounter},
    validation,
};
use anyhow::{anyhow, bail, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Validates disruptions before they are persisted.
#[derive(Clone)]
pub struct Admission<C = KubeCounter> {
    config: Arc<Config>,
    counter: C,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

const DELETE_ONLY_MESSAGE: &str =
    "the controller is currently in delete-only mode, you can't create new disruptions for now";

// === impl AdmissionService ===

impl<C> tower::Service<Request<hyper::body::Incoming>> for Admission<C>
where
    C: TargetCounter + Clone + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl<C> Admission<C>
where
    C: TargetCounter + Sync,
{
    pub fn new(config: Arc<Config>, counter: C, metrics: AdmissionMetrics) -> Self {
        Self {
            config,
            counter,
            metrics,
        }
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let kind = req.kind.kind.clone();
        let rsp = if is_kind::<Disruption>(&req) {
            self.admit_disruption(req).await
        } else {
            AdmissionResponse::invalid(format_args!(
                "unsupported resource type: {}.{}.{}",
                req.kind.group, req.kind.version, req.kind.kind
            ))
        };
        self.metrics.review(&kind, rsp.allowed);
        rsp
    }

    async fn admit_disruption(&self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);
        let ns = req.namespace.clone().unwrap_or_default();
        let name = req.name.clone();
        let operation = req.operation;

        let res = match operation {
            Operation::Create => match parse_spec::<DisruptionSpec>(req.object) {
                Ok(spec) => self.validate_create(&ns, &spec).await,
                Err(error) => Err(error),
            },
            Operation::Update => {
                match (
                    parse_spec::<DisruptionSpec>(req.old_object),
                    parse_spec::<DisruptionSpec>(req.object),
                ) {
                    (Ok(old), Ok(new)) => self.validate_update(&old, &new),
                    (Err(error), _) | (_, Err(error)) => Err(error),
                }
            }
            // Deleting a disruption is always allowed so that it can be
            // cleaned up.
            Operation::Delete | Operation::Connect => Ok(()),
        };

        match res {
            Ok(()) => {
                debug!(%ns, %name, ?operation, "Allowed");
                rsp
            }
            Err(error) => {
                info!(%error, %ns, %name, ?operation, "Denied");
                rsp.deny(error)
            }
        }
    }

    async fn validate_create(&self, ns: &str, spec: &DisruptionSpec) -> Result<()> {
        if self.config.delete_only {
            bail!(DELETE_ONLY_MESSAGE);
        }

        let mut errors = validation::validate_spec(spec);
        errors.extend(safety_net::check_policy(&self.config, spec));
        errors.into_result()?;

        let catches = SafetyNets::new(&self.config.safe_mode, &self.counter)
            .check(ns, spec)
            .await?;
        if catches.is_empty() {
            return Ok(());
        }
        for catch in &catches {
            info!(%ns, safety_net = %catch.safety_net, message = %catch.message, "Safety net caught an issue");
            self.metrics.caught(catch.safety_net.as_str());
        }
        Err(Caught(catches).into())
    }

    fn validate_update(&self, old: &DisruptionSpec, new: &DisruptionSpec) -> Result<()> {
        let mut errors: Errors = validation::validate_spec(new);
        errors.extend(validation::validate_update(old, new));
        errors.into_result()?;
        Ok(())
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_spec<T: DeserializeOwned>(obj: Option<DynamicObject>) -> Result<T> {
    let obj = obj.ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let data = obj
        .data
        .get("spec")
        .cloned()
        .ok_or_else(|| anyhow!("admission request missing 'spec'"))?;
    Ok(serde_json::from_value(data)?)
}
