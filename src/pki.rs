use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use futures::StreamExt;
use k8s_openapi::{
    api::core::v1::{Pod, Secret},
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{
    Client, CustomResource, CustomResourceExt, Resource, ResourceExt,
    api::ListParams,
    core::ObjectMeta,
    runtime::{
        Controller,
        controller::Action,
        events::Reporter,
        watcher::Config as WatcherConfig,
    },
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    allowed_names::AllowedNames,
    kubernetes::{
        self, Annotations, Api, Labels, Object, Resource as KubernetesResource, ResourceName,
        constants::{APP_KUBERNETES_IO_MANAGED_BY_KEY, APP_KUBERNETES_IO_MANAGED_BY_VALUE},
        error_policy,
        events::{PendingEvent, Publisher},
    },
    metrics::Metrics,
};

/*
 * ============================================================================
 * Custom Resource Definition
 * ============================================================================
 */
/// # Pki
///
/// A request for PKI material on behalf of a service.
///
/// When `.serviceName` is one of the operator's allowed names, the operator
/// writes a Secret with the same name as the Pki for the service to mount.
///
/// When it is not, no Secret is written. Instead a Warning Event is posted to
/// every Pod in the namespace, so the error shows up in `kubectl describe pod`
/// next to the mount failure it causes.
#[derive(CustomResource, JsonSchema, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[kube(
    group = "box.com",
    kind = "Pki",
    namespaced,
    printcolumn = r#"{"name":"Service Name", "type":"string", "description":"The service the pki is for", "jsonPath":".spec.serviceName"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "description":"Human readable description of state", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    status = "PkiStatus",
    version = "v1"
)]
#[serde(rename_all = "camelCase")]
pub struct PkiSpec {
    /// Name of the service the pki is for.
    ///
    /// Must be one of the operator's allowed names.
    pub service_name: String,
}

#[derive(JsonSchema, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PkiStatus {
    /// Human readable description of state.
    ///
    /// Possible values:
    ///
    ///  - service name not allowed
    ///  - valid
    pub state: String,

    /// Name of the Secret written for this pki.
    ///
    /// Only populated once `state` is "valid".
    pub secret_name: Option<String>,
}

impl Pki {
    #[must_use]
    pub fn secret_name(&self) -> ResourceName {
        ResourceName::new(self.name_any())
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.spec.service_name
    }
}

impl KubernetesResource for Pki {
    type Spec = PkiSpec;

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl Object for Pki {
    const APP_KUBERNETES_IO_COMPONENT_VALUE: &'static str = "pki";

    type Status = PkiStatus;

    fn status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }
}

#[must_use]
pub fn generate_custom_resource_definition() -> CustomResourceDefinition {
    Pki::crd()
}

/*
 * ============================================================================
 * Config
 * ============================================================================
 */
pub struct Config {
    pub allowed_names: AllowedNames,
    pub reporter: Reporter,
}

/*
 * ============================================================================
 * Controller
 * ============================================================================
 */
pub async fn run_controller(client: Client, config: Config, metrics: Metrics) {
    metrics.kubernetes_api_usage_count::<Pki>("watch");
    metrics.kubernetes_api_usage_count::<Secret>("watch");

    let publisher = Publisher::new(client.clone(), config.reporter.clone(), &metrics);

    Controller::new(kube::Api::<Pki>::all(client.clone()), WatcherConfig::default())
        .owns(
            kube::Api::<Secret>::all(client.clone()),
            WatcherConfig::default().labels(&format!(
                "{APP_KUBERNETES_IO_MANAGED_BY_KEY}={APP_KUBERNETES_IO_MANAGED_BY_VALUE}"
            )),
        )
        .shutdown_on_signal()
        .run(
            reconciler,
            error_policy,
            Arc::new(Context {
                client,
                config,
                metrics,
                publisher,
                warnings: Warnings::default(),
            }),
        )
        .for_each(|_| async {})
        .await;
}

/*
 * ============================================================================
 * Context
 * ============================================================================
 */
struct Context {
    client: Client,
    config: Config,
    metrics: Metrics,
    publisher: Publisher,
    warnings: Warnings,
}

impl kubernetes::Context for Context {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/*
 * ============================================================================
 * State
 * ============================================================================
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ServiceNameNotAllowed,
    Valid,
}

impl State {
    fn new(object: &Pki, allowed_names: &AllowedNames) -> Self {
        if allowed_names.contains(object.service_name()) {
            State::Valid
        } else {
            State::ServiceNameNotAllowed
        }
    }

    fn requeue(self) -> Duration {
        match self {
            // pods created after the last reconciliation need warning too
            State::ServiceNameNotAllowed => Duration::from_secs(300),
            State::Valid => Duration::from_secs(3600),
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::ServiceNameNotAllowed => write!(f, "service name not allowed"),
            State::Valid => write!(f, "valid"),
        }
    }
}

/*
 * ============================================================================
 * Warnings
 * ============================================================================
 */
/// Pods of a rejected pki are warned at most once per interval. The status
/// patch that follows a fan-out triggers another reconciliation straight
/// away, which must not repeat it.
const EVENT_REPUBLISH_INTERVAL: Duration = Duration::from_secs(120);

/// When the pods of each rejected pki were last warned, keyed by uid.
#[derive(Default)]
struct Warnings(Mutex<HashMap<String, (Option<i64>, Instant)>>);

impl Warnings {
    fn is_due(&self, object: &Pki, now: Instant) -> bool {
        let Some(uid) = object.uid() else {
            return true;
        };
        match self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
        {
            Some((generation, at)) => {
                *generation != object.meta().generation
                    || now.duration_since(*at) >= EVENT_REPUBLISH_INTERVAL
            }
            None => true,
        }
    }

    fn record(&self, object: &Pki, now: Instant) {
        let Some(uid) = object.uid() else {
            return;
        };
        let mut warned = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        warned.retain(|_, (_, at)| now.duration_since(*at) < EVENT_REPUBLISH_INTERVAL);
        warned.insert(uid, (object.meta().generation, now));
    }

    fn forget(&self, object: &Pki) {
        if let Some(uid) = object.uid() {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&uid);
        }
    }
}

/*
 * ============================================================================
 * Reconciler
 * ============================================================================
 */
#[tracing::instrument(skip(object, ctx))]
async fn reconciler(object: Arc<Pki>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx
        .metrics
        .count_and_measure(Pki::APP_KUBERNETES_IO_COMPONENT_VALUE);

    let name = object.try_name()?;
    let namespace = object.try_namespace()?;
    tracing::info!(
        name =% name,
        namespace =% namespace,
        service_name = object.service_name(),
        "reconciling"
    );

    let state = State::new(&object, &ctx.config.allowed_names);

    match state {
        State::Valid => {
            ctx.warnings.forget(&object);

            let annotations = Annotations::new().add(&ctx.config.allowed_names);
            let labels = object.try_labels()?;

            // Secret
            reconcile_secret(
                &Api::new(
                    kube::Api::namespaced(ctx.client.clone(), &namespace),
                    &ctx.metrics,
                ),
                &object,
                &annotations,
                &labels,
            )
            .await?;
        }
        State::ServiceNameNotAllowed => {
            tracing::warn!(
                name =% name,
                namespace =% namespace,
                service_name = object.service_name(),
                allowed_names =% ctx.config.allowed_names,
                "service name not allowed"
            );
            ctx.metrics
                .validation_failure(Pki::APP_KUBERNETES_IO_COMPONENT_VALUE);

            // Events
            let now = Instant::now();
            if ctx.warnings.is_due(&object, now) {
                reconcile_events(
                    &Api::new(
                        kube::Api::namespaced(ctx.client.clone(), &namespace),
                        &ctx.metrics,
                    ),
                    &ctx.publisher,
                    &object,
                    &ctx.config.allowed_names,
                )
                .await?;
                ctx.warnings.record(&object, now);
            } else {
                tracing::debug!(name =% name, namespace =% namespace, "pods recently warned");
            }
        }
    }

    // Pki
    reconcile_pki(
        &Api::new(
            kube::Api::namespaced(ctx.client.clone(), &namespace),
            &ctx.metrics,
        ),
        &object,
        state,
    )
    .await?;

    tracing::info!(name =% name, namespace =% namespace, state =% state, "reconciled");

    Ok(Action::requeue(state.requeue()))
}

async fn reconcile_secret(
    api: &Api<Secret>,
    object: &Pki,
    annotations: &Annotations,
    labels: &Labels,
) -> Result<()> {
    api.sync(
        object,
        [((), generate_secret(object, annotations, labels))].into(),
    )
    .await?;
    Ok(())
}

async fn reconcile_events(
    api: &Api<Pod>,
    publisher: &Publisher,
    object: &Pki,
    allowed_names: &AllowedNames,
) -> Result<()> {
    // TODO: only warn pods with a volume mounting the pki's secret
    let pods = api.list(&ListParams::default()).await?;

    let events = generate_events(object, &pods, allowed_names);
    let published = publisher
        .publish(Pki::APP_KUBERNETES_IO_COMPONENT_VALUE, &events)
        .await;

    tracing::info!(pods = pods.len(), events = events.len(), published, "published events");

    Ok(())
}

async fn reconcile_pki(api: &Api<Pki>, object: &Pki, state: State) -> Result<()> {
    api.update_status(
        object,
        PkiStatus {
            state: state.to_string(),
            secret_name: match state {
                State::Valid => Some(object.secret_name().into()),
                State::ServiceNameNotAllowed => None,
            },
        },
    )
    .await
}

/// A placeholder. The Secret carries no key material, only the metadata
/// needed for a service to find and mount it.
fn generate_secret(object: &Pki, annotations: &Annotations, labels: &Labels) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(object.secret_name().into()),
            namespace: object.namespace(),
            annotations: Some(annotations.into()),
            labels: Some(labels.into()),
            ..Default::default()
        },
        type_: Some("Opaque".into()),
        ..Default::default()
    }
}

const EVENT_REASON_SERVICE_NAME_ERROR: &str = "PkiServiceNameError";

const EVENT_ACTION_VALIDATE: &str = "Validate";

/// The API server rejects Event notes longer than this many bytes.
const EVENT_NOTE_MAX_LENGTH: usize = 1024;

/// One Warning per pod in the namespace, plus one on the pki itself.
fn generate_events(object: &Pki, pods: &[Pod], allowed_names: &AllowedNames) -> Vec<PendingEvent> {
    let note = truncate_note(format!(
        "ServiceName: {} in pki: {} is not found in allowedNames: {}",
        object.service_name(),
        object.name_any(),
        allowed_names
    ));
    let pki_reference = object.object_ref(&());

    pods.iter()
        .map(|pod| {
            PendingEvent::warning(
                pod.object_ref(&()),
                Some(pki_reference.clone()),
                EVENT_REASON_SERVICE_NAME_ERROR,
                EVENT_ACTION_VALIDATE,
                note.clone(),
            )
        })
        .chain(std::iter::once(PendingEvent::warning(
            pki_reference.clone(),
            None,
            EVENT_REASON_SERVICE_NAME_ERROR,
            EVENT_ACTION_VALIDATE,
            note.clone(),
        )))
        .collect()
}

fn truncate_note(mut note: String) -> String {
    if note.len() > EVENT_NOTE_MAX_LENGTH {
        let mut end = EVENT_NOTE_MAX_LENGTH - 3;
        while !note.is_char_boundary(end) {
            end -= 1;
        }
        note.truncate(end);
        note.push_str("...");
    }
    note
}
