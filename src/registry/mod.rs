//! The registry controller: a collection of synchronized resource caches
//! and the service catalog computed from them.
//!
//! One watch session per resource kind keeps its cache current and feeds
//! change events into the single serialized queue; the catalog operations
//! in [`catalog`](self) read the caches on demand and never mutate them.

mod catalog;
mod convert;
mod fastpath;
mod workload;

pub use fastpath::{EndpointSink, PushError};
pub use workload::WorkloadIndex;

use crate::api::{
    ClusterClient, EndpointGroupResource, ListFilter, ResourceApi, ResourceObject,
    ServiceResource, WorkloadResource,
};
use crate::handler::{FnHandler, HandlerChain, HandlerError, ResourceHandler};
use crate::model::{EventKind, Labels, NetworkEndpoint, Service, ServiceInstance};
use crate::observe::{EventObserver, NoopObserver, Outcome};
use crate::queue::{Queue, RetryPolicy, Task};
use crate::store::{Store, Writer};
use crate::watcher::{watcher, Event};
use convert::convert_service;
use fastpath::{EndpointPusher, PortMapStage};
use futures::StreamExt;
use parking_lot::Mutex;
use std::{fmt, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Well-known node label carrying the region.
pub const NODE_REGION_LABEL: &str = "failure-domain.beta.kubernetes.io/region";
/// Well-known node label carrying the zone.
pub const NODE_ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";
/// Namespace reserved for cluster infrastructure; its services and
/// endpoint groups are not handed to consumers.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configurable attributes of a [`Controller`].
#[derive(Clone)]
pub struct Options {
    /// Namespace to watch; `None` watches all namespaces.
    pub watched_namespace: Option<String>,
    /// Suffix appended to derived service hostnames.
    pub domain_suffix: String,
    /// Identifies this cluster in pushes to the endpoint sink.
    pub cluster_id: String,
    /// Retry policy for failed handler-chain tasks.
    pub retry: RetryPolicy,
    /// Low-latency endpoint consumer; configures the fast path when set.
    pub endpoint_sink: Option<Arc<dyn EndpointSink>>,
    /// Event counter seam.
    pub observer: Arc<dyn EventObserver>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            watched_namespace: None,
            domain_suffix: "cluster.local".to_string(),
            cluster_id: String::new(),
            retry: RetryPolicy::default(),
            endpoint_sink: None,
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("watched_namespace", &self.watched_namespace)
            .field("domain_suffix", &self.domain_suffix)
            .field("cluster_id", &self.cluster_id)
            .field("retry", &self.retry)
            .field("endpoint_sink", &self.endpoint_sink.is_some())
            .finish_non_exhaustive()
    }
}

/// A latch that flips once a cache completes its initial list.
#[derive(Clone, Debug, Default)]
pub struct ReadyFlag(CancellationToken);

impl ReadyFlag {
    fn new() -> Self {
        Self(CancellationToken::new())
    }

    fn set(&self) {
        self.0.cancel();
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn wait(&self) {
        self.0.cancelled().await;
    }
}

/// First stage of every handler chain: fails until all caches have
/// completed their initial list, so no consumer observes cold-start state.
/// The error makes the queue retry the task after its delay.
struct SyncGate {
    flags: Vec<ReadyFlag>,
}

impl SyncGate {
    fn check(&self) -> Result<(), HandlerError> {
        if self.flags.iter().all(ReadyFlag::is_set) {
            Ok(())
        } else {
            Err(HandlerError::NotSynced)
        }
    }
}

impl<K> ResourceHandler<K> for SyncGate {
    fn on_add(&self, _object: &K) -> Result<(), HandlerError> {
        self.check()
    }

    fn on_update(&self, _object: &K) -> Result<(), HandlerError> {
        self.check()
    }

    fn on_delete(&self, _object: &K) -> Result<(), HandlerError> {
        self.check()
    }
}

/// One watched resource kind: its cache, its handler chain and its sync
/// flag. The writer is taken by the watch session on startup.
pub(crate) struct CacheHandler<K: ResourceObject> {
    pub(crate) store: Store<K>,
    pub(crate) writer: Mutex<Option<Writer<K>>>,
    pub(crate) chain: Arc<HandlerChain<K>>,
    pub(crate) synced: ReadyFlag,
}

impl<K: ResourceObject> CacheHandler<K> {
    fn new() -> Self {
        let (store, writer) = crate::store::store();
        Self {
            store,
            writer: Mutex::new(Some(writer)),
            chain: Arc::new(HandlerChain::new()),
            synced: ReadyFlag::new(),
        }
    }
}

type DirectHandler<K> = Arc<dyn Fn(&K, EventKind) + Send + Sync>;

/// A collection of synchronized resource caches exposing the service
/// catalog. Caches are safe for concurrent reads; only the watch sessions
/// write.
pub struct Controller<C> {
    pub(crate) client: Arc<C>,
    pub(crate) options: Options,
    pub(crate) queue: Arc<Queue>,
    pub(crate) services: CacheHandler<ServiceResource>,
    pub(crate) endpoint_groups: CacheHandler<EndpointGroupResource>,
    pub(crate) nodes: CacheHandler<crate::api::NodeResource>,
    pub(crate) workloads: CacheHandler<WorkloadResource>,
    pub(crate) workload_index: Arc<WorkloadIndex>,
    pub(crate) pusher: Option<Arc<EndpointPusher>>,
}

impl<C: ClusterClient> Controller<C> {
    /// Creates a controller for the given cluster client.
    ///
    /// Nothing is watched until [`Self::run`] is called; handlers may be
    /// registered in between.
    pub fn new(client: Arc<C>, options: Options) -> Self {
        tracing::info!(
            namespace = ?options.watched_namespace,
            "service registry watching services, endpoint groups, nodes and workloads"
        );
        let queue = Arc::new(Queue::new(options.retry, options.observer.clone()));
        let services = CacheHandler::new();
        let endpoint_groups = CacheHandler::new();
        let nodes = CacheHandler::new();
        let workloads = CacheHandler::new();

        let gate = Arc::new(SyncGate {
            flags: vec![
                services.synced.clone(),
                endpoint_groups.synced.clone(),
                nodes.synced.clone(),
                workloads.synced.clone(),
            ],
        });
        services.chain.append(gate.clone());
        endpoint_groups.chain.append(gate.clone());
        nodes.chain.append(gate.clone());
        workloads.chain.append(gate);

        let workload_index = Arc::new(WorkloadIndex::default());
        workloads.chain.append(workload_index.clone());

        let pusher = options.endpoint_sink.clone().map(|sink| {
            Arc::new(EndpointPusher {
                cluster_id: options.cluster_id.clone(),
                domain_suffix: options.domain_suffix.clone(),
                index: workload_index.clone(),
                sink,
            })
        });
        if let Some(pusher) = &pusher {
            services.chain.append(Arc::new(PortMapStage {
                pusher: pusher.clone(),
            }));
        }

        Self {
            client,
            options,
            queue,
            services,
            endpoint_groups,
            nodes,
            workloads,
            workload_index,
            pusher,
        }
    }

    /// True once every cache has completed its initial list.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.services.synced.is_set()
            && self.endpoint_groups.synced.is_set()
            && self.nodes.synced.is_set()
            && self.workloads.synced.is_set()
    }

    /// Waits until [`Self::has_synced`] turns true.
    pub async fn wait_synced(&self) {
        self.services.synced.wait().await;
        self.endpoint_groups.synced.wait().await;
        self.nodes.synced.wait().await;
        self.workloads.synced.wait().await;
    }

    /// Registers a consumer of translated service changes.
    ///
    /// With an endpoint sink configured, service changes feed the sink's
    /// port map instead and the generic translation is bypassed; handlers
    /// registered here are then never invoked.
    pub fn append_service_handler(
        &self,
        handler: impl Fn(&Service, EventKind) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        if self.pusher.is_some() {
            tracing::debug!("endpoint sink configured, service handlers are bypassed");
            return;
        }
        let domain_suffix = self.options.domain_suffix.clone();
        self.services
            .chain
            .append(Arc::new(FnHandler::new(move |svc: &ServiceResource, event| {
                if svc.namespace == SYSTEM_NAMESPACE {
                    return Ok(());
                }
                tracing::debug!(service = %svc.name, namespace = %svc.namespace, %event, "handling service");
                if let Some(converted) = convert_service(svc, &domain_suffix) {
                    handler(&converted, event)?;
                }
                Ok(())
            })));
    }

    /// Registers a consumer of instance changes.
    ///
    /// Endpoint groups are aggregates, so the notification carries the
    /// owning service with an empty endpoint rather than a per-address
    /// fan-out. With an endpoint sink configured, endpoint-group changes
    /// take the fast path and handlers registered here are never invoked.
    pub fn append_instance_handler(
        &self,
        handler: impl Fn(&ServiceInstance, EventKind) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        if self.pusher.is_some() {
            tracing::debug!("endpoint sink configured, instance handlers are bypassed");
            return;
        }
        let domain_suffix = self.options.domain_suffix.clone();
        let services = self.services.store.clone();
        self.endpoint_groups
            .chain
            .append(Arc::new(FnHandler::new(
                move |group: &EndpointGroupResource, event| {
                    if group.namespace == SYSTEM_NAMESPACE {
                        return Ok(());
                    }
                    let Some(raw) = services.get(&group.key()) else {
                        return Ok(());
                    };
                    if let Some(svc) = convert_service(&raw, &domain_suffix) {
                        let instance = ServiceInstance {
                            service: Arc::new(svc),
                            endpoint: NetworkEndpoint::default(),
                            labels: Labels::default(),
                            availability_zone: None,
                            service_account: None,
                        };
                        handler(&instance, event)?;
                    }
                    Ok(())
                },
            )));
    }

    /// Runs the queue worker and all watch sessions until `stop` fires.
    ///
    /// The endpoint-group session starts only after the service, node and
    /// workload caches finish their initial list, so endpoint handling
    /// never runs against empty label and port data. In-flight tasks are
    /// abandoned on stop, not drained.
    pub async fn run(&self, stop: CancellationToken) {
        let filter = match &self.options.watched_namespace {
            Some(namespace) => ListFilter::namespaced(namespace.clone()),
            None => ListFilter::default(),
        };

        {
            let queue = Arc::clone(&self.queue);
            let stop = stop.clone();
            tokio::spawn(async move { queue.run(stop).await });
        }

        self.spawn_watch(&self.services, filter.clone(), None, Vec::new(), &stop);
        // Nodes are cluster-scoped; the namespace filter does not apply.
        self.spawn_watch(&self.nodes, ListFilter::default(), None, Vec::new(), &stop);
        self.spawn_watch(&self.workloads, filter.clone(), None, Vec::new(), &stop);

        let warm = vec![
            self.services.synced.clone(),
            self.nodes.synced.clone(),
            self.workloads.synced.clone(),
        ];
        let direct = self.pusher.as_ref().map(|pusher| {
            let pusher = Arc::clone(pusher);
            Arc::new(move |group: &EndpointGroupResource, event: EventKind| {
                pusher.apply(group, event);
            }) as DirectHandler<EndpointGroupResource>
        });
        self.spawn_watch(&self.endpoint_groups, filter, direct, warm, &stop);

        stop.cancelled().await;
        tracing::info!("registry controller terminated");
    }

    fn spawn_watch<K>(
        &self,
        cache: &CacheHandler<K>,
        filter: ListFilter,
        direct: Option<DirectHandler<K>>,
        wait_for: Vec<ReadyFlag>,
        stop: &CancellationToken,
    ) where
        K: ResourceObject,
        C: ResourceApi<K>,
    {
        let Some(writer) = cache.writer.lock().take() else {
            tracing::error!(kind = %K::KIND, "watch session already started");
            return;
        };
        let api = Arc::clone(&self.client);
        let chain = Arc::clone(&cache.chain);
        let queue = Arc::clone(&self.queue);
        let observer = self.options.observer.clone();
        let synced = cache.synced.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            for flag in &wait_for {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    () = flag.wait() => {}
                }
            }
            run_watch(api, filter, writer, chain, queue, observer, synced, direct, stop).await;
        });
    }
}

/// One resilient watch session: applies the stream to the cache and fans
/// derived changes out to the queue, or directly to the fast path.
#[allow(clippy::too_many_arguments)]
async fn run_watch<K, A>(
    api: Arc<A>,
    filter: ListFilter,
    mut writer: Writer<K>,
    chain: Arc<HandlerChain<K>>,
    queue: Arc<Queue>,
    observer: Arc<dyn EventObserver>,
    synced: ReadyFlag,
    direct: Option<DirectHandler<K>>,
    stop: CancellationToken,
) where
    K: ResourceObject,
    A: ResourceApi<K> + 'static,
{
    let stream = watcher(api, filter);
    futures::pin_mut!(stream);
    loop {
        let item = tokio::select! {
            _ = stop.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(event)) => {
                let restarted = matches!(event, Event::Restarted(_));
                for change in writer.apply(event) {
                    let object = change.object().clone();
                    let Some(event) = change.event() else {
                        observer.event(K::KIND, Outcome::UpdateSame);
                        continue;
                    };
                    observer.event(K::KIND, event.into());
                    if let Some(direct) = &direct {
                        direct(&object, event);
                    } else {
                        let chain = Arc::clone(&chain);
                        queue.push(Task::new(K::KIND, event, move || chain.run(&object, event)));
                    }
                }
                if restarted && !synced.is_set() {
                    tracing::debug!(kind = %K::KIND, "initial list complete");
                    synced.set();
                }
            }
            Some(Err(err)) => {
                tracing::warn!(kind = %K::KIND, error = %err, "watch error, backing off");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
            None => return,
        }
    }
}
