//! Cluster membership: peer discovery, handshake, and the per-shard
//! replicated view of the node set.
//!
//! Shard 0 acts as the leader: it owns the server socket, the candidate
//! queue and the authoritative member set, and fans every membership
//! mutation out to the other shards with `invoke_on_all`, so each shard's
//! ring and client table see the same sequence of changes. Reads — ring
//! lookups on the `get` path — are shard-local and lock-free.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{ClusterEvent, EventEmitter};
use super::handshake::{HandshakeRequest, HandshakeResponse};
use super::ring::HashRing;
use super::rpc::{self, PeerClient};
use super::{ClusterError, NodeDesc};
use crate::constants::{CANDIDATE_QUEUE_BOUND, HANDSHAKE_ATTEMPTS, HANDSHAKE_BACKOFF};
use crate::internal::prelude::*;
use crate::runtime::{context, current_shard, invoke_on_all, shard_count, submit_to, ShardId};

/// Lifecycle of the local node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// The membership service is up but no join has been attempted.
    Bootstrap,
    /// Seeds are being dialed.
    Joining,
    /// The node is part of a cluster (possibly of one).
    Member,
    /// The node is shutting its cluster presence down.
    Stopping,
}

/// One shard's replica of the cluster view.
pub(crate) struct ShardClusterState {
    pub local: NodeDesc,
    pub ring: HashRing,
    /// This shard's private client per peer; never shared across shards.
    pub peers: HashMap<NodeDesc, Rc<PeerClient>>,
    pub state: NodeState,
    /// Present on shard 0 only.
    pub controller: Option<Rc<RefCell<Controller>>>,
}

/// The shard-0 membership controller.
pub(crate) struct Controller {
    local: NodeDesc,
    /// Peers that completed a handshake.
    members: HashSet<NodeDesc>,
    /// Outbound contacts in progress, to de-duplicate candidate traffic.
    connecting: HashSet<NodeDesc>,
    /// Intake of the candidate connection worker. Dropped on stop to close
    /// the queue.
    candidates: Option<mpsc::Sender<NodeDesc>>,
    emitter: Rc<EventEmitter<ClusterEvent>>,
    accept: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

/// Starts the membership service: binds the server socket, installs the
/// per-shard cluster state with the ring seeded to the local node, and
/// spawns the accept loop and the candidate worker.
///
/// Wire handlers must already be registered; the server answers dispatches
/// from the moment the socket is bound.
pub(crate) async fn start(local: NodeDesc) -> Result<Rc<RefCell<Controller>>> {
    let listener = TcpListener::bind(local.addr()).await?;
    info!(
        "[{:?}] cluster node {} up, {} wire handlers registered",
        current_shard(),
        local,
        super::registry::registered_count()
    );

    invoke_on_all(move || async move {
        context::with(|cx| {
            let mut ring = HashRing::new();
            ring.insert(local);
            cx.cluster = Some(Rc::new(RefCell::new(ShardClusterState {
                local,
                ring,
                peers: HashMap::new(),
                state: NodeState::Bootstrap,
                controller: None,
            })));
        });
    })
    .await;

    let (candidates_tx, candidates_rx) = mpsc::channel(CANDIDATE_QUEUE_BOUND);
    let emitter = Rc::new(EventEmitter::new());
    emitter.subscribe(|event: &ClusterEvent| {
        match event {
            ClusterEvent::NodeUp(node) => info!("node up: {}", node),
            ClusterEvent::NodeDown(node) => info!("node down: {}", node),
        }
        Box::pin(std::future::ready(Ok(())))
    });

    let controller = Rc::new(RefCell::new(Controller {
        local,
        members: HashSet::new(),
        connecting: HashSet::new(),
        candidates: Some(candidates_tx),
        emitter,
        accept: None,
        worker: None,
    }));

    let state = context::with(|cx| cx.cluster.clone()).expect("cluster state just installed");
    state.borrow_mut().controller = Some(Rc::clone(&controller));

    let on_handshake = {
        let controller = Rc::clone(&controller);
        Rc::new(move |request| on_handshake(&controller, request))
            as Rc<dyn Fn(HandshakeRequest) -> HandshakeResponse>
    };
    let accept = tokio::task::spawn_local(accept_loop(listener, on_handshake));
    let worker = tokio::task::spawn_local(contact_candidates(Rc::clone(&controller), candidates_rx));
    {
        let mut ctrl = controller.borrow_mut();
        ctrl.accept = Some(accept);
        ctrl.worker = Some(worker);
    }

    Ok(controller)
}

/// Dials the seeds, entering `Member` once at least `min_peers` peers have
/// been admitted.
///
/// Each seed gets [`HANDSHAKE_ATTEMPTS`] attempts with exponential backoff
/// in between; a seed that stays unreachable is logged and skipped. The
/// join fails only when fewer than `min_peers` peers were admitted overall
/// (the default of zero allows standalone operation).
pub(crate) async fn join(
    controller: &Rc<RefCell<Controller>>,
    seeds: &[NodeDesc],
    min_peers: usize,
) -> Result<()> {
    set_state(NodeState::Joining).await;

    if seeds.is_empty() {
        info!("no cluster to join, assuming bootstrap node");
    }
    for seed in seeds {
        if *seed == controller.borrow().local {
            continue;
        }
        if let Err(why) = join_seed(controller, *seed).await {
            warn!("giving up on seed {}: {}", seed, why);
        }
    }

    let connected = controller.borrow().members.len();
    if connected < min_peers {
        return Err(ClusterError::Join {
            wanted: min_peers,
            connected,
        }
        .into());
    }

    set_state(NodeState::Member).await;
    Ok(())
}

async fn join_seed(controller: &Rc<RefCell<Controller>>, seed: NodeDesc) -> Result<()> {
    for attempt in 0..HANDSHAKE_ATTEMPTS {
        match try_add_peer(controller, seed).await {
            Ok(()) => return Ok(()),
            Err(why) => {
                let retries_left = attempt + 1 < HANDSHAKE_ATTEMPTS;
                if !retries_left {
                    break;
                }
                let delay = HANDSHAKE_BACKOFF[attempt as usize];
                warn!(
                    "handshake with {} failed (attempt {}/{}): {}; retrying in {:?}",
                    seed,
                    attempt + 1,
                    HANDSHAKE_ATTEMPTS,
                    why,
                    delay
                );
                tokio::time::sleep(delay).await;
            },
        }
    }

    Err(ClusterError::Handshake {
        peer: seed,
        attempts: HANDSHAKE_ATTEMPTS,
    }
    .into())
}

/// One outbound contact attempt: connect, handshake, admit.
///
/// Already-known and currently-being-contacted endpoints are skipped, which
/// keeps the candidate gossip idempotent.
async fn try_add_peer(controller: &Rc<RefCell<Controller>>, endpoint: NodeDesc) -> Result<()> {
    {
        let mut ctrl = controller.borrow_mut();
        if endpoint == ctrl.local || ctrl.members.contains(&endpoint) {
            debug!("peer {} is already part of the cluster, skipping", endpoint);
            return Ok(());
        }
        if !ctrl.connecting.insert(endpoint) {
            debug!("peer {} is already being contacted, skipping", endpoint);
            return Ok(());
        }
    }

    let outcome = connect_and_handshake(controller, endpoint).await;
    controller.borrow_mut().connecting.remove(&endpoint);
    outcome
}

async fn connect_and_handshake(
    controller: &Rc<RefCell<Controller>>,
    endpoint: NodeDesc,
) -> Result<()> {
    let client = PeerClient::connect(endpoint, on_close_callback(endpoint)).await?;

    let request = {
        let ctrl = controller.borrow();
        HandshakeRequest {
            origin: ctrl.local,
            known_nodes: ctrl.members.iter().copied().collect(),
        }
    };
    debug!("performing handshake with {}", endpoint);
    let response = match client.handshake(request).await {
        Ok(response) => response,
        Err(why) => {
            client.close();
            return Err(why);
        },
    };
    debug!("peer {} reports {} shards", endpoint, response.shard_count);

    admit_peer(controller, endpoint, client, response.known_nodes).await;
    Ok(())
}

/// Enters a handshaken peer into the member set and fans the mutation out:
/// the ring gains the node on every shard, and every shard dials its own
/// client connection to the peer.
async fn admit_peer(
    controller: &Rc<RefCell<Controller>>,
    node: NodeDesc,
    shard0_client: PeerClient,
    learned: Vec<NodeDesc>,
) {
    let emitter = {
        let mut ctrl = controller.borrow_mut();
        ctrl.members.insert(node);
        for candidate in learned {
            enqueue_candidate(&ctrl, candidate);
        }
        Rc::clone(&ctrl.emitter)
    };

    // Shard 0 reuses the connection the handshake ran on; the other shards
    // each dial their own.
    if let Some(state) = context::with(|cx| cx.cluster.clone()) {
        let mut state = state.borrow_mut();
        state.ring.insert(node);
        state.peers.insert(node, Rc::new(shard0_client));
    }
    invoke_on_all(move || async move {
        if current_shard() == ShardId(0) {
            return;
        }
        let Some(state) = context::with(|cx| cx.cluster.clone()) else {
            return;
        };
        match PeerClient::connect(node, on_close_callback(node)).await {
            Ok(client) => {
                let mut state = state.borrow_mut();
                state.ring.insert(node);
                state.peers.insert(node, Rc::new(client));
            },
            Err(why) => {
                // The ring mutation still applies everywhere; dispatches
                // from this shard will surface the missing route.
                warn!("[{:?}] failed to open a client to {}: {}", current_shard(), node, why);
                state.borrow_mut().ring.insert(node);
            },
        }
    })
    .await;

    info!("added peer {} to the hash ring", node);
    emitter.raise(ClusterEvent::NodeUp(node)).await;
}

/// Drops a peer from every shard's view: ring, member set and clients.
pub(crate) async fn remove_peer(controller: &Rc<RefCell<Controller>>, node: NodeDesc) {
    let emitter = {
        let mut ctrl = controller.borrow_mut();
        if !ctrl.members.remove(&node) {
            return;
        }
        Rc::clone(&ctrl.emitter)
    };

    invoke_on_all(move || async move {
        let Some(state) = context::with(|cx| cx.cluster.clone()) else {
            return;
        };
        let mut state = state.borrow_mut();
        state.ring.remove(&node);
        if let Some(client) = state.peers.remove(&node) {
            client.close();
        }
    })
    .await;

    info!("removed peer {} from the hash ring", node);
    emitter.raise(ClusterEvent::NodeDown(node)).await;
}

/// Stops the membership service: closes the accept gate, shuts the
/// candidate intake, and closes every peer client on every shard.
pub(crate) async fn stop(controller: Rc<RefCell<Controller>>) {
    set_state(NodeState::Stopping).await;

    let (accept, worker) = {
        let mut ctrl = controller.borrow_mut();
        ctrl.candidates.take();
        (ctrl.accept.take(), ctrl.worker.take())
    };
    if let Some(accept) = accept {
        accept.abort();
    }
    if let Some(worker) = worker {
        // An in-flight contact attempt is abandoned with its half-open
        // connection; the remote side observes the close.
        worker.abort();
    }

    invoke_on_all(|| async {
        let state = context::with(|cx| cx.cluster.take());
        if let Some(state) = state {
            for (_, client) in state.borrow_mut().peers.drain() {
                client.close();
            }
        }
    })
    .await;

    info!("cluster node stopped");
}

/// Applies a node-state transition on every shard.
async fn set_state(state: NodeState) {
    invoke_on_all(move || async move {
        if let Some(cluster) = context::with(|cx| cx.cluster.clone()) {
            cluster.borrow_mut().state = state;
        }
    })
    .await;
}

/// Server-side handshake: learn the origin and its peers as candidates and
/// answer with our own view.
fn on_handshake(controller: &Rc<RefCell<Controller>>, request: HandshakeRequest) -> HandshakeResponse {
    let ctrl = controller.borrow();
    info!("received handshake from {}", request.origin);

    enqueue_candidate(&ctrl, request.origin);
    for node in request.known_nodes {
        enqueue_candidate(&ctrl, node);
    }

    HandshakeResponse {
        known_nodes: ctrl.members.iter().copied().collect(),
        shard_count: shard_count(),
    }
}

fn enqueue_candidate(ctrl: &Controller, node: NodeDesc) {
    if node == ctrl.local || ctrl.members.contains(&node) {
        return;
    }
    let Some(candidates) = &ctrl.candidates else {
        return;
    };
    if candidates.try_send(node).is_err() {
        warn!("candidate queue full, dropping {}", node);
    }
}

/// The single cooperative worker draining the candidate queue. Exits when
/// the intake is closed on stop.
async fn contact_candidates(
    controller: Rc<RefCell<Controller>>,
    mut candidates: mpsc::Receiver<NodeDesc>,
) {
    while let Some(candidate) = candidates.recv().await {
        if let Err(why) = try_add_peer(&controller, candidate).await {
            warn!("failed to contact candidate {}: {}", candidate, why);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    on_handshake: Rc<dyn Fn(HandshakeRequest) -> HandshakeResponse>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("accepted peer connection from {}", addr);
                rpc::spawn_serve_connection(stream, Rc::clone(&on_handshake));
            },
            Err(why) => warn!("accept failed: {}", why),
        }
    }
}

/// A peer connection observed closed removes the peer everywhere. The
/// notification always routes through shard 0, whatever shard owned the
/// closed client.
fn on_close_callback(node: NodeDesc) -> Box<dyn FnOnce() + 'static> {
    Box::new(move || {
        drop(submit_to(ShardId(0), move || peer_lost(node)));
    })
}

async fn peer_lost(node: NodeDesc) {
    let controller = context::with(|cx| cx.cluster.clone())
        .and_then(|state| state.borrow().controller.clone());
    if let Some(controller) = controller {
        remove_peer(&controller, node).await;
    }
}
