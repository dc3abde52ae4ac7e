//! The message router: the ingress listener, one reader task per accepted
//! connection, and the single combined dispatch/send task that owns all
//! [`PeerState`] mutation and drains the outbound queue through the egress
//! pool in the same loop.
//!
//! Grounded on `original_source/paxos/network/peer.go`'s
//! `ListenForTCPConnections`/`HandleTCPConnection` and
//! `original_source/paxos/handlers/messagehandler.go`'s `HandleMessages`
//! select loop — translated from goroutines-plus-channels into tasks plus
//! `tokio::sync::mpsc`, which is the same shape. As in the original, inbound
//! dispatch and outbound send are interleaved on one `select!` loop rather
//! than split across independent tasks, so the one-task-drives-the-state-
//! machine invariant holds literally, not just in effect.

use crate::{
    codec::{self, MessageKind},
    hosts, paxos,
    pool::{ConnectionPool, PoolRole},
    state::PeerState,
};
use std::{net::IpAddr, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

/// A decoded frame plus the address it arrived from, handed from a reader
/// task to the dispatch task.
pub struct InboundFrame {
    pub bytes: Vec<u8>,
    pub remote_ip: IpAddr,
}

/// A frame queued for delivery to `recipient` (a hostname from the hosts
/// manifest), enqueued by a handler in `paxos.rs` and drained by the
/// dispatch task's own `select!` loop.
pub struct OutboundFrame {
    pub recipient: String,
    pub bytes: Vec<u8>,
}

const READ_BUFFER_BYTES: usize = 4096;

/// Resolve the hostname of a peer that connected from `remote_ip`: a reverse
/// DNS (PTR) lookup, then strip any domain suffix, matching
/// `GetHostnameFromAddr`/`CleanHostname` in the original implementation.
fn resolve_sender_hostname(remote_ip: IpAddr) -> Option<String> {
    match dns_lookup::lookup_addr(&remote_ip) {
        Ok(name) => Some(hosts::short_hostname(&name).to_string()),
        Err(error) => {
            warn!("reverse lookup failed for {remote_ip}: {error}");
            None
        }
    }
}

/// Accept loop: bind `port` and spawn one reader task per accepted
/// connection. Each reader registers its stream half in `ingress`, though
/// replies never go back over it — per the original implementation, all
/// outbound writes (including replies to an inbound PREPARE/ACCEPT) go
/// through the egress pool in `dispatch` below. The ingress pool exists so a
/// future inbound frame on an already-open connection doesn't need a fresh
/// accept.
///
/// A failed `accept` (e.g. the process is out of file descriptors) is
/// logged and the loop continues, matching `ListenForTCPConnections` in the
/// original: one transient accept failure must not take down this peer's
/// participation in the rest of the protocol.
pub async fn listen(
    port: u16,
    ingress: Arc<ConnectionPool>,
    inbound_tx: UnboundedSender<InboundFrame>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening for peer connections on port {port}");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!("accept failed: {error}");
                continue;
            }
        };
        let ip = addr.ip();
        debug!("accepted connection from {ip}");
        let conn = ingress.insert(ip.to_string(), stream).await;
        let inbound_tx = inbound_tx.clone();
        let ingress = Arc::clone(&ingress);
        tokio::spawn(async move {
            read_frames(conn, ip, &ingress, &inbound_tx).await;
        });
    }
}

async fn read_frames(
    conn: crate::pool::Connection,
    remote_ip: IpAddr,
    ingress: &ConnectionPool,
    inbound_tx: &UnboundedSender<InboundFrame>,
) {
    let mut buf = vec![0_u8; READ_BUFFER_BYTES];
    loop {
        let n = {
            let mut stream = conn.lock().await;
            match stream.read(&mut buf).await {
                Ok(0) => {
                    debug!("connection from {remote_ip} closed");
                    break;
                }
                Ok(n) => n,
                Err(error) => {
                    warn!("read error from {remote_ip}: {error}");
                    break;
                }
            }
        };
        let frame = InboundFrame {
            bytes: buf[..n].to_vec(),
            remote_ip,
        };
        if inbound_tx.send(frame).is_err() {
            break;
        }
    }
    ingress.remove(&remote_ip.to_string()).await;
}

/// Decode one inbound frame, resolve its sender's hostname, and call into
/// `paxos.rs`. Malformed frames and unresolvable senders are logged and
/// dropped rather than terminating the loop — a single bad peer must not
/// take down this peer's participation in the rest of the protocol.
fn handle_inbound(state: &mut PeerState, frame: InboundFrame, outbound: &UnboundedSender<OutboundFrame>) {
    let parsed = match codec::decode(&frame.bytes) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!("dropping malformed frame from {}: {error}", frame.remote_ip);
            return;
        }
    };
    let Some(sender) = resolve_sender_hostname(frame.remote_ip) else {
        warn!("dropping frame from unresolvable address {}", frame.remote_ip);
        return;
    };
    dispatch_one(state, parsed, &sender, outbound);
}

/// Send one outbound frame: obtain (dialing if necessary) an egress
/// connection to its recipient and write the raw bytes. A write failure is
/// logged, the connection is dropped so the next send redials, and the
/// frame itself is dropped; per spec.md this protocol has no retry or
/// acknowledgment layer beyond the Paxos messages themselves.
async fn send_outbound(egress: &ConnectionPool, frame: OutboundFrame) {
    let conn = match egress.get(&frame.recipient).await {
        Ok(conn) => conn,
        Err(error) => {
            warn!("could not reach {}: {error}", frame.recipient);
            return;
        }
    };
    let mut stream = conn.lock().await;
    if let Err(error) = stream.write_all(&frame.bytes).await {
        warn!("write to {} failed: {error}", frame.recipient);
        drop(stream);
        egress.remove(&frame.recipient).await;
    }
}

/// The dispatch task: the sole owner of `state` for as long as it runs, and
/// also the sole drainer of the outbound queue — spec.md §5 requires
/// dispatch and send to "share the same single-threaded dispatch to
/// serialize state-machine transitions", so both live in one `select!` loop
/// here rather than on separate tasks.
///
/// If this peer holds a proposer role and `startup_delay` (the `-t` flag) is
/// zero, the opening PREPARE broadcast is sent before the loop starts. If
/// the delay is nonzero, a timer for it is raced against the inbound and
/// outbound queues inside the loop, so this peer keeps answering inbound
/// PREPARE/ACCEPT from other proposers during its own delay window instead
/// of queuing them unanswered until the delay elapses.
pub async fn dispatch(
    mut state: PeerState,
    mut inbound_rx: UnboundedReceiver<InboundFrame>,
    outbound_tx: UnboundedSender<OutboundFrame>,
    mut outbound_rx: UnboundedReceiver<OutboundFrame>,
    egress: Arc<ConnectionPool>,
    startup_delay: std::time::Duration,
) {
    let mut prepare_pending = false;
    if state.is_proposer() {
        if startup_delay.is_zero() {
            paxos::send_prepare(&mut state, &outbound_tx);
        } else {
            info!("delaying prepare phase by {startup_delay:?}");
            prepare_pending = true;
        }
    }

    let sleep = tokio::time::sleep(startup_delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep, if prepare_pending => {
                paxos::send_prepare(&mut state, &outbound_tx);
                prepare_pending = false;
            }
            frame = inbound_rx.recv() => {
                match frame {
                    Some(frame) => handle_inbound(&mut state, frame, &outbound_tx),
                    None => break,
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => send_outbound(&egress, frame).await,
                    None => break,
                }
            }
        }
    }
}

/// `codec::decode` already guarantees `frame.fields` has at least
/// `kind.field_count()` entries, so the indexing below never panics.
fn dispatch_one(state: &mut PeerState, frame: codec::Frame, sender: &str, outbound: &UnboundedSender<OutboundFrame>) {
    let fields = &frame.fields;
    match frame.kind {
        MessageKind::Prepare => {
            paxos::handle_prepare(state, fields[0], fields[1], fields[2], sender, outbound);
        }
        MessageKind::PrepareAck => {
            paxos::handle_prepare_ack(state, fields[0], fields[1], fields[2], outbound);
        }
        MessageKind::Accept => {
            paxos::handle_accept(state, fields[0], fields[1], fields[2], sender, outbound);
        }
        MessageKind::AcceptAck => {
            paxos::handle_accept_ack(state, fields[0], fields[1], outbound);
        }
    }
}

/// Wire together the listener and the combined dispatch/send task, and (if
/// this peer holds a proposer role) start the proposer after `delay`. Runs
/// until the listener errors.
pub async fn run(port: u16, state: PeerState, delay: std::time::Duration) -> std::io::Result<()> {
    let ingress = Arc::new(ConnectionPool::new(PoolRole::Ingress, port));
    let egress = Arc::new(ConnectionPool::new(PoolRole::Egress, port));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let listen_handle = tokio::spawn(listen(port, ingress, inbound_tx));
    let dispatch_handle = tokio::spawn(dispatch(state, inbound_rx, outbound_tx, outbound_rx, egress, delay));

    listen_handle
        .await
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))??;
    dispatch_handle.await.ok();
    Ok(())
}
