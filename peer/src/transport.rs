// distmx-peer - a print-mutex coordinator peer speaking Ricart-Agrawala
// over Lamport timestamps.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::sink::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use distmx_proto::{
    AccessRelease, AccessRequest, AccessResponse, Header, MessageCodec, PrintRequest,
    PrintResponse, ReleaseAck, Variant,
};

use crate::core::{Core, RequestDecision};
use crate::error::{PeerError, PeerResult};

/// Per-attempt deadline for every outbound RPC, per the default specified
/// for the mutual-exclusion core's fan-out and the printer call alike.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

type Conn = Framed<TcpStream, MessageCodec>;

/// One lazily-created, reused `TcpStream` per target address, guarded by
/// its own mutex so that calls to distinct addresses never contend with
/// each other. No pooling beyond that single connection, matching the
/// transport's documented client-side contract.
#[derive(Default)]
struct ClientPool {
    connections: Mutex<HashMap<SocketAddr, Arc<Mutex<Option<Conn>>>>>,
}

impl ClientPool {
    fn new() -> Self {
        Self::default()
    }

    /// Returns this address's connection slot, creating it if this is the
    /// first call to `addr`. The outer map lock is held only long enough
    /// to look up or insert the slot, never across the RPC itself, so a
    /// slow or deferred call to one peer cannot block calls to another.
    async fn slot(&self, addr: SocketAddr) -> Arc<Mutex<Option<Conn>>> {
        self.connections
            .lock()
            .await
            .entry(addr)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn call<Req, Resp>(
        &self,
        addr: SocketAddr,
        request: Req,
        decode: impl Fn(&[u8]) -> PeerResult<Resp>,
    ) -> PeerResult<Resp>
    where
        Req: Into<bytes::Bytes>,
    {
        let slot = self.slot(addr).await;
        let result = timeout(RPC_TIMEOUT, Self::call_inner(&slot, addr, request, &decode)).await;

        match result {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => {
                *slot.lock().await = None;
                Err(e)
            }
            Err(_) => {
                *slot.lock().await = None;
                Err(PeerError::Unreachable(addr, "timed out".to_string()))
            }
        }
    }

    async fn call_inner<Req, Resp>(
        slot: &Mutex<Option<Conn>>,
        addr: SocketAddr,
        request: Req,
        decode: &impl Fn(&[u8]) -> PeerResult<Resp>,
    ) -> PeerResult<Resp>
    where
        Req: Into<bytes::Bytes>,
    {
        let mut conn = slot.lock().await;

        if conn.is_none() {
            let stream = TcpStream::connect(addr).await?;
            *conn = Some(Framed::new(stream, MessageCodec::new()));
        }

        let framed = conn.as_mut().expect("just inserted above");

        framed.send(request.into()).await?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| PeerError::Unreachable(addr, "connection closed".to_string()))??;

        decode(&frame)
    }
}

/// The peer transport (C): terminates the `MutualExclusionService` server
/// endpoint, dispatches inbound calls into the core, and fans a single
/// outbound RPC out to every configured peer in parallel.
pub struct Transport {
    pub core: Arc<Core>,
    peers: Vec<SocketAddr>,
    printer_addr: SocketAddr,
    clients: ClientPool,
    printer_client: ClientPool,
}

impl Transport {
    pub fn new(core: Arc<Core>, peers: Vec<SocketAddr>, printer_addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            core,
            peers,
            printer_addr,
            clients: ClientPool::new(),
            printer_client: ClientPool::new(),
        })
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Binds the `MutualExclusionService` listener. Split from `serve` so
    /// the workload driver can be started only once the listener is
    /// actually accepting, per this peer's documented startup order.
    pub async fn bind(bind_addr: SocketAddr) -> PeerResult<TcpListener> {
        let listener = TcpListener::bind(bind_addr).await?;

        info!("MutualExclusionService listening on {}", bind_addr);

        Ok(listener)
    }

    /// Serves inbound calls on an already-bound listener until shutdown.
    /// Each accepted connection is handled on its own spawned task so
    /// that a call blocked inside the core awaiting a deferral token
    /// never stalls any other inbound call.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> PeerResult<()> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, stopping server");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    debug!("peer connected (addr = {})", addr);

                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(stream).await {
                            warn!("connection handler error (addr = {}): {}", addr, e);
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> PeerResult<()> {
        let mut conn = Framed::new(stream, MessageCodec::new());

        while let Some(frame) = conn.next().await {
            let frame = frame?;
            let (body, header) = Header::parse(&frame).map_err(|_| malformed())?;

            match header.variant {
                Variant::AccessRequest => {
                    let (_, req) = AccessRequest::parse(body).map_err(|_| malformed())?;

                    let response = self.respond_to_request(req).await;
                    conn.send(response.to_bytes()).await?;
                }
                Variant::AccessRelease => {
                    let (_, rel) = AccessRelease::parse(body).map_err(|_| malformed())?;

                    self.core.on_release(rel.client_id, rel.lamport_timestamp).await;
                    conn.send(ReleaseAck.to_bytes()).await?;
                }
                other => {
                    warn!("unexpected inbound variant on peer listener: {}", other);
                }
            }
        }

        Ok(())
    }

    async fn respond_to_request(&self, req: AccessRequest) -> AccessResponse {
        match self.core.on_request(req.client_id, req.lamport_timestamp).await {
            RequestDecision::Grant => {}
            RequestDecision::Defer(rx) => {
                let _ = rx.await;
            }
        }

        let ts = self.core.clock.tick().await;

        AccessResponse {
            access_granted: true,
            lamport_timestamp: ts,
            responder_id: self.core.id,
        }
    }

    /// Fans `AccessRequest(id, ts)` out to every configured peer in
    /// parallel. Each target that replies or is declared unreachable is
    /// removed from the core's outstanding-reply set.
    pub async fn fan_out_request(&self, ts: i64, request_number: i32) {
        let tasks = self.peers.iter().copied().map(|addr| {
            let request = AccessRequest {
                client_id: self.core.id,
                lamport_timestamp: ts,
                request_number,
            };

            async move {
                match self.clients.call(addr, request.to_bytes(), decode_access_response).await {
                    Ok(resp) => {
                        self.core.clock.observe(resp.lamport_timestamp).await;
                        debug!("received reply from {}", addr);
                    }
                    Err(e) => {
                        warn!("peer {} unreachable, treating as granted: {}", addr, e);
                    }
                }

                self.core.mark_outstanding_resolved(addr).await;
            }
        });

        join_all(tasks).await;
    }

    /// Emits the informational `RELEASE` message to every configured
    /// peer. Fire-and-forget: correctness never depends on these replies
    /// arriving, only the deferred-reply tokens already signaled by
    /// `release_cs()` do.
    pub fn emit_release(self: &Arc<Self>, ts: i64) {
        for addr in self.peers.iter().copied() {
            let this = self.clone();
            let release = AccessRelease { client_id: this.core.id, lamport_timestamp: ts };

            tokio::spawn(async move {
                if let Err(e) = this
                    .clients
                    .call(addr, release.to_bytes(), decode_release_ack)
                    .await
                {
                    warn!("peer {} unreachable for RELEASE: {}", addr, e);
                }
            });
        }
    }

    /// Calls the printer's `SendToPrinter` RPC while the core is HELD.
    pub async fn print(&self, request: PrintRequest) -> PeerResult<PrintResponse> {
        self.printer_client
            .call(self.printer_addr, request.to_bytes(), decode_print_response)
            .await
    }
}

fn malformed() -> PeerError {
    PeerError::from(distmx_proto::ProtoError::MalformedFrame)
}

fn decode_access_response(frame: &[u8]) -> PeerResult<AccessResponse> {
    let (body, header) = Header::parse(frame).map_err(|_| malformed())?;

    if header.variant != Variant::AccessResponse {
        return Err(malformed());
    }

    let (_, resp) = AccessResponse::parse(body).map_err(|_| malformed())?;

    Ok(resp)
}

fn decode_release_ack(frame: &[u8]) -> PeerResult<ReleaseAck> {
    let (_, header) = Header::parse(frame).map_err(|_| malformed())?;

    if header.variant != Variant::ReleaseAck {
        return Err(malformed());
    }

    Ok(ReleaseAck)
}

fn decode_print_response(frame: &[u8]) -> PeerResult<PrintResponse> {
    let (body, header) = Header::parse(frame).map_err(|_| malformed())?;

    if header.variant != Variant::PrintResponse {
        return Err(malformed());
    }

    let (_, resp) = PrintResponse::parse(body).map_err(|_| malformed())?;

    Ok(resp)
}
