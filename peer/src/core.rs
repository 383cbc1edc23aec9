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

use std::cmp::Ordering;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, Notify};

use distmx_proto::LamportClock;

use crate::error::{PeerError, PeerResult};

/// `(lamport_ts, peer_id)`, totally ordered: timestamp first, id as the
/// deterministic tiebreak. Ids are unique within the peer set, so no two
/// fingerprints ever compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub timestamp: i64,
    pub id: i32,
}

impl PartialOrd for Fingerprint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fingerprint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Released,
    Wanted,
    Held,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One inbound request whose reply was postponed. Signaling `token` lets
/// the in-flight `on_request` call complete with an affirmative reply.
struct Deferral {
    requester_id: i32,
    token: oneshot::Sender<()>,
}

struct StateInner {
    state: PeerState,
    current_fingerprint: Option<Fingerprint>,
    deferred: Vec<Deferral>,
}

/// The mutual-exclusion core (D): Lamport clock, request state machine,
/// outstanding-reply set and deferred-reply queue, plus the policy for
/// timestamp comparison and tie-breaking. Shared across the transport's
/// server tasks, fan-out tasks and the workload driver behind an `Arc`.
pub struct Core {
    pub id: i32,
    pub clock: LamportClock,
    state: Mutex<StateInner>,
    outstanding: Mutex<HashSet<SocketAddr>>,
    outstanding_empty: Notify,
}

/// What an inbound `on_request` call should do before it may reply.
pub enum RequestDecision {
    /// Policy permits an immediate affirmative reply.
    Grant,
    /// Reply is postponed until `release_cs()` signals this token.
    Defer(oneshot::Receiver<()>),
}

impl Core {
    pub fn new(id: i32) -> Arc<Self> {
        Arc::new(Self {
            id,
            clock: LamportClock::new(),
            state: Mutex::new(StateInner {
                state: PeerState::Released,
                current_fingerprint: None,
                deferred: Vec::new(),
            }),
            outstanding: Mutex::new(HashSet::new()),
            outstanding_empty: Notify::new(),
        })
    }

    pub async fn state(&self) -> PeerState {
        self.state.lock().await.state
    }

    /// Begins a request cycle: ticks the clock, computes this request's
    /// fingerprint, transitions RELEASED -> WANTED and populates the
    /// outstanding-reply set with every configured peer. Returns the
    /// fingerprint the caller should stamp on the outbound `REQUEST`
    /// emissions, and whether the peer set was empty (in which case the
    /// caller must transition straight to HELD without emitting anything).
    pub async fn begin_request(&self, peers: &[SocketAddr]) -> PeerResult<Fingerprint> {
        let ts = self.clock.tick().await;
        let fingerprint = Fingerprint { timestamp: ts, id: self.id };

        {
            let mut guard = self.state.lock().await;

            if guard.state != PeerState::Released {
                return Err(PeerError::InvariantViolation(format!(
                    "request_cs() called while state = {}",
                    guard.state
                )));
            }

            guard.state = PeerState::Wanted;
            guard.current_fingerprint = Some(fingerprint);

            info!("RELEASED -> WANTED (fingerprint = {:?})", fingerprint);
        }

        let mut outstanding = self.outstanding.lock().await;
        outstanding.clear();
        outstanding.extend(peers.iter().copied());

        Ok(fingerprint)
    }

    /// Waits until the outstanding-reply set is empty, then transitions
    /// WANTED -> HELD. If `peers` was empty when `begin_request` ran, the
    /// set is already empty and this returns immediately.
    pub async fn await_held(&self) {
        loop {
            let notified = self.outstanding_empty.notified();

            if self.outstanding.lock().await.is_empty() {
                break;
            }

            notified.await;
        }

        let mut guard = self.state.lock().await;
        guard.state = PeerState::Held;

        info!("WANTED -> HELD");
    }

    /// Removes `addr` from the outstanding-reply set, whether because an
    /// affirmative reply arrived or because `addr` was declared
    /// unreachable for this cycle. Unblocks `await_held()` once the set
    /// empties.
    pub async fn mark_outstanding_resolved(&self, addr: SocketAddr) {
        let mut outstanding = self.outstanding.lock().await;
        outstanding.remove(&addr);

        if outstanding.is_empty() {
            self.outstanding_empty.notify_waiters();
        }
    }

    /// Transitions HELD -> RELEASED, draining the deferred-reply queue so
    /// every peer this cycle deferred is granted directly. Returns the
    /// timestamp to stamp on the informational `RELEASE` emission.
    pub async fn release(&self) -> PeerResult<i64> {
        let mut guard = self.state.lock().await;

        if guard.state != PeerState::Held {
            return Err(PeerError::InvariantViolation(format!(
                "release_cs() called while state = {}",
                guard.state
            )));
        }

        guard.state = PeerState::Released;
        guard.current_fingerprint = None;

        let drained = guard.deferred.len();
        for deferral in guard.deferred.drain(..) {
            debug!("releasing deferred requester {}", deferral.requester_id);
            let _ = deferral.token.send(());
        }

        drop(guard);

        info!("HELD -> RELEASED (drained {} deferred replies)", drained);

        Ok(self.clock.tick().await)
    }

    /// `on_REQUEST`: observes the incoming timestamp, then decides under
    /// the state lock whether to grant immediately or defer. The caller
    /// MUST await the returned `Defer` receiver with the state lock
    /// already released.
    pub async fn on_request(&self, incoming_id: i32, incoming_ts: i64) -> RequestDecision {
        self.clock.observe(incoming_ts).await;

        let mut guard = self.state.lock().await;

        match guard.state {
            PeerState::Released => {
                debug!("grant immediately to {} (state = RELEASED)", incoming_id);
                RequestDecision::Grant
            }
            PeerState::Held => {
                debug!("defer from {} (state = HELD)", incoming_id);
                RequestDecision::Defer(Self::push_deferral(&mut guard, incoming_id))
            }
            PeerState::Wanted => {
                let mine = guard
                    .current_fingerprint
                    .expect("WANTED state always carries a current fingerprint");
                let theirs = Fingerprint { timestamp: incoming_ts, id: incoming_id };

                if theirs < mine {
                    debug!(
                        "grant immediately to {} (their fingerprint {:?} < ours {:?})",
                        incoming_id, theirs, mine
                    );
                    RequestDecision::Grant
                } else {
                    debug!(
                        "defer from {} (their fingerprint {:?} >= ours {:?})",
                        incoming_id, theirs, mine
                    );
                    RequestDecision::Defer(Self::push_deferral(&mut guard, incoming_id))
                }
            }
        }
    }

    fn push_deferral(guard: &mut StateInner, requester_id: i32) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        guard.deferred.push(Deferral { requester_id, token: tx });
        rx
    }

    /// `on_RELEASE`: advisory. Folds the sender's timestamp into the local
    /// clock; no state transition is required because any peer this
    /// sender deferred was already granted directly via its token.
    pub async fn on_release(&self, incoming_id: i32, incoming_ts: i64) {
        self.clock.observe(incoming_ts).await;

        debug!(
            "observed RELEASE from {} (clock now {})",
            incoming_id,
            self.clock.current().await
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_orders_by_timestamp_then_id() {
        let a = Fingerprint { timestamp: 5, id: 2 };
        let b = Fingerprint { timestamp: 5, id: 1 };
        let c = Fingerprint { timestamp: 4, id: 9 };

        assert!(b < a);
        assert!(c < a);
        assert!(c < b);
    }

    #[tokio::test]
    async fn solo_peer_enters_held_immediately() {
        let core = Core::new(1);

        core.begin_request(&[]).await.unwrap();
        core.await_held().await;

        assert_eq!(core.state().await, PeerState::Held);
    }

    #[tokio::test]
    async fn released_state_grants_immediately() {
        let core = Core::new(1);

        match core.on_request(2, 10).await {
            RequestDecision::Grant => {}
            RequestDecision::Defer(_) => panic!("expected immediate grant"),
        }
    }

    #[tokio::test]
    async fn held_state_defers_and_release_drains_queue() {
        let core = Core::new(1);

        core.begin_request(&[]).await.unwrap();
        core.await_held().await;

        let rx = match core.on_request(2, 10).await {
            RequestDecision::Defer(rx) => rx,
            RequestDecision::Grant => panic!("expected defer while HELD"),
        };

        core.release().await.unwrap();

        // The deferred requester's token is signaled by release().
        rx.await.expect("token should be signaled on release");
    }

    #[tokio::test]
    async fn wanted_state_grants_lower_fingerprint_and_defers_higher() {
        let core = Core::new(5);

        // Own fingerprint will be (1, 5) after the tick in begin_request.
        core.begin_request(&[
            "127.0.0.1:1".parse().unwrap(),
        ])
        .await
        .unwrap();

        // Lower timestamp than ours => grant.
        match core.on_request(1, 1).await {
            RequestDecision::Grant => {}
            RequestDecision::Defer(_) => panic!("lower fingerprint should be granted"),
        }

        // Tie-break: same timestamp as ours (1), lower id (1) should win and be granted
        // since our own id is 5 and fingerprint comparison is (ts, id).
        match core.on_request(1, 1).await {
            RequestDecision::Grant => {}
            RequestDecision::Defer(_) => panic!("tie-broken lower id should be granted"),
        }

        // Higher timestamp than ours => defer.
        match core.on_request(99, 100).await {
            RequestDecision::Defer(_) => {}
            RequestDecision::Grant => panic!("higher fingerprint should be deferred"),
        }
    }

    #[tokio::test]
    async fn release_while_not_held_is_invariant_violation() {
        let core = Core::new(1);

        assert!(matches!(
            core.release().await,
            Err(PeerError::InvariantViolation(_))
        ));
    }
}
