// distmx-proto - wire messages and framing shared by the print-mutex peer
// and printer binaries.
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

use tokio::sync::Mutex;

/// Lamport logical clock, guarded by its own mutex so it can be ticked and
/// observed from every request-servicing, fan-out and driver context
/// without contending with the state machine's lock.
pub struct LamportClock(Mutex<i64>);

impl LamportClock {
    pub fn new() -> Self {
        Self(Mutex::new(0))
    }

    /// Increment the counter and return the new value. Call immediately
    /// before emitting any message.
    pub async fn tick(&self) -> i64 {
        let mut guard = self.0.lock().await;
        *guard += 1;
        *guard
    }

    /// Fold a received timestamp into the counter: `max(local, remote) + 1`.
    /// Call immediately upon receiving any message, before any state
    /// decision that depends on the received timestamp.
    pub async fn observe(&self, remote: i64) -> i64 {
        let mut guard = self.0.lock().await;
        *guard = std::cmp::max(*guard, remote) + 1;
        *guard
    }

    pub async fn current(&self) -> i64 {
        *self.0.lock().await
    }
}

impl Default for LamportClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tick_is_monotonic() {
        let clock = LamportClock::new();

        assert_eq!(clock.tick().await, 1);
        assert_eq!(clock.tick().await, 2);
        assert_eq!(clock.tick().await, 3);
    }

    #[tokio::test]
    async fn observe_takes_the_max_plus_one() {
        let clock = LamportClock::new();

        clock.tick().await; // 1

        // Remote timestamp is ahead of us.
        assert_eq!(clock.observe(10).await, 11);

        // Remote timestamp is behind us now.
        assert_eq!(clock.observe(0).await, 12);
    }
}
