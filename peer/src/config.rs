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

use std::net::SocketAddr;

use clap::Parser;

use crate::error::{PeerError, PeerResult};

#[derive(Parser, Debug)]
#[clap(name = "peer", about = "Distributed print-mutex coordinator peer")]
pub struct Opts {
    /// This peer's id. Positive, unique within the configured peer set.
    #[clap(long)]
    pub id: i32,

    /// Local port this peer's MutualExclusionService listens on.
    #[clap(long)]
    pub port: u16,

    /// Printer's PrintingService endpoint, host:port.
    #[clap(long)]
    pub server: String,

    /// Comma-separated host:port list of every other peer. Empty means solo.
    #[clap(long, default_value = "")]
    pub clients: String,
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }

    /// Validates fields clap's type-level parsing can't express: `--id`
    /// must be positive and unique within the peer set (uniqueness is a
    /// cross-process property clap can't check; positivity is checked
    /// here).
    pub fn validate(&self) -> PeerResult<()> {
        if self.id <= 0 {
            return Err(PeerError::InvalidId(self.id));
        }

        Ok(())
    }

    pub fn printer_addr(&self) -> PeerResult<SocketAddr> {
        Ok(self.server.parse()?)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Parses `--clients` into the ordered set of other peers' addresses.
    /// An empty string means solo operation, per the CLI surface's
    /// documented behavior.
    pub fn peer_addrs(&self) -> PeerResult<Vec<SocketAddr>> {
        if self.clients.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.clients
            .split(',')
            .map(|s| s.trim().parse::<SocketAddr>().map_err(PeerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(clients: &str) -> Opts {
        Opts {
            id: 1,
            port: 50052,
            server: "127.0.0.1:50051".to_string(),
            clients: clients.to_string(),
        }
    }

    #[test]
    fn empty_clients_means_solo() {
        assert_eq!(opts("").peer_addrs().unwrap(), Vec::new());
    }

    #[test]
    fn positive_id_validates() {
        assert!(opts("").validate().is_ok());
    }

    #[test]
    fn zero_or_negative_id_is_rejected() {
        let mut zero = opts("");
        zero.id = 0;
        assert!(matches!(zero.validate(), Err(PeerError::InvalidId(0))));

        let mut negative = opts("");
        negative.id = -1;
        assert!(matches!(negative.validate(), Err(PeerError::InvalidId(-1))));
    }

    #[test]
    fn parses_comma_separated_peers() {
        let addrs = opts("127.0.0.1:50053,127.0.0.1:50054")
            .peer_addrs()
            .unwrap();

        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].port(), 50053);
        assert_eq!(addrs[1].port(), 50054);
    }
}
