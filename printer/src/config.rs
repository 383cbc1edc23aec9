// distmx-printer - the sequential FIFO print sink guarded by the peers'
// mutual-exclusion protocol.
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

#[derive(Parser, Debug)]
#[clap(name = "printer", about = "Sequential FIFO print sink")]
pub struct Opts {
    /// Local port the PrintingService listens on.
    #[clap(long, default_value = "50051")]
    pub port: u16,
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
