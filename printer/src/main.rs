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

#[macro_use]
extern crate log;

mod config;
mod error;
mod server;

use std::process::exit;

use config::Opts;

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = Opts::read();

    info!("starting printer on port {}", opts.port);

    if let Err(e) = server::serve(opts.bind_addr()).await {
        error!("failed to bind PrintingService listener: {}", e);
        exit(1);
    }
}
