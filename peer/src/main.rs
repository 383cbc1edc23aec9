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

#[macro_use]
extern crate log;

mod config;
mod core;
mod error;
mod transport;
mod workload;

use std::process::exit;

use config::Opts;
use transport::Transport;

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = Opts::read();

    if let Err(e) = opts.validate() {
        error!("invalid configuration: {}", e);
        exit(1);
    }

    let printer_addr = match opts.printer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid --server address: {}", e);
            exit(1);
        }
    };

    let peers = match opts.peer_addrs() {
        Ok(peers) => peers,
        Err(e) => {
            error!("invalid --clients list: {}", e);
            exit(1);
        }
    };

    info!(
        "starting peer {} on port {} with {} configured peer(s)",
        opts.id,
        opts.port,
        peers.len()
    );

    let core = self::core::Core::new(opts.id);
    let transport = Transport::new(core, peers, printer_addr);

    let listener = match Transport::bind(opts.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind MutualExclusionService listener: {}", e);
            exit(1);
        }
    };

    let server = {
        let transport = transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.serve(listener).await {
                error!("transport server failed: {}", e);
                exit(1);
            }
        })
    };

    // The listener above is already bound and accepting, so the driver
    // may start issuing requests now, per this peer's startup order.
    let driver = tokio::spawn(workload::run(transport));

    tokio::select! {
        _ = server => {}
        _ = driver => {}
    }
}
