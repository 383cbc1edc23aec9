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

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use distmx_proto::PrintRequest;

use crate::transport::Transport;

/// The workload driver (W): periodically requests the critical section,
/// invokes the printer while holding it, and releases. Runs until process
/// shutdown; never calls the printer except while the core reports HELD.
pub async fn run(transport: Arc<Transport>) {
    let mut request_number = 0i32;

    loop {
        let sleep_secs = rand::thread_rng().gen_range(2.0..=8.0);
        sleep(Duration::from_secs_f64(sleep_secs)).await;

        request_number += 1;

        let fingerprint = transport
            .core
            .begin_request(transport.peers())
            .await
            .expect("request_cs() precondition violated: driver only calls it from RELEASED");

        if !transport.peers().is_empty() {
            transport
                .fan_out_request(fingerprint.timestamp, request_number)
                .await;
        }

        transport.core.await_held().await;

        if let Err(e) = print_once(&transport, request_number).await {
            warn!("print iteration {} failed: {}", request_number, e);
        }

        match transport.core.release().await {
            Ok(ts) => transport.emit_release(ts),
            Err(e) => {
                error!("invariant violation releasing critical section: {}", e);
                panic!("invariant violation: {}", e);
            }
        }
    }
}

async fn print_once(
    transport: &Arc<Transport>,
    request_number: i32,
) -> crate::error::PeerResult<()> {
    let ts = transport.core.clock.tick().await;

    let request = PrintRequest {
        client_id: transport.core.id,
        message: format!(
            "message {} from client {}",
            request_number, transport.core.id
        ),
        lamport_timestamp: ts,
    };

    let response = transport.print(request).await?;

    transport.core.clock.observe(response.lamport_timestamp).await;

    if !response.success {
        return Err(crate::error::PeerError::PrinterFailed(
            response.confirmation_message,
        ));
    }

    info!(
        "printed message {} (confirmation = {})",
        request_number, response.confirmation_message
    );

    Ok(())
}
