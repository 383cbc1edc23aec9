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
use std::time::Duration;

use futures::sink::SinkExt;
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use distmx_proto::{Header, MessageCodec, PrintRequest, PrintResponse, Variant};

use crate::error::{PrinterError, PrinterResult};

/// Terminates `PrintingService` and accepts connections until shutdown.
/// Deliberately does not serialize access across connections: the
/// protocol this sink guards only ever has one peer connected at a time
/// when it is behaving correctly, and letting overlapping prints through
/// unserialized is how a mutual-exclusion violation surfaces as
/// overlapping delay windows in the output.
pub async fn serve(bind_addr: SocketAddr) -> PrinterResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;

    info!("PrintingService listening on {}", bind_addr);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping printer");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                debug!("peer connected (addr = {})", addr);

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream).await {
                        warn!("connection handler error (addr = {}): {}", addr, e);
                    }
                });
            }
        }
    }
}

async fn handle_connection(stream: TcpStream) -> PrinterResult<()> {
    let mut conn = Framed::new(stream, MessageCodec::new());

    while let Some(frame) = conn.next().await {
        let frame = frame?;
        let (body, header) = Header::parse(&frame).map_err(|_| PrinterError::from(
            distmx_proto::ProtoError::MalformedFrame,
        ))?;

        if header.variant != Variant::PrintRequest {
            warn!("unexpected inbound variant on printer listener: {}", header.variant);
            continue;
        }

        let (_, request) = PrintRequest::parse(body).map_err(|_| {
            PrinterError::from(distmx_proto::ProtoError::MalformedFrame)
        })?;

        let response = accept_print(request).await;
        conn.send(response.to_bytes()).await?;
    }

    Ok(())
}

/// Accepts a print request, emits the required output line, sleeps
/// uniformly in `[2.0, 3.0]` seconds, and acknowledges the request.
async fn accept_print(request: PrintRequest) -> PrintResponse {
    println!(
        "[TS: {}] CLIENT {}: {}",
        request.lamport_timestamp, request.client_id, request.message
    );

    let delay = rand::thread_rng().gen_range(2.0..=3.0);
    sleep(Duration::from_secs_f64(delay)).await;

    PrintResponse {
        success: true,
        confirmation_message: "ok".to_string(),
        lamport_timestamp: request.lamport_timestamp,
    }
}
