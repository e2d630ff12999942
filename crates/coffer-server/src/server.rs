//! The node-facing TCP loop: the receiving end of the command protocol.
//!
//! Every connection is a sequence of framed commands, each answered by one
//! framed reply. Store failures become error replies — the connection stays
//! up; only transport-level trouble tears it down.

use std::io;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use coffer_cluster::{execute_on_store, StoreContext};
use coffer_core::ErrorMessage;
use coffer_protocol::{read_frame, write_frame, Command, Reply};

/// Accepts connections forever, one task per peer.
pub async fn serve(listener: TcpListener, context: StoreContext) -> io::Result<()> {
    let local = listener.local_addr()?;
    info!(%local, "node server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "peer connected");
        let context = context.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(stream, context).await {
                debug!(%peer, %error, "connection closed");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, context: StoreContext) -> io::Result<()> {
    while let Some(frame) = read_frame(&mut stream).await? {
        let body = match Command::decode(&frame) {
            Ok(command) => {
                debug!(command = command.kind(), "executing");
                match execute_on_store(command, &context).await {
                    Ok(reply) => reply.encode(),
                    Err(error) => Reply::encode_error(&error.into_message()),
                }
            }
            Err(decode_error) => {
                warn!(%decode_error, "undecodable command frame");
                Reply::encode_error(&ErrorMessage::bad_request(format!(
                    "undecodable command: {decode_error}"
                )))
            }
        };
        write_frame(&mut stream, &body).await?;
    }
    Ok(())
}
