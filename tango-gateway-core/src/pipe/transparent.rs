//! Transparent pipe (`spec.md` §4.4): an undifferentiated byte relay
//! between two already-connected TCP endpoints, used by every dynamic
//! forwarder once a client has connected to its advertised local port.

use tokio::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub async fn transparent_pipe(mut a: TcpStream, mut b: TcpStream) -> io::Result<()> {
    io::copy_bidirectional(&mut a, &mut b).await?;
    let _ = a.shutdown().await;
    let _ = b.shutdown().await;
    Ok(())
}
