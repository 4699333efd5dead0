//! Scripted line-based server for exercising folders over a real socket.

#![allow(clippy::unwrap_used)]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Binds a local listener and serves one connection.
///
/// The greeting is sent first. Each step then waits for one client line,
/// asserts it equals the expected command, and writes the reply verbatim.
/// The connection is dropped once the script runs out.
pub(super) async fn serve(
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(greeting.as_bytes()).await.unwrap();
        for (expected, reply) in script {
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, expected);
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
    });
    (port, server)
}
