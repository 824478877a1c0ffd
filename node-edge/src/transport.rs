use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;

use crate::dispatcher::DispatchEvent;

/// Reads length-undelimited bytes off the child's socket and splits them into
/// protocol lines, per spec.md §6's framing ("newline-delimited JSON,
/// buffered across partial reads").
///
/// Unlike `AsyncBufReadExt::lines()`, this buffers raw bytes and only
/// validates UTF-8 once a complete line is assembled, matching the original's
/// `buffer += chunk; buffer.split(b"\n")` residual-concatenation behavior
/// (`original_source/_engine.py::_run_listen_remote`) rather than failing a
/// whole read on a line that happens to split a multi-byte character across
/// two TCP segments.
pub(crate) fn spawn_reader(
    mut read_half: OwnedReadHalf,
    events: mpsc::Sender<DispatchEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut residual: Vec<u8> = Vec::new();
        let mut buf = [0u8; 64 * 1024];

        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    residual.extend_from_slice(&buf[..n]);
                    while let Some(pos) = residual.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = residual.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if line.is_empty() {
                            continue;
                        }
                        if dispatch_line(line, &events).await.is_err() {
                            return;
                        }
                    }
                }
                Err(_) => break,
            }
        }

        let _ = events.send(DispatchEvent::PeerClosed).await;
    })
}

async fn dispatch_line(line: &[u8], events: &mpsc::Sender<DispatchEvent>) -> Result<(), ()> {
    let event = match std::str::from_utf8(line) {
        Ok(text) => match node_edge_protocol::decode_line(text) {
            Ok(frame) => DispatchEvent::Remote(frame),
            Err(err) => DispatchEvent::ProtocolError(err.to_string()),
        },
        Err(err) => DispatchEvent::ProtocolError(err.to_string()),
    };
    events.send(event).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        (accepted.unwrap().0, connected.unwrap())
    }

    #[tokio::test]
    async fn assembles_a_line_split_across_two_reads() {
        let (server, mut client) = loopback_pair().await;
        let (read_half, _write_half) = server.into_split();
        let (tx, mut rx) = mpsc::channel(16);

        spawn_reader(read_half, tx);

        let line = r#"{"type":"eval_result","event_id":"1","payload":{"result":{"type":"naive","data":1}}}"#;
        let (first, second) = line.split_at(10);
        client.write_all(first.as_bytes()).await.unwrap();
        client.write_all(second.as_bytes()).await.unwrap();
        client.write_all(b"\n").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DispatchEvent::Remote(_)));
    }

    #[tokio::test]
    async fn peer_disconnect_emits_peer_closed() {
        let (server, client) = loopback_pair().await;
        let (read_half, _write_half) = server.into_split();
        let (tx, mut rx) = mpsc::channel(16);

        spawn_reader(read_half, tx);
        drop(client);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DispatchEvent::PeerClosed));
    }

    #[tokio::test]
    async fn malformed_line_yields_protocol_error_and_keeps_reading() {
        let (server, mut client) = loopback_pair().await;
        let (read_half, _write_half) = server.into_split();
        let (tx, mut rx) = mpsc::channel(16);

        spawn_reader(read_half, tx);

        client.write_all(b"not json\n").await.unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, DispatchEvent::ProtocolError(_)));

        let good = r#"{"type":"eval_result","event_id":"1","payload":{"result":{"type":"naive","data":1}}}"#;
        client
            .write_all(format!("{good}\n").as_bytes())
            .await
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, DispatchEvent::Remote(_)));
    }
}
