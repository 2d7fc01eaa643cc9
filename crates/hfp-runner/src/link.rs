//! RFCOMM emulation over TCP.
//!
//! Each AG is reached at a `host:port`. A connection is served by one task
//! that forwards received bytes to the service as
//! [`Message::TransportData`] and writes whatever the service queues.

use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hfp_hf::{DeviceAddress, HfError, Message, Result, Transport};

/// Size of a single read from the socket.
const READ_BUFFER_SIZE: usize = 1024;

/// Instruction for a connection task.
#[derive(Debug)]
enum LinkCommand {
    Data(Vec<u8>),
    Close,
}

/// [`Transport`] backed by TCP sockets.
pub struct TcpLink {
    /// Where each known AG listens.
    remotes: HashMap<DeviceAddress, String>,
    /// Write side of every open connection.
    connections: HashMap<DeviceAddress, mpsc::UnboundedSender<LinkCommand>>,
    /// Completions back to the service loop.
    inbound: mpsc::UnboundedSender<Message>,
}

impl TcpLink {
    pub fn new(inbound: mpsc::UnboundedSender<Message>) -> Self {
        TcpLink {
            remotes: HashMap::new(),
            connections: HashMap::new(),
            inbound,
        }
    }

    /// Make an AG reachable at `endpoint`.
    pub fn add_remote(&mut self, address: DeviceAddress, endpoint: impl Into<String>) {
        self.remotes.insert(address, endpoint.into());
    }
}

impl Transport for TcpLink {
    fn connect(&mut self, address: DeviceAddress) -> Result<()> {
        let endpoint = self
            .remotes
            .get(&address)
            .cloned()
            .ok_or_else(|| HfError::Transport(format!("no endpoint for {}", address)))?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(address, tx);
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            run_connection(address, endpoint, rx, inbound).await;
        });
        Ok(())
    }

    fn disconnect(&mut self, address: DeviceAddress) -> Result<()> {
        let tx = self
            .connections
            .remove(&address)
            .ok_or(HfError::NotConnected(address))?;
        tx.send(LinkCommand::Close)
            .map_err(|_| HfError::Transport(format!("link to {} already closed", address)))
    }

    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> Result<()> {
        let tx = self
            .connections
            .get(&address)
            .ok_or(HfError::NotConnected(address))?;
        tx.send(LinkCommand::Data(data.to_vec()))
            .map_err(|_| HfError::Transport(format!("link to {} closed", address)))
    }

    fn accept(&mut self, address: DeviceAddress) -> Result<()> {
        Err(HfError::Transport(format!(
            "inbound connection from {} not supported over TCP",
            address
        )))
    }

    fn reject(&mut self, address: DeviceAddress) -> Result<()> {
        debug!("TcpLink[{}]: inbound connection refused", address);
        Ok(())
    }
}

/// Serve one connection until either side closes it.
async fn run_connection(
    address: DeviceAddress,
    endpoint: String,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    inbound: mpsc::UnboundedSender<Message>,
) {
    let mut stream = match TcpStream::connect(&endpoint).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("TcpLink[{}]: connect to {} failed: {}", address, endpoint, e);
            let _ = inbound.send(Message::TransportConnectFailed(address));
            return;
        }
    };
    info!("TcpLink[{}]: connected to {}", address, endpoint);
    let _ = inbound.send(Message::TransportConnected(address));

    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            read = reader.read(&mut read_buf) => match read {
                Ok(0) => {
                    debug!("TcpLink[{}]: closed by remote", address);
                    break;
                }
                Ok(n) => {
                    let data = read_buf[..n].to_vec();
                    if inbound.send(Message::TransportData { address, data }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("TcpLink[{}]: read failed: {}", address, e);
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(LinkCommand::Data(data)) => {
                    if let Err(e) = writer.write_all(&data).await {
                        warn!("TcpLink[{}]: write failed: {}", address, e);
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = writer.shutdown().await;
                    break;
                }
            },
        }
    }

    info!("TcpLink[{}]: disconnected", address);
    let _ = inbound.send(Message::TransportDisconnected(address));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    const AG: DeviceAddress = DeviceAddress::new([0xAA, 0, 0, 0, 0, 1]);

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = TcpLink::new(tx);
        link.add_remote(AG, endpoint);

        link.connect(AG).unwrap();
        let (socket, _) = listener.accept().await.unwrap();
        assert_eq!(rx.recv().await, Some(Message::TransportConnected(AG)));

        link.write(AG, b"AT+BRSF=1023\r").unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half);
        let mut received = Vec::new();
        lines.read_until(b'\r', &mut received).await.unwrap();
        assert_eq!(received, b"AT+BRSF=1023\r");

        write_half.write_all(b"\r\nOK\r\n").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Message::TransportData {
                address: AG,
                data: b"\r\nOK\r\n".to_vec(),
            })
        );

        link.disconnect(AG).unwrap();
        assert_eq!(rx.recv().await, Some(Message::TransportDisconnected(AG)));
    }

    #[tokio::test]
    async fn test_unknown_remote_is_refused() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut link = TcpLink::new(tx);
        assert!(link.connect(AG).is_err());
        assert!(matches!(link.write(AG, b"AT\r"), Err(HfError::NotConnected(_))));
    }
}
