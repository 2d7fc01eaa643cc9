//! Full session against a scripted AG listening on a local socket.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use hfp_hf::{DeviceAddress, HfConfig};
use hfp_runner::Runner;

const AG: DeviceAddress = DeviceAddress::new([0xAA, 0, 0, 0, 0, 1]);

const CIND_TEST: &str = "\r\n+CIND: (\"service\",(0,1)),(\"call\",(0,1)),(\"callsetup\",(0,3))\r\n\r\nOK\r\n";

fn reply(command: &str) -> String {
    match command {
        c if c.starts_with("AT+BRSF=") => "\r\n+BRSF: 0\r\n\r\nOK\r\n".to_string(),
        "AT+CIND=?" => CIND_TEST.to_string(),
        "AT+CIND?" => "\r\n+CIND: 1,0,0\r\n\r\nOK\r\n".to_string(),
        _ => "\r\nOK\r\n".to_string(),
    }
}

/// Answer until the HF finishes post-SLC setup, then hang up.
async fn serve(mut socket: TcpStream) -> Vec<String> {
    let mut received = Vec::new();
    let mut pending = String::new();
    let mut buf = [0u8; 256];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return received;
        }
        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
        while let Some(end) = pending.find('\r') {
            let command: String = pending.drain(..=end).collect();
            let command = command.trim_end_matches('\r').to_string();
            socket.write_all(reply(&command).as_bytes()).await.unwrap();
            let done = command == "AT+CMEE=1";
            received.push(command);
            if done {
                return received;
            }
        }
    }
}

#[tokio::test]
async fn test_session_runs_until_ag_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    let ag = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        serve(socket).await
    });

    let runner = Runner::new(&HfConfig::default(), AG, &endpoint).unwrap();
    let (_console_tx, console) = mpsc::unbounded_channel();
    tokio::time::timeout(Duration::from_secs(10), runner.run(console))
        .await
        .expect("runner did not stop after the AG hung up")
        .unwrap();

    let received = ag.await.unwrap();
    assert_eq!(
        &received[..4],
        &["AT+BRSF=1023", "AT+CIND=?", "AT+CIND?", "AT+CMER=3,0,0,1"]
    );
    assert_eq!(received[4], "AT+COPS=3,0");
    assert_eq!(received.last().map(String::as_str), Some("AT+CMEE=1"));
}

#[tokio::test]
async fn test_unreachable_ag_stops_the_runner() {
    // Bind then drop to get a port nobody listens on.
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let runner = Runner::new(&HfConfig::default(), AG, &endpoint).unwrap();
    let (_console_tx, console) = mpsc::unbounded_channel();
    tokio::time::timeout(Duration::from_secs(10), runner.run(console))
        .await
        .expect("runner kept waiting for an unreachable AG")
        .unwrap();
}
