//! The service loop.
//!
//! The [`HfService`] lives on the loop's task. Transport reads and
//! collaborator completions arrive over a channel, console lines over a
//! second one, and the loop sleeps until the service's next timer when
//! neither has anything.

use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use hfp_hf::{ConnectionState, DeviceAddress, HfConfig, HfService, Intent, Message, Notification, Timestamp};

use crate::console::{ConsoleCommand, HELP};
use crate::error::Result;
use crate::link::TcpLink;
use crate::loopback::{ImmediateDiscovery, LoopbackAudio};

/// One HF connected to one AG.
pub struct Runner {
    service: HfService,
    notifications: Receiver<Notification>,
    inbound: mpsc::UnboundedReceiver<Message>,
    address: DeviceAddress,
    started: Instant,
}

impl Runner {
    /// Build the service with a TCP link to `endpoint` standing in for `address`.
    pub fn new(config: &HfConfig, address: DeviceAddress, endpoint: &str) -> Result<Self> {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let mut link = TcpLink::new(inbound_tx.clone());
        link.add_remote(address, endpoint);

        let (events, notifications) = hfp_hf::EventSender::channel();
        let service = HfService::new(
            config,
            Box::new(link),
            Box::new(ImmediateDiscovery::new(inbound_tx.clone())),
            Box::new(LoopbackAudio::new(inbound_tx)),
            events,
        )?;
        Ok(Runner {
            service,
            notifications,
            inbound,
            address,
            started: Instant::now(),
        })
    }

    /// Connect and serve until the AG goes away or the user quits.
    pub async fn run(self, mut console: mpsc::UnboundedReceiver<String>) -> Result<()> {
        let Runner {
            mut service,
            notifications,
            mut inbound,
            address,
            started,
        } = self;
        let now = || elapsed(started);

        info!("Runner: connecting to {}", address);
        service.connect(address);

        loop {
            if !report(&notifications) {
                info!("Runner: {} disconnected", address);
                return Ok(());
            }
            let wait = service
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.as_millis().saturating_sub(now().as_millis())));

            tokio::select! {
                Some(message) = inbound.recv() => {
                    service.advance_to(now());
                    service.handle(message);
                }
                line = console.recv() => {
                    let Some(line) = line else {
                        info!("Runner: console closed");
                        return Ok(());
                    };
                    service.advance_to(now());
                    match ConsoleCommand::parse(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
                        Ok(Some(command)) => run_command(&mut service, address, command),
                        Ok(None) => {}
                        Err(e) => warn!("Runner: {}", e),
                    }
                }
                _ = sleep(wait) => service.advance_to(now()),
            }
        }
    }
}

fn elapsed(started: Instant) -> Timestamp {
    Timestamp::from_millis(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
}

async fn sleep(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

fn run_command(service: &mut HfService, address: DeviceAddress, command: ConsoleCommand) {
    let result = match command {
        ConsoleCommand::Dial(number) => service.execute(address, Intent::Dial(number)),
        ConsoleCommand::Answer => service.execute(address, Intent::Answer),
        ConsoleCommand::HangUp => service.execute(address, Intent::HangUp),
        ConsoleCommand::Audio(true) => service.connect_audio(address),
        ConsoleCommand::Audio(false) => service.disconnect_audio(address),
        ConsoleCommand::Disconnect => service.disconnect(address),
        ConsoleCommand::Calls => {
            let calls = service.current_calls(address);
            if calls.is_empty() {
                println!("no calls");
            }
            for call in calls {
                println!(
                    "#{} {} {} {}",
                    call.id,
                    call.state,
                    if call.outgoing { "outgoing" } else { "incoming" },
                    call.number
                );
            }
            Ok(())
        }
        ConsoleCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ConsoleCommand::Quit => Ok(()),
    };
    if let Err(e) = result {
        warn!("Runner: {}", e);
    }
}

/// Log pending notifications. Returns `false` once the AG is gone.
fn report(notifications: &Receiver<Notification>) -> bool {
    let mut connected = true;
    for notification in notifications.try_iter() {
        match &notification {
            Notification::ConnectionStateChanged {
                state: ConnectionState::Disconnected,
                ..
            } => connected = false,
            Notification::CallChanged { call, .. } => {
                info!("Runner: call #{} {} {}", call.id, call.state, call.number)
            }
            other => info!("Runner: {:?}", other),
        }
    }
    connected
}
