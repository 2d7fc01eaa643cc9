//! Stand-ins for SDP discovery and the SCO audio link.
//!
//! Both complete at once by posting the success message back to the
//! service loop.

use tokio::sync::mpsc;
use tracing::{debug, info};

use hfp_hf::{AudioLink, DeviceAddress, Discovery, HfError, Message, Result, Role};

fn post(inbound: &mpsc::UnboundedSender<Message>, message: Message, error: fn(String) -> HfError) -> Result<()> {
    inbound
        .send(message)
        .map_err(|_| error("service loop has stopped".into()))
}

/// Discovery that always succeeds without reporting SDP features.
pub struct ImmediateDiscovery {
    inbound: mpsc::UnboundedSender<Message>,
}

impl ImmediateDiscovery {
    pub fn new(inbound: mpsc::UnboundedSender<Message>) -> Self {
        ImmediateDiscovery { inbound }
    }
}

impl Discovery for ImmediateDiscovery {
    fn do_discovery(&mut self, address: DeviceAddress, role: Role) -> Result<()> {
        debug!("Discovery[{}]: {:?} discovery", address, role);
        post(
            &self.inbound,
            Message::DiscoveryComplete {
                address,
                features: None,
            },
            HfError::Transport,
        )
    }
}

/// Audio link that connects and disconnects immediately.
pub struct LoopbackAudio {
    inbound: mpsc::UnboundedSender<Message>,
}

impl LoopbackAudio {
    pub fn new(inbound: mpsc::UnboundedSender<Message>) -> Self {
        LoopbackAudio { inbound }
    }
}

impl AudioLink for LoopbackAudio {
    fn connect_audio(&mut self, address: DeviceAddress, codec: u8) -> Result<()> {
        info!("Audio[{}]: opening with codec {}", address, codec);
        post(&self.inbound, Message::AudioConnected(address), HfError::Audio)
    }

    fn accept_audio_connection(&mut self, address: DeviceAddress, codec: u8) -> Result<()> {
        info!("Audio[{}]: accepting with codec {}", address, codec);
        post(&self.inbound, Message::AudioConnected(address), HfError::Audio)
    }

    fn disconnect_audio(&mut self, address: DeviceAddress) -> Result<()> {
        info!("Audio[{}]: closing", address);
        post(&self.inbound, Message::AudioDisconnected(address), HfError::Audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AG: DeviceAddress = DeviceAddress::new([0xAA, 0, 0, 0, 0, 1]);

    #[test]
    fn test_completions_are_posted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut discovery = ImmediateDiscovery::new(tx.clone());
        let mut audio = LoopbackAudio::new(tx);

        discovery.do_discovery(AG, Role::Initiator).unwrap();
        audio.connect_audio(AG, 2).unwrap();
        audio.disconnect_audio(AG).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Message::DiscoveryComplete {
                address: AG,
                features: None
            }
        );
        assert_eq!(rx.try_recv().unwrap(), Message::AudioConnected(AG));
        assert_eq!(rx.try_recv().unwrap(), Message::AudioDisconnected(AG));
    }

    #[test]
    fn test_stopped_loop_is_an_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut audio = LoopbackAudio::new(tx.clone());
        assert!(matches!(audio.connect_audio(AG, 1), Err(HfError::Audio(_))));
        assert!(matches!(audio.disconnect_audio(AG), Err(HfError::Audio(_))));

        let mut discovery = ImmediateDiscovery::new(tx);
        assert!(matches!(
            discovery.do_discovery(AG, Role::Initiator),
            Err(HfError::Transport(_))
        ));
    }
}
