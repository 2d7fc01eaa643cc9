//! Shared fixtures for the service level tests: recording collaborators
//! and a scripted AG that answers every command the HF writes.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use hfp_hf::{
    AudioLink, DeviceAddress, Discovery, EventSender, HfConfig, HfService, Message, Notification, Result, Role,
    Transport,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const PHONE: DeviceAddress = DeviceAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);

/// Every AG feature bit.
pub const AG_ALL_FEATURES: u32 = 0xFFF;

pub const CIND_TEST: &str = "\r\n+CIND: (\"service\",(0,1)),(\"call\",(0,1)),(\"callsetup\",(0,3)),(\"callheld\",(0,2)),(\"signal\",(0,5)),(\"roam\",(0,1)),(\"battchg\",(0,5))\r\n\r\nOK\r\n";

// ============================================================================
// Recording collaborators
// ============================================================================

/// What the service did to its collaborators.
#[derive(Debug, Default)]
pub struct Log {
    /// AT commands written to the transport, without the trailing CR.
    pub written: Vec<String>,
    /// Other collaborator calls, e.g. `transport connect`, `audio accept 2`.
    pub actions: Vec<String>,
}

#[derive(Clone)]
pub struct Recorder {
    log: Rc<RefCell<Log>>,
}

impl Recorder {
    fn act(&self, action: String) -> Result<()> {
        self.log.borrow_mut().actions.push(action);
        Ok(())
    }
}

impl Transport for Recorder {
    fn connect(&mut self, _: DeviceAddress) -> Result<()> {
        self.act("transport connect".into())
    }

    fn disconnect(&mut self, _: DeviceAddress) -> Result<()> {
        self.act("transport disconnect".into())
    }

    fn write(&mut self, _: DeviceAddress, data: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(data).trim_end_matches('\r').to_string();
        self.log.borrow_mut().written.push(line);
        Ok(())
    }

    fn accept(&mut self, _: DeviceAddress) -> Result<()> {
        self.act("transport accept".into())
    }

    fn reject(&mut self, _: DeviceAddress) -> Result<()> {
        self.act("transport reject".into())
    }
}

impl Discovery for Recorder {
    fn do_discovery(&mut self, _: DeviceAddress, role: Role) -> Result<()> {
        self.act(format!("discovery {:?}", role))
    }
}

impl AudioLink for Recorder {
    fn connect_audio(&mut self, _: DeviceAddress, codec: u8) -> Result<()> {
        self.act(format!("audio connect {}", codec))
    }

    fn accept_audio_connection(&mut self, _: DeviceAddress, codec: u8) -> Result<()> {
        self.act(format!("audio accept {}", codec))
    }

    fn disconnect_audio(&mut self, _: DeviceAddress) -> Result<()> {
        self.act("audio disconnect".into())
    }
}

// ============================================================================
// Scripted AG
// ============================================================================

/// Answers HF commands the way a well behaved phone would.
#[derive(Debug, Clone)]
pub struct FakeAg {
    pub features: u32,
    pub indicator_values: String,
    /// `+CLCC:` arguments reported for `AT+CLCC`.
    pub calls: Vec<String>,
    /// Command prefixes left unanswered.
    pub silent: Vec<String>,
    /// Command prefixes answered with `ERROR`.
    pub rejected: Vec<String>,
    /// Final results for commands outside SLC setup, used before `OK`.
    pub results: VecDeque<String>,
}

impl FakeAg {
    pub fn new(features: u32) -> Self {
        FakeAg {
            features,
            indicator_values: "1,0,0,0,4,0,3".into(),
            calls: Vec::new(),
            silent: Vec::new(),
            rejected: Vec::new(),
            results: VecDeque::new(),
        }
    }

    pub fn reply(&mut self, line: &str) -> Option<String> {
        if self.silent.iter().any(|s| line.starts_with(s.as_str())) {
            return None;
        }
        if self.rejected.iter().any(|s| line.starts_with(s.as_str())) {
            return Some("\r\nERROR\r\n".to_string());
        }
        let reply = if line.starts_with("AT+BRSF=") {
            format!("\r\n+BRSF: {}\r\n\r\nOK\r\n", self.features)
        } else if line == "AT+CIND=?" {
            CIND_TEST.to_string()
        } else if line == "AT+CIND?" {
            format!("\r\n+CIND: {}\r\n\r\nOK\r\n", self.indicator_values)
        } else if line == "AT+CHLD=?" {
            "\r\n+CHLD: (0,1,1x,2,2x,3,4)\r\n\r\nOK\r\n".to_string()
        } else if line == "AT+BIND=?" {
            "\r\n+BIND: (1,2)\r\n\r\nOK\r\n".to_string()
        } else if line == "AT+BIND?" {
            "\r\n+BIND: 1,1\r\n\r\n+BIND: 2,1\r\n\r\nOK\r\n".to_string()
        } else if line == "AT+CLCC" {
            let mut reply: String = self.calls.iter().map(|c| format!("\r\n+CLCC: {}\r\n", c)).collect();
            reply.push_str("\r\nOK\r\n");
            reply
        } else if is_slc_setup(line) {
            "\r\nOK\r\n".to_string()
        } else {
            let result = self.results.pop_front().unwrap_or_else(|| "OK".to_string());
            format!("\r\n{}\r\n", result)
        };
        Some(reply)
    }
}

fn is_slc_setup(line: &str) -> bool {
    ["AT+BAC=", "AT+CMER=", "AT+BIND=", "AT+COPS=3", "AT+BIA=", "AT+CLIP=", "AT+CCWA=", "AT+CMEE="]
        .iter()
        .any(|p| line.starts_with(p))
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub service: HfService,
    pub ag: FakeAg,
    pub notifications: Receiver<Notification>,
    log: Rc<RefCell<Log>>,
    answered: usize,
}

impl Harness {
    pub fn new(ag: FakeAg) -> Self {
        Self::with_config(&HfConfig::default(), ag)
    }

    pub fn with_config(config: &HfConfig, ag: FakeAg) -> Self {
        let log = Rc::new(RefCell::new(Log::default()));
        let recorder = Recorder { log: Rc::clone(&log) };
        let (events, notifications) = EventSender::channel();
        let service = HfService::new(
            config,
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
            Box::new(recorder),
            events,
        )
        .unwrap();
        Harness {
            service,
            ag,
            notifications,
            log,
            answered: 0,
        }
    }

    pub fn written(&self) -> Vec<String> {
        self.log.borrow().written.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.log.borrow().actions.clone()
    }

    pub fn deliver(&mut self, message: Message) {
        self.service.handle(message);
    }

    /// Bytes from the AG outside any command exchange.
    pub fn feed(&mut self, text: &str) {
        self.deliver(Message::TransportData {
            address: PHONE,
            data: text.as_bytes().to_vec(),
        });
    }

    /// Let the AG answer, one command at a time, until nothing is left.
    /// Returns the largest number of unanswered commands seen.
    pub fn pump(&mut self) -> usize {
        let mut most_outstanding = 0;
        loop {
            let next = {
                let log = self.log.borrow();
                most_outstanding = most_outstanding.max(log.written.len() - self.answered);
                log.written.get(self.answered).cloned()
            };
            let Some(line) = next else {
                return most_outstanding;
            };
            self.answered += 1;
            if let Some(reply) = self.ag.reply(&line) {
                self.feed(&reply);
            }
        }
    }

    /// Outgoing connection all the way to an established SLC.
    pub fn connect(&mut self) {
        self.deliver(Message::Connect(PHONE));
        self.deliver(Message::DiscoveryComplete {
            address: PHONE,
            features: None,
        });
        self.deliver(Message::TransportConnected(PHONE));
        self.pump();
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }
}
