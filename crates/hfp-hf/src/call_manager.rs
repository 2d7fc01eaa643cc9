//! Call table reconciliation.
//!
//! The AG is the authority on calls. Each `AT+CLCC` reply is staged entry
//! by entry and committed on the closing `OK`; the commit diffs the
//! staged snapshot against the table and reports what changed.

use hfp_at_protocol::ClccEntry;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::types::Timestamp;

/// Call state as reported by `+CLCC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Active,
    Held,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
    ResponseHeld,
    Finished,
}

impl CallState {
    /// Map a `+CLCC` status code.
    pub fn from_clcc_status(status: u8) -> Option<CallState> {
        match status {
            0 => Some(CallState::Active),
            1 => Some(CallState::Held),
            2 => Some(CallState::Dialing),
            3 => Some(CallState::Alerting),
            4 => Some(CallState::Incoming),
            5 => Some(CallState::Waiting),
            6 => Some(CallState::ResponseHeld),
            _ => None,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A call known to the HF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Index assigned by the AG; identity of the call.
    pub id: u16,
    pub state: CallState,
    pub number: String,
    pub uuid: Uuid,
    pub multiparty: bool,
    pub outgoing: bool,
    pub in_band_ring: bool,
    pub created_at: Timestamp,
}

impl Call {
    /// Build a call from a `+CLCC` entry. Non-voice entries yield `None`.
    pub fn from_clcc(entry: &ClccEntry, in_band_ring: bool, now: Timestamp) -> Option<Call> {
        if entry.mode != 0 {
            return None;
        }
        Some(Call {
            id: entry.index,
            state: CallState::from_clcc_status(entry.status)?,
            number: entry.number.clone().unwrap_or_default(),
            uuid: Uuid::new_v4(),
            multiparty: entry.multiparty,
            outgoing: entry.outgoing,
            in_band_ring,
            created_at: now,
        })
    }

    /// Whether two versions of a call differ in anything the AG reports.
    fn differs_from(&self, other: &Call) -> bool {
        self.state != other.state
            || self.number != other.number
            || self.multiparty != other.multiparty
            || self.outgoing != other.outgoing
    }
}

/// One difference produced by [`CallManager::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallChange {
    Added(Call),
    Updated(Call),
    Finished(Call),
}

impl CallChange {
    /// The call after the change.
    pub fn call(&self) -> &Call {
        match self {
            CallChange::Added(call) | CallChange::Updated(call) | CallChange::Finished(call) => call,
        }
    }
}

/// Authoritative call table of one connection.
#[derive(Debug, Default)]
pub struct CallManager {
    calls: BTreeMap<u16, Call>,
    pending: BTreeMap<u16, Call>,
}

impl CallManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(&self, id: u16) -> Option<&Call> {
        self.calls.get(&id)
    }

    /// First call in the given state, in ascending id order.
    pub fn by_state(&self, state: CallState) -> Option<&Call> {
        self.calls.values().find(|c| c.state == state)
    }

    pub fn count_by_state(&self, state: CallState) -> usize {
        self.calls.values().filter(|c| c.state == state).count()
    }

    /// Snapshot of the table in ascending id order.
    pub fn current_calls(&self) -> Vec<Call> {
        self.calls.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Stage one entry of the snapshot being received. A repeated id
    /// replaces the earlier entry.
    pub fn stage(&mut self, call: Call) {
        self.pending.insert(call.id, call);
    }

    /// Drop a partially received snapshot.
    pub fn discard_staged(&mut self) {
        self.pending.clear();
    }

    /// Reconcile the table with the staged snapshot. Afterwards the table
    /// holds exactly the staged ids and nothing is staged.
    pub fn commit(&mut self) -> Vec<CallChange> {
        let pending = std::mem::take(&mut self.pending);
        let mut changes = Vec::new();

        let gone: Vec<u16> = self
            .calls
            .keys()
            .filter(|id| !pending.contains_key(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(mut call) = self.calls.remove(&id) {
                call.state = CallState::Finished;
                changes.push(CallChange::Finished(call));
            }
        }

        for (id, staged) in pending {
            match self.calls.get_mut(&id) {
                Some(existing) => {
                    if existing.differs_from(&staged) {
                        existing.state = staged.state;
                        existing.number = staged.number;
                        existing.multiparty = staged.multiparty;
                        existing.outgoing = staged.outgoing;
                        changes.push(CallChange::Updated(existing.clone()));
                    }
                }
                None => {
                    changes.push(CallChange::Added(staged.clone()));
                    self.calls.insert(id, staged);
                }
            }
        }

        changes
    }

    /// Finish every call, as if an empty snapshot was committed.
    pub fn clear(&mut self) -> Vec<CallChange> {
        self.pending.clear();
        self.commit()
    }
}
