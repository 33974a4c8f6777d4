use std::collections::HashMap;

use roomproto::{ClientMsg, Crown, Participant, ServerMsg, User, UserSet};

use crate::crown::CrownState;
use crate::reconnect::Backoff;

pub type ConnId = usize;

/// Outbound side of one room connection. Sending is fire-and-forget.
pub trait Transport: Send {
    /// Returns false when the batch could not be queued.
    fn send(&self, batch: Vec<ClientMsg>) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Socket not open yet (or reconnect pending).
    Connecting,
    /// Socket open, waiting for the server's greeting.
    Handshaking,
    Connected,
    Disconnected,
    /// Reconnect attempts exhausted.
    Failed,
}

/// One managed room connection and our view of that room.
pub struct Conn {
    pub id: ConnId,
    /// The room this connection is meant to sit in; permissions are keyed by it.
    pub room: String,
    pub state: LinkState,
    transport: Option<Box<dyn Transport>>,
    user: Option<User>,
    participant_id: Option<String>,
    crown: Option<Crown>,
    joined: bool,
    ppl: HashMap<String, Participant>,
    /// server clock minus local clock, in ms.
    clock_offset_ms: i64,
    pending_pings: Vec<(u64, Option<String>)>,
    pub crown_state: CrownState,
    pub backoff: Backoff,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("state", &self.state)
            .field("participant_id", &self.participant_id)
            .field("crown", &self.crown)
            .finish_non_exhaustive()
    }
}

impl Conn {
    pub fn new(id: ConnId, room: String) -> Self {
        Self {
            id,
            room,
            state: LinkState::Connecting,
            transport: None,
            user: None,
            participant_id: None,
            crown: None,
            joined: false,
            ppl: HashMap::new(),
            clock_offset_ms: 0,
            pending_pings: Vec::new(),
            crown_state: CrownState::default(),
            backoff: Backoff::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.state = LinkState::Handshaking;
    }

    /// Drops everything learned from the server. Crown suppression survives.
    pub fn detach(&mut self) {
        self.transport = None;
        self.state = LinkState::Disconnected;
        self.participant_id = None;
        self.crown = None;
        self.joined = false;
        self.ppl.clear();
        self.pending_pings.clear();
    }

    pub fn participant_id(&self) -> Option<&str> {
        self.participant_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }

    pub fn crown(&self) -> Option<&Crown> {
        self.crown.as_ref()
    }

    pub fn is_owner(&self) -> bool {
        match (&self.crown, &self.participant_id) {
            (Some(c), Some(me)) => c.participant_id.as_deref() == Some(me.as_str()),
            _ => false,
        }
    }

    /// Whether `p` is us on this connection.
    pub fn is_self(&self, p: &Participant) -> bool {
        self.participant_id.as_deref() == Some(p.id.as_str())
            || self.user_id() == Some(p.user_id.as_str())
    }

    /// Looks a participant up by participant id or user id.
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.ppl
            .get(id)
            .or_else(|| self.ppl.values().find(|p| p.user_id == id))
    }

    pub fn server_now(&self, local_ms: u64) -> u64 {
        local_ms.saturating_add_signed(self.clock_offset_ms)
    }

    /// Folds a server message into the room view. Returns true the first time we land in the
    /// room on this connection.
    pub fn apply(&mut self, msg: &ServerMsg, local_ms: u64) -> bool {
        match msg {
            ServerMsg::Hi { u, t } => {
                self.user = Some(u.clone());
                if let Some(t) = t {
                    self.clock_offset_ms = i64::try_from(*t).unwrap_or(i64::MAX)
                        - i64::try_from(local_ms).unwrap_or(i64::MAX);
                }
                false
            }
            ServerMsg::Ch { ch, ppl, p } => {
                self.crown = ch.crown.clone();
                self.ppl = ppl.iter().map(|p| (p.id.clone(), p.clone())).collect();
                if let Some(p) = p {
                    self.participant_id = Some(p.clone());
                }
                let first = !self.joined;
                self.joined = true;
                first
            }
            ServerMsg::P(p) => {
                self.ppl.insert(p.id.clone(), p.clone());
                false
            }
            ServerMsg::Bye { p } => {
                self.ppl.remove(p);
                false
            }
            ServerMsg::A { .. } | ServerMsg::T { .. } | ServerMsg::Other => false,
        }
    }

    pub fn send(&self, batch: Vec<ClientMsg>) -> bool {
        if batch.is_empty() || !self.is_connected() {
            return false;
        }
        match &self.transport {
            Some(t) => t.send(batch),
            None => false,
        }
    }

    /// Sends chat lines as one batch, threaded under `reply_to` when given.
    pub fn chat<I, S>(&self, reply_to: Option<&str>, lines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = lines
            .into_iter()
            .map(|l| ClientMsg::A {
                message: l.into(),
                reply_to: reply_to.map(str::to_string),
            })
            .collect::<Vec<_>>();
        self.send(batch)
    }

    /// Give the crown to `participant_id`, or drop it with `None`.
    pub fn chown(&self, participant_id: Option<&str>) -> bool {
        self.send(vec![ClientMsg::Chown {
            id: participant_id.map(str::to_string),
        }])
    }

    pub fn set_cursor(&self, x: f64, y: f64) -> bool {
        self.send(vec![ClientMsg::M { x, y }])
    }

    pub fn userset(&self, name: &str, color: &str) -> bool {
        self.send(vec![ClientMsg::Userset {
            set: UserSet {
                name: name.to_string(),
                color: color.to_string(),
            },
        }])
    }

    /// Sends a ping stamped `local_ms`; the echo is matched back in [`Conn::take_ping`].
    pub fn ping(&mut self, local_ms: u64, reply_to: Option<String>) -> bool {
        if !self.send(vec![ClientMsg::T { e: local_ms }]) {
            return false;
        }
        self.pending_pings.push((local_ms, reply_to));
        true
    }

    /// Claims the pending ping stamped `e`, if any.
    pub fn take_ping(&mut self, e: u64) -> Option<Option<String>> {
        let i = self.pending_pings.iter().position(|(sent, _)| *sent == e)?;
        Some(self.pending_pings.remove(i).1)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use roomproto::ClientMsg;

    use super::Transport;

    /// Records every batch instead of sending it.
    #[derive(Clone, Default)]
    pub struct Recorder {
        pub sent: Arc<Mutex<Vec<ClientMsg>>>,
    }

    impl Recorder {
        pub fn take(&self) -> Vec<ClientMsg> {
            std::mem::take(&mut *self.sent.lock().expect("recorder lock"))
        }

        pub fn chats(&self) -> Vec<String> {
            self.take()
                .into_iter()
                .filter_map(|m| match m {
                    ClientMsg::A { message, .. } => Some(message),
                    _ => None,
                })
                .collect()
        }
    }

    impl Transport for Recorder {
        fn send(&self, batch: Vec<ClientMsg>) -> bool {
            self.sent.lock().expect("recorder lock").extend(batch);
            true
        }
    }
}
