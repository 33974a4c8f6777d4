//! The single owner of all mutable bot state.
//!
//! Socket and timer tasks never touch state themselves; they forward [`Event`]s over one
//! channel and the event loop feeds them to [`Keeper::handle`] in arrival order.

use std::time::Duration;

use roomproto::{Participant, ServerMsg};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::Registry;
use crate::config::KeeperConfig;
use crate::conn::{Conn, ConnId, LinkState, Transport};
use crate::crown::Verdict;
use crate::cursor;
use crate::loops::{LoopKind, Loops};
use crate::reply::{FAILURE, SUCCESS};
use crate::router::{self, Outcome, Session};
use crate::store::PermissionStore;

pub const EVENT_QUEUE: usize = 4096;

pub enum Event {
    /// Socket is up and the handshake has been sent.
    Opened {
        conn: ConnId,
        transport: Box<dyn Transport>,
    },
    Server {
        conn: ConnId,
        msg: ServerMsg,
    },
    /// Socket closed or never opened.
    Closed {
        conn: ConnId,
        reason: String,
    },
    Tick(LoopKind),
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Opened { conn, .. } => f.debug_struct("Opened").field("conn", conn).finish(),
            Event::Server { conn, msg } => f
                .debug_struct("Server")
                .field("conn", conn)
                .field("msg", msg)
                .finish(),
            Event::Closed { conn, reason } => f
                .debug_struct("Closed")
                .field("conn", conn)
                .field("reason", reason)
                .finish(),
            Event::Tick(kind) => f.debug_tuple("Tick").field(kind).finish(),
        }
    }
}

/// What the event loop should do about a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    After(ConnId, Duration),
    Abandon(ConnId),
}

#[derive(Debug)]
pub struct Keeper {
    cfg: KeeperConfig,
    store: PermissionStore,
    registry: Registry,
    conns: Vec<Conn>,
    loops: Loops,
    connected: usize,
    started_ms: u64,
}

impl Keeper {
    /// One connection per room, in order; a room's `ConnId` is its index.
    pub fn new(
        cfg: KeeperConfig,
        store: PermissionStore,
        rooms: &[String],
        events: mpsc::Sender<Event>,
        now_ms: u64,
    ) -> Self {
        let registry = Registry::builtin(cfg.prefix.clone());
        let conns = rooms
            .iter()
            .enumerate()
            .map(|(id, room)| Conn::new(id, room.clone()))
            .collect();
        Self {
            cfg,
            store,
            registry,
            conns,
            loops: Loops::new(events),
            connected: 0,
            started_ms: now_ms,
        }
    }

    pub fn conn(&self, id: ConnId) -> Option<&Conn> {
        self.conns.get(id)
    }

    pub fn store(&self) -> &PermissionStore {
        &self.store
    }

    pub fn loops(&self) -> &Loops {
        &self.loops
    }

    pub fn connected(&self) -> usize {
        self.connected
    }

    /// True once every connection has given up.
    pub fn all_failed(&self) -> bool {
        self.conns.iter().all(|c| c.state == LinkState::Failed)
    }

    /// Marks a connection as dialing again after its backoff delay.
    pub fn redialing(&mut self, id: ConnId) {
        if let Some(c) = self.conns.get_mut(id) {
            c.state = LinkState::Connecting;
        }
    }

    pub fn handle(&mut self, ev: Event, now_ms: u64) -> Option<Reconnect> {
        match ev {
            Event::Opened { conn, transport } => {
                if let Some(c) = self.conns.get_mut(conn) {
                    c.attach(transport);
                    debug!(room = %c.room, "socket open, waiting for hi");
                }
                None
            }
            Event::Server { conn, msg } => {
                self.on_server(conn, msg, now_ms);
                None
            }
            Event::Closed { conn, reason } => self.on_closed(conn, &reason),
            Event::Tick(kind) => {
                self.on_tick(kind, now_ms);
                None
            }
        }
    }

    fn on_server(&mut self, id: ConnId, msg: ServerMsg, now_ms: u64) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        let first_join = conn.apply(&msg, now_ms);

        match msg {
            ServerMsg::Hi { .. } => self.on_hi(id),
            ServerMsg::Ch { .. } if first_join => self.on_joined(id),
            ServerMsg::A { a, p, id: msg_id } => self.on_chat(id, &a, &p, msg_id.as_deref(), now_ms),
            ServerMsg::T { e: Some(e), .. } => {
                if let Some(reply_to) = conn.take_ping(e) {
                    let ms = now_ms.saturating_sub(e);
                    conn.chat(reply_to.as_deref(), [format!("{SUCCESS}Pong! `[{ms}ms]`")]);
                }
            }
            _ => {}
        }
    }

    fn on_hi(&mut self, id: ConnId) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if conn.is_connected() {
            return;
        }
        conn.state = LinkState::Connected;
        conn.backoff.reset();
        conn.userset(&self.cfg.display_name(), &self.cfg.color);
        if self.cfg.announce {
            conn.chat(None, [format!("{SUCCESS}Connected!")]);
        }
        info!(room = %conn.room, conn = id + 1, "connected");

        self.connected += 1;
        if self.connected == 1 {
            self.loops.start_all();
        }
    }

    fn on_joined(&mut self, id: ConnId) {
        let Some(owner) = self.cfg.seed_owner.as_deref() else {
            return;
        };
        let Some(conn) = self.conns.get(id) else {
            return;
        };
        match self.store.seed_room_owner(&conn.room, owner) {
            Ok(true) => info!(room = %conn.room, owner, "seeded room owner"),
            Ok(false) => {}
            Err(e) => warn!(room = %conn.room, err = %format!("{e:#}"), "failed to seed room owner"),
        }
    }

    fn on_chat(
        &mut self,
        id: ConnId,
        text: &str,
        author: &Participant,
        msg_id: Option<&str>,
        now_ms: u64,
    ) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if self.cfg.log_chat {
            info!(room = %conn.room, from = %author.name, "{text}");
        }

        let mut s = Session {
            cfg: &self.cfg,
            registry: &self.registry,
            store: &mut self.store,
            conn,
            author,
            msg_id,
            now_ms,
        };
        match router::dispatch(&mut s, text) {
            Ok(Outcome::Ran) => debug!(room = %s.conn.room, from = %author.user_id, "command ran"),
            Ok(_) => {}
            Err(e) => {
                warn!(
                    room = %s.conn.room,
                    from = %author.user_id,
                    err = %format!("{e:#}"),
                    "command failed"
                );
                s.reply([format!(
                    "{FAILURE}Something went wrong while running that command."
                )]);
            }
        }
    }

    fn on_closed(&mut self, id: ConnId, reason: &str) -> Option<Reconnect> {
        let conn = self.conns.get_mut(id)?;
        let was_connected = conn.is_connected();
        conn.detach();
        info!(room = %conn.room, conn = id + 1, reason, "disconnected");

        if was_connected {
            self.connected = self.connected.saturating_sub(1);
            if self.connected == 0 {
                self.loops.stop_all();
            }
        }

        match conn.backoff.next_delay() {
            Some(delay) => {
                debug!(room = %conn.room, attempt = conn.backoff.failures(), ?delay, "reconnect scheduled");
                Some(Reconnect::After(id, delay))
            }
            None => {
                conn.state = LinkState::Failed;
                warn!(room = %conn.room, attempts = conn.backoff.failures() - 1, "giving up on room");
                Some(Reconnect::Abandon(id))
            }
        }
    }

    fn on_tick(&mut self, kind: LoopKind, now_ms: u64) {
        match kind {
            LoopKind::CrownReclaim => {
                for conn in self.conns.iter_mut().filter(|c| c.is_connected()) {
                    let Some(me) = conn.participant_id().map(str::to_string) else {
                        continue;
                    };
                    let crown = conn.crown().cloned();
                    let server_now = conn.server_now(now_ms);
                    if conn.crown_state.tick(crown.as_ref(), server_now, now_ms) == Verdict::Claim {
                        info!(room = %conn.room, "claiming vacant crown");
                        conn.chown(Some(me.as_str()));
                    }
                }
            }
            LoopKind::Cursor => {
                let (x, y) = cursor::position(now_ms.saturating_sub(self.started_ms));
                for conn in self.conns.iter().filter(|c| c.is_connected()) {
                    conn.set_cursor(x, y);
                }
            }
            LoopKind::BanSweep => {
                // Bans are stored but nothing enforces them yet.
                debug!(bans = self.store.ban_count(), "ban sweep");
            }
        }
    }
}
