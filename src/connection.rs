//! Connection lifecycle: join/rejoin handshake, inbound dispatch, teardown.
//!
//! SYSTEM CONTEXT
//! ==============
//! ```text
//! join()  ── directory.join_session ──► transport.open ──► "Identifier:<name>"
//!                                                             │
//!   Idle → Connecting → AwaitingHandshake ── "<id>;<token>" ──► Connected
//!                                                             │
//!   Idle ◄── Disconnected ◄── leave() / close() / remote close / timeout
//! ```
//!
//! DESIGN
//! ======
//! All state lives in one `Rc` shared by the public handle, the inbound pump
//! task and the broadcast tick task; the tasks hold `Weak` references and a
//! generation number, so work belonging to an older connection is dropped
//! instead of touching the current one. `RefCell` borrows never span an
//! `.await`.
//!
//! Inbound frames go through a two-phase [`Handshake`]: until the handshake
//! frame arrives, anything else is buffered and replayed as member batches
//! once streaming begins.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::rc::{Rc, Weak};

use frames::{CodecError, Member, MemberId, PositionMessage, RejoinToken, Session, Welcome};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastLoop, Mailbox};
use crate::config::EngineConfig;
use crate::directory::{SessionDirectory, origin_of};
use crate::document::Document;
use crate::engine::EngineError;
use crate::render::RemoteCursorRenderer;
use crate::store::{ClientStore, PersistedState};
use crate::transport::{Inbound, Outbound, Transport, resolve_join_url};

/// Frames held back while waiting for the handshake frame.
pub const MAX_BUFFERED_FRAMES: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    AwaitingHandshake,
    Connected,
    Disconnected,
}

/// Passed to the disconnect notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// The local side asked for the closure.
    pub requested: bool,
    /// The closure was not a clean close.
    pub abnormal: bool,
    pub reason: String,
}

impl Disconnect {
    #[must_use]
    pub fn requested() -> Self {
        Self { requested: true, abnormal: false, reason: "left session".to_owned() }
    }

    #[must_use]
    pub fn remote(abnormal: bool, reason: impl Into<String>) -> Self {
        Self { requested: false, abnormal, reason: reason.into() }
    }
}

pub type DisconnectCallback = Box<dyn FnMut(&Disconnect)>;

// =============================================================================
// HANDSHAKE
// =============================================================================

/// What to do with one inbound text frame.
#[derive(Debug)]
pub enum InboundEvent {
    /// The handshake frame arrived; `backlog` holds batches received before it.
    Established { welcome: Welcome, backlog: Vec<Vec<Member>> },
    Batch(Vec<Member>),
    /// Held until the handshake frame arrives.
    Buffered,
    /// Undecodable; before the handshake only a malformed handshake frame.
    Rejected(CodecError),
}

#[derive(Debug)]
enum Phase {
    AwaitingIdentity { buffered: VecDeque<String> },
    Streaming,
}

/// Two-phase inbound decoder for one connection.
#[derive(Debug)]
pub struct Handshake {
    phase: Phase,
}

impl Default for Handshake {
    fn default() -> Self {
        Self { phase: Phase::AwaitingIdentity { buffered: VecDeque::new() } }
    }
}

impl Handshake {
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.phase, Phase::Streaming)
    }

    pub fn accept(&mut self, text: &str) -> InboundEvent {
        match &mut self.phase {
            Phase::Streaming => match frames::decode_members(text) {
                Ok(members) => InboundEvent::Batch(members),
                Err(error) => InboundEvent::Rejected(error),
            },
            Phase::AwaitingIdentity { buffered } => {
                let welcome = match frames::decode_welcome(text) {
                    Ok(welcome) => welcome,
                    Err(error) => {
                        if looks_like_handshake(text, &error) {
                            return InboundEvent::Rejected(error);
                        }
                        if buffered.len() >= MAX_BUFFERED_FRAMES {
                            buffered.pop_front();
                            warn!("pre-handshake buffer full; dropping oldest frame");
                        }
                        buffered.push_back(text.to_owned());
                        return InboundEvent::Buffered;
                    }
                };
                let backlog = buffered
                    .drain(..)
                    .filter_map(|frame| match frames::decode_members(&frame) {
                        Ok(members) => Some(members),
                        Err(error) => {
                            warn!(%error, "dropping undecodable pre-handshake frame");
                            None
                        }
                    })
                    .collect();
                self.phase = Phase::Streaming;
                InboundEvent::Established { welcome, backlog }
            }
        }
    }
}

/// A frame shaped like `<id>;<token>` whose id failed to parse. Member
/// batches are JSON and never take this shape.
fn looks_like_handshake(text: &str, error: &CodecError) -> bool {
    let trimmed = text.trim();
    matches!(error, CodecError::InvalidMemberId(_))
        && trimmed.matches(';').count() == 1
        && !trimmed.starts_with(['[', '{'])
}

// =============================================================================
// CONNECTION MANAGER
// =============================================================================

/// Collaborators of a [`ConnectionManager`].
pub struct ConnectionParts {
    pub directory: Rc<dyn SessionDirectory>,
    pub transport: Rc<dyn Transport>,
    pub document: Rc<dyn Document>,
    pub renderer: RemoteCursorRenderer,
    pub store: Option<Rc<dyn ClientStore>>,
    pub config: EngineConfig,
}

type PendingJoin = oneshot::Sender<Result<Welcome, EngineError>>;

#[derive(Default)]
struct Live {
    state: ConnectionState,
    generation: u64,
    session: Option<Session>,
    member_id: Option<MemberId>,
    rejoin_token: Option<RejoinToken>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    pump: Option<JoinHandle<()>>,
    broadcast: BroadcastLoop,
    pending: Option<PendingJoin>,
}

struct Inner {
    directory: Rc<dyn SessionDirectory>,
    transport: Rc<dyn Transport>,
    document: Rc<dyn Document>,
    store: Option<Rc<dyn ClientStore>>,
    config: EngineConfig,
    live: RefCell<Live>,
    mailbox: RefCell<Mailbox>,
    renderer: RefCell<RemoteCursorRenderer>,
    on_disconnect: RefCell<Option<DisconnectCallback>>,
}

/// Owns the connection state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("member_id", &self.member_id())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    #[must_use]
    pub fn new(parts: ConnectionParts) -> Self {
        let inner = Inner {
            directory: parts.directory,
            transport: parts.transport,
            document: parts.document,
            store: parts.store,
            config: parts.config,
            live: RefCell::new(Live::default()),
            mailbox: RefCell::new(Mailbox::default()),
            renderer: RefCell::new(parts.renderer),
            on_disconnect: RefCell::new(None),
        };
        Self { inner: Rc::new(inner) }
    }

    /// Join `session` as `identifier`, optionally resuming a prior identity.
    ///
    /// Resolves once the broker's handshake frame arrives and returns the
    /// rejoin token it issued. Must be awaited within a `LocalSet`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyJoined`] unless the manager is idle.
    /// - [`EngineError::Directory`] / [`EngineError::Transport`] when the join
    ///   URL cannot be obtained or opened; the manager returns to idle.
    /// - [`EngineError::ClosedDuringHandshake`] / [`EngineError::HandshakeTimeout`]
    ///   when the connection ends or stalls before the handshake frame.
    /// - [`EngineError::Cancelled`] when `leave()` interrupts the join.
    pub async fn join(
        &self,
        session: &Session,
        identifier: &str,
        rejoin: Option<RejoinToken>,
    ) -> Result<RejoinToken, EngineError> {
        let inner = &self.inner;
        let generation = {
            let mut live = inner.live.borrow_mut();
            if !matches!(live.state, ConnectionState::Idle | ConnectionState::Disconnected) {
                return Err(EngineError::AlreadyJoined);
            }
            live.state = ConnectionState::Connecting;
            live.generation += 1;
            live.session = Some(session.clone());
            live.generation
        };
        info!(session_id = %session.id, %identifier, rejoin = rejoin.is_some(), "joining session");

        let join = match inner.directory.join_session(&session.id).await {
            Ok(join) => join,
            Err(error) => {
                warn!(session_id = %session.id, %error, "directory join failed");
                inner.reset_connecting(generation);
                return Err(error.into());
            }
        };
        inner.ensure_connecting(generation)?;

        let url = match resolve_join_url(inner.directory.base_url(), &join.join_url, rejoin.as_ref()) {
            Ok(url) => url,
            Err(error) => {
                inner.reset_connecting(generation);
                return Err(error.into());
            }
        };
        let link = match inner.transport.open(&url).await {
            Ok(link) => link,
            Err(error) => {
                warn!(%url, %error, "connection failed");
                inner.reset_connecting(generation);
                return Err(error.into());
            }
        };
        if let Err(error) = inner.ensure_connecting(generation) {
            if link.outbound.send(Outbound::Close).is_err() {
                debug!("superseded link already closed");
            }
            return Err(error);
        }

        let (pending_tx, pending_rx) = oneshot::channel();
        if link.outbound.send(Outbound::Text(frames::encode_identity(identifier))).is_err() {
            debug!("link closed before identity announcement");
        }
        {
            let mut live = inner.live.borrow_mut();
            live.state = ConnectionState::AwaitingHandshake;
            live.outbound = Some(link.outbound);
            live.pending = Some(pending_tx);
            live.pump = Some(tokio::task::spawn_local(pump(Rc::downgrade(inner), generation, link.inbound)));
        }

        let timeout = inner.config.handshake_timeout;
        let welcome = match tokio::time::timeout(timeout, pending_rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(EngineError::Cancelled),
            Err(_) => {
                warn!(?timeout, "handshake timed out");
                inner.disconnect(generation, Disconnect::remote(true, "handshake timed out"), true);
                return Err(EngineError::HandshakeTimeout(timeout));
            }
        };

        inner.persist(session, &welcome.rejoin_token);
        Ok(welcome.rejoin_token)
    }

    /// Close the active connection and stop broadcasting. No-op when idle.
    pub fn leave(&self) {
        let generation = self.inner.live.borrow().generation;
        self.inner.disconnect(generation, Disconnect::requested(), true);
    }

    /// Leave, then ask the directory to delete the session that was active.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Directory`] if the deletion is rejected.
    pub async fn close(&self) -> Result<(), EngineError> {
        let session = self.inner.live.borrow().session.clone();
        self.leave();
        let Some(session) = session else {
            return Ok(());
        };
        info!(session_id = %session.id, "deleting session");
        self.inner.directory.delete_session(&session.id).await?;
        Ok(())
    }

    /// Replace the latest outbound position. Ignored unless a connection is
    /// open or opening; returns whether the message was accepted.
    pub fn post_position(&self, message: PositionMessage) -> bool {
        if !self.accepts_positions() {
            return false;
        }
        self.inner.mailbox.borrow_mut().post(message);
        true
    }

    #[must_use]
    pub fn accepts_positions(&self) -> bool {
        matches!(self.state(), ConnectionState::AwaitingHandshake | ConnectionState::Connected)
    }

    /// Install the notification invoked on every transition to disconnected.
    pub fn set_on_disconnect(&self, callback: impl FnMut(&Disconnect) + 'static) {
        *self.inner.on_disconnect.borrow_mut() = Some(Box::new(callback));
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.live.borrow().state
    }

    #[must_use]
    pub fn member_id(&self) -> Option<MemberId> {
        self.inner.live.borrow().member_id
    }

    #[must_use]
    pub fn rejoin_token(&self) -> Option<RejoinToken> {
        self.inner.live.borrow().rejoin_token.clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.live.borrow().session.clone()
    }

    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        self.inner.live.borrow().broadcast.is_running()
    }

    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.inner.renderer.borrow().overlay_count()
    }

    #[must_use]
    pub fn last_sent(&self) -> PositionMessage {
        self.inner.mailbox.borrow().last_sent().clone()
    }
}

impl Inner {
    fn ensure_connecting(&self, generation: u64) -> Result<(), EngineError> {
        let live = self.live.borrow();
        if live.generation == generation && live.state == ConnectionState::Connecting {
            Ok(())
        } else {
            Err(EngineError::Cancelled)
        }
    }

    fn reset_connecting(&self, generation: u64) {
        let mut live = self.live.borrow_mut();
        if live.generation == generation && live.state == ConnectionState::Connecting {
            live.state = ConnectionState::Idle;
            live.session = None;
        }
    }

    fn persist(&self, session: &Session, token: &RejoinToken) {
        let Some(store) = &self.store else {
            return;
        };
        let origin = origin_of(self.directory.base_url());
        let state = PersistedState { rejoin_token: Some(token.clone()), session: Some(session.clone()) };
        if let Err(error) = store.save(&origin, &state) {
            warn!(%origin, %error, "failed to persist rejoin token");
        }
    }

    fn on_text(self: &Rc<Self>, generation: u64, handshake: &mut Handshake, text: &str) {
        if self.live.borrow().generation != generation {
            return;
        }
        match handshake.accept(text) {
            InboundEvent::Established { welcome, backlog } => {
                self.establish(generation, welcome);
                for batch in &backlog {
                    self.render_batch(batch);
                }
            }
            InboundEvent::Batch(members) => self.render_batch(&members),
            InboundEvent::Buffered => debug!("frame buffered until handshake"),
            InboundEvent::Rejected(error) => {
                if handshake.is_streaming() {
                    warn!(%error, "dropping undecodable frame");
                } else {
                    warn!(%error, frame = text, "malformed handshake frame; still waiting for a valid one");
                }
            }
        }
    }

    fn establish(self: &Rc<Self>, generation: u64, welcome: Welcome) {
        let pending = {
            let mut live = self.live.borrow_mut();
            live.state = ConnectionState::Connected;
            live.member_id = Some(welcome.member_id);
            live.rejoin_token = Some(welcome.rejoin_token.clone());
            live.pending.take()
        };
        info!(member_id = welcome.member_id, "handshake complete");

        self.start_broadcast(generation);

        if let Some(pending) = pending {
            if pending.send(Ok(welcome)).is_err() {
                debug!("join caller went away before handshake completed");
            }
        }
    }

    fn start_broadcast(self: &Rc<Self>, generation: u64) {
        let weak = Rc::downgrade(self);
        let period = self.config.tick_period;
        let mut live = self.live.borrow_mut();
        let Some(outbound) = live.outbound.clone() else {
            return;
        };
        live.broadcast.start(period, move || match weak.upgrade() {
            Some(inner) => inner.flush(generation, &outbound),
            None => ControlFlow::Break(()),
        });
    }

    fn flush(&self, generation: u64, outbound: &mpsc::UnboundedSender<Outbound>) -> ControlFlow<()> {
        {
            let live = self.live.borrow();
            if live.generation != generation || live.state != ConnectionState::Connected {
                return ControlFlow::Break(());
            }
        }
        let Some(message) = self.mailbox.borrow_mut().take_pending() else {
            return ControlFlow::Continue(());
        };
        match frames::encode_position(&message) {
            Ok(text) => {
                if outbound.send(Outbound::Text(text)).is_err() {
                    return ControlFlow::Break(());
                }
            }
            Err(error) => warn!(%error, "failed to encode position"),
        }
        ControlFlow::Continue(())
    }

    fn render_batch(&self, members: &[Member]) {
        let local = self.live.borrow().member_id;
        let summary = self.renderer.borrow_mut().render(&*self.document, members, local);
        debug!(
            members = members.len(),
            shown = summary.shown,
            skipped = summary.skipped,
            freed = summary.freed,
            "rendered member batch"
        );
    }

    fn on_closed(&self, generation: u64, abnormal: bool, reason: String) {
        if abnormal {
            warn!(%reason, "connection closed abnormally");
        } else {
            info!(%reason, "connection closed");
        }
        self.disconnect(generation, Disconnect::remote(abnormal, reason), false);
    }

    /// Tear down the connection of `generation`: stop ticking, close the link,
    /// forget ids and the pointer mailbox, release overlays, fail a pending
    /// join, notify, go idle.
    fn disconnect(&self, generation: u64, notice: Disconnect, abort_pump: bool) {
        let (pending, was_handshaking) = {
            let mut live = self.live.borrow_mut();
            if live.generation != generation || matches!(live.state, ConnectionState::Idle | ConnectionState::Disconnected) {
                return;
            }
            let was_handshaking = live.state != ConnectionState::Connected;
            live.state = ConnectionState::Disconnected;
            live.generation += 1;
            live.broadcast.stop();
            if let Some(pump) = live.pump.take() {
                if abort_pump {
                    pump.abort();
                }
            }
            if let Some(outbound) = live.outbound.take() {
                if outbound.send(Outbound::Close).is_err() {
                    debug!("link already closed");
                }
            }
            live.session = None;
            live.member_id = None;
            live.rejoin_token = None;
            (live.pending.take(), was_handshaking)
        };

        self.mailbox.borrow_mut().clear();
        let released = self.renderer.borrow_mut().release_all();
        info!(released, requested = notice.requested, "disconnected");

        if let Some(pending) = pending {
            let error = if notice.requested || !was_handshaking {
                EngineError::Cancelled
            } else {
                EngineError::ClosedDuringHandshake(notice.reason.clone())
            };
            if pending.send(Err(error)).is_err() {
                debug!("join caller went away before disconnect");
            }
        }

        let callback = self.on_disconnect.borrow_mut().take();
        if let Some(mut callback) = callback {
            callback(&notice);
            let mut slot = self.on_disconnect.borrow_mut();
            if slot.is_none() {
                *slot = Some(callback);
            }
        }

        let mut live = self.live.borrow_mut();
        if live.state == ConnectionState::Disconnected {
            live.state = ConnectionState::Idle;
        }
    }
}

/// Inbound pump for one connection. Holds only a weak reference so a
/// dropped manager ends it.
async fn pump(inner: Weak<Inner>, generation: u64, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    let mut handshake = Handshake::default();
    while let Some(item) = inbound.recv().await {
        let Some(manager) = inner.upgrade() else {
            return;
        };
        match item {
            Inbound::Text(text) => manager.on_text(generation, &mut handshake, &text),
            Inbound::Closed { abnormal, reason } => {
                manager.on_closed(generation, abnormal, reason);
                return;
            }
        }
    }
    if let Some(manager) = inner.upgrade() {
        manager.on_closed(generation, true, "link dropped".to_owned());
    }
}
