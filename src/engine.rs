//! Top-level engine tying pointer sampling, broadcasting, the connection and
//! remote cursor rendering to one document.
//!
//! The engine owns the single pointer entry point ([`Engine::on_pointer_move`]);
//! it lives as long as the engine, not a connection, so join/leave cycles never
//! stack up pointer handlers or tick tasks.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::rc::Rc;
use std::time::Duration;

use frames::{CreateSessionRequest, MemberId, PositionMessage, RejoinToken, Session};
use tracing::info;

use crate::config::{ConfigError, EngineConfig};
use crate::connection::{ConnectionManager, ConnectionParts, ConnectionState, Disconnect};
use crate::directory::{DirectoryError, HttpDirectory, SessionDirectory, origin_of};
use crate::document::Document;
use crate::encoder::PositionEncoder;
use crate::geometry::Point;
use crate::render::{OverlayFactory, RemoteCursorRenderer};
use crate::store::{ClientStore, FileStore, MemoryStore, StoreError};
use crate::transport::{Transport, TransportError, WsTransport};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("already joined or joining a session")]
    AlreadyJoined,
    #[error("join cancelled")]
    Cancelled,
    #[error("connection closed before the handshake completed: {0}")]
    ClosedDuringHandshake(String),
    #[error("no handshake frame within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("no persisted session for {0}")]
    NoPersistedSession(String),
}

/// Builder for [`Engine`]. Collaborators not supplied fall back to the
/// network implementations described by the config.
pub struct EngineBuilder {
    config: EngineConfig,
    document: Rc<dyn Document>,
    overlays: Box<dyn OverlayFactory>,
    directory: Option<Rc<dyn SessionDirectory>>,
    transport: Option<Rc<dyn Transport>>,
    store: Option<Rc<dyn ClientStore>>,
    encoder: Option<PositionEncoder>,
}

impl EngineBuilder {
    #[must_use]
    pub fn directory(mut self, directory: Rc<dyn SessionDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Rc<dyn ClientStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn encoder(mut self, encoder: PositionEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Directory`] when no directory was supplied and
    /// the configured directory URL is invalid.
    pub fn build(self) -> Result<Engine, EngineError> {
        let directory: Rc<dyn SessionDirectory> = match self.directory {
            Some(directory) => directory,
            None => Rc::new(HttpDirectory::new(&self.config.directory_url)?),
        };
        let transport: Rc<dyn Transport> = self.transport.unwrap_or_else(|| Rc::new(WsTransport));
        let store: Rc<dyn ClientStore> = match (self.store, &self.config.state_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Rc::new(FileStore::new(path)),
            (None, None) => Rc::new(MemoryStore::default()),
        };

        let renderer = RemoteCursorRenderer::new(self.overlays, self.config.draw_self);
        let connection = ConnectionManager::new(ConnectionParts {
            directory: Rc::clone(&directory),
            transport,
            document: Rc::clone(&self.document),
            renderer,
            store: Some(Rc::clone(&store)),
            config: self.config,
        });

        Ok(Engine {
            connection,
            directory,
            document: self.document,
            encoder: self.encoder.unwrap_or_default(),
            store,
        })
    }
}

/// Pointer-presence client for one document.
pub struct Engine {
    connection: ConnectionManager,
    directory: Rc<dyn SessionDirectory>,
    document: Rc<dyn Document>,
    encoder: PositionEncoder,
    store: Rc<dyn ClientStore>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("connection", &self.connection).finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(
        config: EngineConfig,
        document: Rc<dyn Document>,
        overlays: Box<dyn OverlayFactory>,
    ) -> EngineBuilder {
        EngineBuilder { config, document, overlays, directory: None, transport: None, store: None, encoder: None }
    }

    // =========================================================================
    // POINTER
    // =========================================================================

    /// Sample the pointer at a viewport point and queue the result for the
    /// next broadcast tick. Returns `None` while no connection is open.
    pub fn on_pointer_move(&self, pointer: Point) -> Option<PositionMessage> {
        if !self.connection.accepts_positions() {
            return None;
        }
        let message = self.encoder.sample_at(&*self.document, pointer);
        self.connection.post_position(message.clone());
        Some(message)
    }

    /// The pointer left the page.
    pub fn pointer_left(&self) {
        self.connection.post_position(PositionMessage::Untracked);
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// # Errors
    ///
    /// See [`ConnectionManager::join`].
    pub async fn join(
        &self,
        session: &Session,
        identifier: &str,
        rejoin: Option<RejoinToken>,
    ) -> Result<RejoinToken, EngineError> {
        self.connection.join(session, identifier, rejoin).await
    }

    /// Join the session persisted for this directory, reusing its token.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoPersistedSession`] when nothing was persisted,
    /// otherwise see [`ConnectionManager::join`].
    pub async fn rejoin(&self, identifier: &str) -> Result<RejoinToken, EngineError> {
        let origin = self.origin();
        let persisted = self.store.load(&origin)?.unwrap_or_default();
        let Some(session) = persisted.session else {
            return Err(EngineError::NoPersistedSession(origin));
        };
        info!(session_id = %session.id, %origin, "rejoining persisted session");
        self.connection.join(&session, identifier, persisted.rejoin_token).await
    }

    pub fn leave(&self) {
        self.connection.leave();
    }

    /// # Errors
    ///
    /// See [`ConnectionManager::close`].
    pub async fn close(&self) -> Result<(), EngineError> {
        self.connection.close().await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Directory`] if the request fails.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, EngineError> {
        Ok(self.directory.list_sessions().await?)
    }

    /// Create a session based at the document's current location.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Directory`] if the request fails.
    pub async fn create_session(&self, name: &str, creator: &str) -> Result<Session, EngineError> {
        let request = CreateSessionRequest {
            name: name.to_owned(),
            base_location: self.document.location(),
            creator: creator.to_owned(),
        };
        let session = self.directory.create_session(&request).await?;
        info!(session_id = %session.id, name, "session created");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Directory`] if the request fails.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        Ok(self.directory.delete_session(session_id).await?)
    }

    /// Forget the persisted token and session for this directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store cannot be written.
    pub fn forget_persisted(&self) -> Result<(), EngineError> {
        Ok(self.store.clear(&self.origin())?)
    }

    pub fn set_on_disconnect(&self, callback: impl FnMut(&Disconnect) + 'static) {
        self.connection.set_on_disconnect(callback);
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn member_id(&self) -> Option<MemberId> {
        self.connection.member_id()
    }

    #[must_use]
    pub fn rejoin_token(&self) -> Option<RejoinToken> {
        self.connection.rejoin_token()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.connection.session()
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Origin of the directory; key of persisted state.
    #[must_use]
    pub fn origin(&self) -> String {
        origin_of(self.directory.base_url())
    }
}
