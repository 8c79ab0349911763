//! Pointer-presence engine for co-browsing sessions.
//!
//! Clients visiting the same page see each other's pointer, anchored to the
//! structural element each person is hovering, so positions survive
//! differences in viewport size and layout between clients.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Top-level [`engine::Engine`] and its builder |
//! | [`connection`] | Join/rejoin handshake and connection state machine |
//! | [`broadcast`] | Latest-wins mailbox and the fixed-rate tick |
//! | [`encoder`] | Pointer sampling into position messages |
//! | [`anchor`] | Structural paths for document nodes |
//! | [`render`] | Remote cursor overlays |
//! | [`document`] | Document capability and the in-memory [`document::StaticDocument`] |
//! | [`directory`] | Session directory client |
//! | [`transport`] | Websocket link to the broker |
//! | [`store`] | Persisted rejoin tokens |
//! | [`config`] | Environment configuration |
//! | [`geometry`] | Points and rectangles |

pub mod anchor;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod directory;
pub mod document;
pub mod encoder;
pub mod engine;
pub mod geometry;
pub mod render;
pub mod store;
pub mod transport;

pub use frames;
