//! Shared wire model and text codec for the pointer-presence protocol.
//!
//! This crate owns the representation exchanged with the session directory
//! (JSON over HTTP) and with the broker (text frames over a websocket). Both
//! the engine and the command-line client depend on it.
//!
//! WIRE SHAPES
//! ===========
//! - outbound identity announcement: `Identifier:<identifier>`
//! - inbound handshake: `<memberId>;<rejoinToken>`, raw or JSON-string encoded
//! - inbound member batch: JSON array of [`Member`]
//! - outbound position: one JSON [`PositionMessage`]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the first outbound frame on a fresh connection.
pub const IDENTITY_PREFIX: &str = "Identifier:";

/// Coordinate carried by untracked positions on the wire.
pub const UNTRACKED_COORDINATE: f64 = -1.0;

/// Error returned by the decode functions in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The handshake frame is not `<memberId>;<rejoinToken>`.
    #[error("malformed handshake frame: {0:?}")]
    MalformedHandshake(String),
    /// The member id half of the handshake frame is not an integer.
    #[error("invalid member id in handshake frame: {0:?}")]
    InvalidMemberId(String),
    /// The payload is not valid JSON for the expected shape.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Broker-assigned member identifier, unique per live connection.
pub type MemberId = i64;

/// Opaque credential that lets a client resume a prior member identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejoinToken(String);

impl RejoinToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RejoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SESSION DIRECTORY
// =============================================================================

/// A collaboration session as returned by the directory. Immutable once issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Directory-issued session identifier.
    pub id: String,
    /// Websocket join URL; may be relative to the directory origin.
    pub join_url: String,
    /// Display name chosen by the creator.
    pub name: String,
    /// Page location the session was created from.
    #[serde(default, alias = "baseUrl")]
    pub base: String,
    /// Identifier of the member who created the session.
    #[serde(default)]
    pub creator_identifier: String,
}

/// Body of `POST sessions`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    pub base_location: String,
    pub creator: String,
}

/// Body returned by `POST sessions/{id}/join`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub join_url: String,
}

// =============================================================================
// POSITIONS
// =============================================================================

/// A pointer position anchored to a structural element of a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// Horizontal offset as a fraction of the anchor's width.
    pub x: f64,
    /// Vertical offset as a fraction of the anchor's height.
    pub y: f64,
    /// Structural path of the anchor element.
    pub anchor_path: String,
    /// Location of the page the anchor belongs to.
    pub page_location: String,
}

/// Position payload exchanged with the broker.
///
/// The anchor path and page location are either both present
/// ([`PositionMessage::Tracked`]) or both absent ([`PositionMessage::Untracked`],
/// encoded with `x = y = -1`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePosition", into = "WirePosition")]
pub enum PositionMessage {
    /// The sentinel: the pointer is over nothing trackable.
    #[default]
    Untracked,
    /// The pointer is over a tracked element.
    Tracked(Placement),
}

impl PositionMessage {
    #[must_use]
    pub fn tracked(x: f64, y: f64, anchor_path: impl Into<String>, page_location: impl Into<String>) -> Self {
        Self::Tracked(Placement { x, y, anchor_path: anchor_path.into(), page_location: page_location.into() })
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Untracked)
    }

    #[must_use]
    pub fn placement(&self) -> Option<&Placement> {
        match self {
            Self::Untracked => None,
            Self::Tracked(placement) => Some(placement),
        }
    }

    #[must_use]
    pub fn x(&self) -> f64 {
        self.placement().map_or(UNTRACKED_COORDINATE, |p| p.x)
    }

    #[must_use]
    pub fn y(&self) -> f64 {
        self.placement().map_or(UNTRACKED_COORDINATE, |p| p.y)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WirePosition {
    #[serde(default = "untracked_coordinate")]
    x: f64,
    #[serde(default = "untracked_coordinate")]
    y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

fn untracked_coordinate() -> f64 {
    UNTRACKED_COORDINATE
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<WirePosition> for PositionMessage {
    fn from(wire: WirePosition) -> Self {
        match (non_empty(wire.selector), non_empty(wire.location)) {
            (Some(anchor_path), Some(page_location)) => {
                Self::Tracked(Placement { x: wire.x, y: wire.y, anchor_path, page_location })
            }
            _ => Self::Untracked,
        }
    }
}

impl From<PositionMessage> for WirePosition {
    fn from(message: PositionMessage) -> Self {
        match message {
            PositionMessage::Untracked => Self {
                x: UNTRACKED_COORDINATE,
                y: UNTRACKED_COORDINATE,
                selector: None,
                location: None,
            },
            PositionMessage::Tracked(p) => Self {
                x: p.x,
                y: p.y,
                selector: Some(p.anchor_path),
                location: Some(p.page_location),
            },
        }
    }
}

// =============================================================================
// MEMBERS
// =============================================================================

/// One participant's last known position, as carried in a member batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMember", into = "WireMember")]
pub struct Member {
    pub member_id: MemberId,
    /// Human-readable label; not a uniqueness key.
    pub given_identifier: String,
    pub position: PositionMessage,
}

impl Member {
    #[must_use]
    pub fn new(member_id: MemberId, given_identifier: impl Into<String>, position: PositionMessage) -> Self {
        Self { member_id, given_identifier: given_identifier.into(), position }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMember {
    member_id: MemberId,
    #[serde(default)]
    given_identifier: String,
    #[serde(default = "untracked_coordinate")]
    x: f64,
    #[serde(default = "untracked_coordinate")]
    y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

impl From<WireMember> for Member {
    fn from(wire: WireMember) -> Self {
        let position = PositionMessage::from(WirePosition {
            x: wire.x,
            y: wire.y,
            selector: wire.selector,
            location: wire.location,
        });
        Self { member_id: wire.member_id, given_identifier: wire.given_identifier, position }
    }
}

impl From<Member> for WireMember {
    fn from(member: Member) -> Self {
        let position = WirePosition::from(member.position);
        Self {
            member_id: member.member_id,
            given_identifier: member.given_identifier,
            x: position.x,
            y: position.y,
            selector: position.selector,
            location: position.location,
        }
    }
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Payload of the first inbound frame on a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Welcome {
    pub member_id: MemberId,
    pub rejoin_token: RejoinToken,
}

/// Encode the identity announcement sent right after the connection opens.
#[must_use]
pub fn encode_identity(identifier: &str) -> String {
    format!("{IDENTITY_PREFIX}{identifier}")
}

/// Extract the identifier from an identity announcement.
#[must_use]
pub fn decode_identity(text: &str) -> Option<&str> {
    text.strip_prefix(IDENTITY_PREFIX)
}

/// Encode a handshake frame as `<memberId>;<rejoinToken>`.
#[must_use]
pub fn encode_welcome(welcome: &Welcome) -> String {
    format!("{};{}", welcome.member_id, welcome.rejoin_token)
}

/// Decode a handshake frame.
///
/// Accepts both the raw form (`3;tok`) and the JSON-string form (`"3;tok"`).
///
/// # Errors
///
/// Returns [`CodecError::MalformedHandshake`] when the separator or token is
/// missing and [`CodecError::InvalidMemberId`] when the id is not an integer.
pub fn decode_welcome(text: &str) -> Result<Welcome, CodecError> {
    let trimmed = text.trim();
    let raw = if trimmed.starts_with('"') { serde_json::from_str::<String>(trimmed)? } else { trimmed.to_owned() };

    let Some((id, token)) = raw.split_once(';') else {
        return Err(CodecError::MalformedHandshake(raw));
    };
    if token.is_empty() || token.contains(';') {
        return Err(CodecError::MalformedHandshake(raw));
    }
    let member_id = id
        .trim()
        .parse::<MemberId>()
        .map_err(|_| CodecError::InvalidMemberId(id.to_owned()))?;

    Ok(Welcome { member_id, rejoin_token: RejoinToken::new(token) })
}

// =============================================================================
// POSITION AND BATCH FRAMES
// =============================================================================

/// Encode a position message frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_position(message: &PositionMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a position message frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed payloads.
pub fn decode_position(text: &str) -> Result<PositionMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a member batch frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_members(members: &[Member]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(members)?)
}

/// Decode a member batch frame. A JSON `null` decodes as an empty batch.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed payloads.
pub fn decode_members(text: &str) -> Result<Vec<Member>, CodecError> {
    let members: Option<Vec<Member>> = serde_json::from_str(text)?;
    Ok(members.unwrap_or_default())
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
