//! Mutual-trust handshake.
//!
//! One-shot challenge–response exchange run to completion before any RPC
//! traffic. The server issues a fresh random challenge; both sides derive
//! `SHA-256(challenge || token)` independently; the server verifies the
//! client's digest with a constant-time comparison and answers with a fixed
//! verdict tag. The token itself never touches the wire.

use std::fmt;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{ConnectionError, HandshakeError, Result};
use crate::protocol::framing::FrameCodec;

/// Acceptance verdict sent by the server after a matching digest.
pub const ACCEPT_TAG: &[u8] = b"OK";

/// Rejection verdict sent by the server after a digest mismatch.
pub const REJECT_TAG: &[u8] = b"FAIL";

/// Random bytes drawn per challenge before hex encoding.
const CHALLENGE_BYTES: usize = 16;

/// Which side of the handshake an `Authenticator` is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The verifying side: issues the challenge, checks the digest.
    Server,
    /// The proving side: answers the challenge.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// The shared secret proving peer identity class.
///
/// Resolved once by the bootstrap layer (environment or `.env` file) and
/// injected here; core logic never reads the process environment.
#[derive(Clone)]
pub struct TrustToken(String);

impl TrustToken {
    /// Wrap a secret string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for TrustToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep the secret out of logs and panic messages.
        f.write_str("TrustToken(..)")
    }
}

/// Runs the trust handshake in either role over a framed stream.
#[derive(Debug, Clone)]
pub struct Authenticator {
    token: Option<TrustToken>,
}

impl Authenticator {
    /// Create an authenticator with an optional configured token.
    #[must_use]
    pub const fn new(token: Option<TrustToken>) -> Self {
        Self { token }
    }

    /// Fails with a configuration fault if no token is present for `role`.
    pub(crate) fn require_token(&self, role: Role) -> Result<&TrustToken> {
        self.token
            .as_ref()
            .ok_or_else(|| HandshakeError::SecretNotConfigured { role }.into())
    }

    /// Run the verifying side of the handshake.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if no token is configured (before any
    /// I/O), a connection fault if the peer disconnects mid-handshake, and
    /// `HandshakeError::TokenMismatch` after sending the rejection tag when
    /// the digests differ.
    pub async fn handshake_server<S>(&self, framed: &mut Framed<S, FrameCodec>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let token = self.require_token(Role::Server)?;

        let challenge = generate_challenge();
        framed.send(challenge.clone()).await?;
        debug!("sent handshake challenge");

        let response = match framed.next().await {
            Some(frame) => frame?,
            None => return Err(ConnectionError::Closed.into()),
        };

        let expected = digest_response(&challenge, token);
        if !constant_time_eq(&expected, &response) {
            framed.send(Bytes::from_static(REJECT_TAG)).await?;
            return Err(HandshakeError::TokenMismatch.into());
        }

        framed.send(Bytes::from_static(ACCEPT_TAG)).await?;
        debug!("handshake complete, peer trusted");
        Ok(())
    }

    /// Run the proving side of the handshake.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if no token is configured (before any
    /// I/O), a connection fault if the peer disconnects mid-handshake, and
    /// `HandshakeError::Rejected` on any verdict other than the acceptance
    /// tag.
    pub async fn handshake_client<S>(&self, framed: &mut Framed<S, FrameCodec>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let token = self.require_token(Role::Client)?;

        let challenge = match framed.next().await {
            Some(frame) => frame?,
            None => return Err(ConnectionError::Closed.into()),
        };
        debug!("received handshake challenge");

        framed.send(digest_response(&challenge, token)).await?;

        let verdict = match framed.next().await {
            Some(frame) => frame?,
            None => return Err(ConnectionError::Closed.into()),
        };
        if verdict != ACCEPT_TAG {
            return Err(HandshakeError::Rejected.into());
        }

        debug!("handshake complete, connection trusted");
        Ok(())
    }
}

/// Generate a fresh single-use challenge: random bytes, hex-encoded.
fn generate_challenge() -> Bytes {
    let mut raw = [0u8; CHALLENGE_BYTES];
    OsRng.fill_bytes(&mut raw);
    Bytes::from(hex::encode(raw).into_bytes())
}

/// Derive the handshake response digest binding challenge and token.
fn digest_response(challenge: &[u8], token: &TrustToken) -> Bytes {
    let mut hasher = Sha256::new();
    hasher.update(challenge);
    hasher.update(token.as_bytes());
    Bytes::copy_from_slice(&hasher.finalize())
}

/// Compare two byte slices in time dependent only on their lengths.
///
/// The digest comparison is the secret-bearing path, so it must not leak
/// how many leading bytes matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
