//! Upstream credential pair and rotation.
//!
//! The service holds two tokens: a required primary and an optional
//! fallback.  Exactly one is active at a time.  The only transition is
//! [`CredentialRotator::rotate`], which the transport calls when the
//! upstream rejects the active token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::errors::StoreError;

/// Which half of the pair is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSlot {
    Primary,
    Fallback,
}

/// The two configured tokens.
#[derive(Clone)]
pub struct CredentialPair {
    primary: String,
    fallback: Option<String>,
}

impl CredentialPair {
    /// Build a pair from explicit values.  An empty fallback counts as absent.
    pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.filter(|f| !f.is_empty()),
        }
    }

    /// Read the pair from the environment.
    ///
    /// Fails when `primary_var` is unset or empty; the fallback is optional.
    pub fn from_env(primary_var: &str, fallback_var: &str) -> Result<Self, StoreError> {
        let primary = std::env::var(primary_var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StoreError::MissingCredential {
                var: primary_var.to_string(),
            })?;
        let fallback = std::env::var(fallback_var).ok();
        Ok(Self::new(primary, fallback))
    }

    /// Whether a fallback token is configured.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("primary", &"<redacted>")
            .field("fallback", &self.fallback.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Holds the pair and the active slot.
///
/// Shared between request tasks.  A race between two rotations costs at
/// most one extra retry; it cannot leave the rotator in an invalid state.
pub struct CredentialRotator {
    pair: CredentialPair,
    on_fallback: AtomicBool,
}

impl CredentialRotator {
    /// Start on the primary credential.
    pub fn new(pair: CredentialPair) -> Self {
        Self {
            pair,
            on_fallback: AtomicBool::new(false),
        }
    }

    /// The active slot.
    pub fn active(&self) -> ActiveSlot {
        if self.on_fallback.load(Ordering::SeqCst) {
            ActiveSlot::Fallback
        } else {
            ActiveSlot::Primary
        }
    }

    /// The active credential value.
    pub fn current(&self) -> String {
        match (self.active(), &self.pair.fallback) {
            (ActiveSlot::Fallback, Some(fallback)) => fallback.clone(),
            _ => self.pair.primary.clone(),
        }
    }

    /// Switch to the other credential.  Without a fallback the primary
    /// stays active.  Returns the slot that is active afterwards.
    pub fn rotate(&self) -> ActiveSlot {
        if self.pair.has_fallback() {
            self.on_fallback.fetch_xor(true, Ordering::SeqCst);
        } else {
            self.on_fallback.store(false, Ordering::SeqCst);
        }
        let active = self.active();
        metrics::counter!(crate::metrics::CREDENTIAL_ROTATIONS_TOTAL).increment(1);
        info!(?active, "rotated upstream credential");
        active
    }
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("pair", &self.pair)
            .field("active", &self.active())
            .finish()
    }
}
