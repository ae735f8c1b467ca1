//! Signature envelopes.
//!
//! [`Signed<T>`] is what travels between nodes. [`Verified<T>`] can only be
//! obtained through [`Signed::verify`], so any API that takes a
//! `Verified<T>` is statically protected from unchecked input.

use std::ops::Deref;

use crate::canonical;
use crate::commit::{RawCommitHead, RawPullRequest, RawSnapshot};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;

/// A record that can be signed.
pub trait Signable {
    /// Domain separation tag prepended to the signed message.
    const DOMAIN: &'static [u8];

    /// Canonical encoding of the record.
    fn canonical_bytes(&self) -> Vec<u8>;

    /// The key that must have produced the signature.
    fn signer(&self) -> &Ed25519PublicKey;

    /// Message covered by the signature: `DOMAIN || canonical_bytes`.
    fn signed_message(&self) -> Vec<u8> {
        let body = self.canonical_bytes();
        let mut message = Vec::with_capacity(Self::DOMAIN.len() + body.len());
        message.extend_from_slice(Self::DOMAIN);
        message.extend_from_slice(&body);
        message
    }
}

impl Signable for RawCommitHead {
    const DOMAIN: &'static [u8] = b"otgraph/head/v1";

    fn canonical_bytes(&self) -> Vec<u8> {
        canonical::encode_head(self)
    }

    fn signer(&self) -> &Ed25519PublicKey {
        &self.repo.owner
    }
}

impl Signable for RawSnapshot {
    const DOMAIN: &'static [u8] = b"otgraph/snapshot/v1";

    fn canonical_bytes(&self) -> Vec<u8> {
        canonical::encode_snapshot(self)
    }

    fn signer(&self) -> &Ed25519PublicKey {
        &self.repo.owner
    }
}

impl Signable for RawPullRequest {
    const DOMAIN: &'static [u8] = b"otgraph/pull-request/v1";

    fn canonical_bytes(&self) -> Vec<u8> {
        canonical::encode_pull_request(self)
    }

    // Pull requests come from the fork's owner.
    fn signer(&self) -> &Ed25519PublicKey {
        &self.fork.owner
    }
}

/// A record with a signature that has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed<T> {
    pub value: T,
    pub signature: Ed25519Signature,
}

impl<T: Signable> Signed<T> {
    /// Sign `value` with `keypair`.
    ///
    /// Signing with a key other than `value.signer()` yields an envelope that
    /// will never verify.
    pub fn sign(value: T, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&value.signed_message());
        Self { value, signature }
    }

    /// Check the signature against the record's expected signer.
    pub fn verify(&self) -> Result<Verified<T>, CoreError>
    where
        T: Clone,
    {
        self.clone().into_verified()
    }

    /// Consuming form of [`Signed::verify`].
    pub fn into_verified(self) -> Result<Verified<T>, CoreError> {
        self.value
            .signer()
            .verify(&self.value.signed_message(), &self.signature)?;
        Ok(Verified { inner: self })
    }
}

/// A signed record whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified<T> {
    inner: Signed<T>,
}

impl<T> Verified<T> {
    pub fn value(&self) -> &T {
        &self.inner.value
    }

    pub fn signature(&self) -> &Ed25519Signature {
        &self.inner.signature
    }

    pub fn signed(&self) -> &Signed<T> {
        &self.inner
    }

    pub fn into_signed(self) -> Signed<T> {
        self.inner
    }
}

impl<T> Deref for Verified<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}
