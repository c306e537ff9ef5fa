//! Signed transaction payloads handed to the confirmation and bundle engines.

use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

/// Errors returned while wrapping signed transaction payloads.
#[derive(Debug, Error)]
pub enum SignedTransactionError {
    /// Bytes could not be decoded or a transaction could not be encoded.
    #[error("failed to encode/decode signed transaction bytes: {source}")]
    Codec {
        /// Bincode codec error.
        source: Box<bincode::ErrorKind>,
    },
    /// Transaction carries no signature to identify it by.
    #[error("transaction carries no signature")]
    MissingSignature,
}

/// Already-signed, already-serialized transaction plus its identifying signature.
///
/// The signature is the first transaction signature, which is what the ledger uses to
/// de-duplicate rebroadcasts of the same payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignedTransaction {
    /// Wire-format transaction bytes.
    bytes: Vec<u8>,
    /// Content-derived identifier.
    signature: Signature,
}

impl SignedTransaction {
    /// Serializes a signed `VersionedTransaction`.
    ///
    /// # Errors
    ///
    /// Returns [`SignedTransactionError`] when the transaction has no signature or cannot be
    /// serialized.
    pub fn from_transaction(tx: &VersionedTransaction) -> Result<Self, SignedTransactionError> {
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or(SignedTransactionError::MissingSignature)?;
        let bytes =
            bincode::serialize(tx).map_err(|source| SignedTransactionError::Codec { source })?;
        Ok(Self { bytes, signature })
    }

    /// Wraps externally signed wire bytes, decoding them once to recover the signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignedTransactionError`] when the bytes do not decode into a signed
    /// transaction.
    pub fn from_wire_bytes(bytes: Vec<u8>) -> Result<Self, SignedTransactionError> {
        let tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|source| SignedTransactionError::Codec { source })?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or(SignedTransactionError::MissingSignature)?;
        Ok(Self { bytes, signature })
    }

    /// Returns the identifying signature.
    #[must_use]
    pub const fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns the raw wire bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
