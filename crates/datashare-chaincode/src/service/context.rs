//! # Transaction Context
//!
//! Everything one invocation needs from the host: the stub. The caller's
//! identity is re-derived from the stub's creator on every request for it,
//! never cached on records.

use crate::domain::identity::CallerIdentity;
use crate::errors::ChaincodeResult;
use crate::ports::outbound::ChaincodeStub;
use std::fmt;
use std::sync::Arc;

/// Per-invocation context handed to every operation.
#[derive(Clone)]
pub struct TxContext {
    stub: Arc<dyn ChaincodeStub>,
}

impl TxContext {
    pub fn new(stub: Arc<dyn ChaincodeStub>) -> Self {
        Self { stub }
    }

    /// Host world state.
    #[must_use]
    pub fn stub(&self) -> &dyn ChaincodeStub {
        self.stub.as_ref()
    }

    /// Principal of the invoking client.
    ///
    /// # Errors
    ///
    /// `CertificateParse` when the creator's certificate is malformed.
    pub fn caller(&self) -> ChaincodeResult<CallerIdentity> {
        CallerIdentity::from_credential(self.stub.creator())
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("creator_mspid", &self.stub.creator().org())
            .finish()
    }
}
