use loro::{ExportMode, LoroDoc, VersionVector};

use crate::error::ReplicaError;

/// The replicated document held by a room (and by each client).
///
/// An update blob is a loro update; a state vector is an encoded loro
/// version vector.
pub struct Replica {
    doc: LoroDoc,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl Replica {
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// A replica with a fixed peer id, so edits from distinct replicas never collide.
    pub fn with_peer_id(peer: u64) -> Result<Self, ReplicaError> {
        let doc = LoroDoc::new();
        doc.set_peer_id(peer)
            .map_err(|e| ReplicaError::Import(e.to_string()))?;
        Ok(Self { doc })
    }

    /// Start from a persisted blob (snapshot or update).
    pub fn from_blob(blob: &[u8]) -> Result<Self, ReplicaError> {
        let replica = Self::new();
        replica.apply_update(blob)?;
        Ok(replica)
    }

    pub fn apply_update(&self, blob: &[u8]) -> Result<(), ReplicaError> {
        self.doc
            .import(blob)
            .map(|_| ())
            .map_err(|e| ReplicaError::Import(e.to_string()))
    }

    /// Everything this replica has that `since` lacks; the whole document when `since` is `None`.
    pub fn encode_update(&self, since: Option<&[u8]>) -> Result<Vec<u8>, ReplicaError> {
        let exported = match since {
            Some(vector) => {
                let from = decode_vector(vector)?;
                self.doc.export(ExportMode::updates(&from))
            }
            None => self.doc.export(ExportMode::Snapshot),
        };
        exported.map_err(|e| ReplicaError::Export(e.to_string()))
    }

    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.doc.oplog_vv().encode()
    }

    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Direct access for local edits.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }
}

pub fn decode_vector(vector: &[u8]) -> Result<VersionVector, ReplicaError> {
    VersionVector::decode(vector).map_err(|e| ReplicaError::Vector(e.to_string()))
}
