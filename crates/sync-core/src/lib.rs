//! Shared data model and external-collaborator contracts for the document
//! sync engine: revision identity, change/query options, checkpoint
//! encoding, the error hierarchy, and the `Database` trait the storage
//! engine must satisfy.

pub mod checkpoint;
pub mod error;
pub mod options;
pub mod revision;
pub mod store;

pub use checkpoint::{canonical_json, checkpoint_id, CheckpointInputs, RemoteCheckpoint};
pub use error::SyncError;
pub use options::{ChangesOptions, ContentOptions, QueryOptions};
pub use revision::{envelope, generation_of, RevisionList, RevisionRef};
pub use store::{
    AllDocsResult, AttachmentBlob, AttachmentMeta, ChangeReceiver, Database, DocRow, OpenRevResult,
};
