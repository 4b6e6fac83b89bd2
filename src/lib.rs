// AlpineBits guest request bridge: website submissions in, PMS pulls out

pub mod capabilities;
pub mod config;
pub mod envelope;
pub mod ingestion;
pub mod lifecycle;
pub mod model;
pub mod server;
pub mod store;
pub mod xml_codec;
pub mod xml_response;

// Re-export key types for convenience
pub use capabilities::{intersect, server_capabilities, Capabilities};
pub use config::{ProtocolAuthConfig, ServiceConfig};
pub use envelope::{Action, EnvelopeError};
pub use ingestion::{IngestError, Ingestion};
pub use lifecycle::{Lifecycle, LifecycleError, ProtocolReply};
pub use model::{GuestRequest, Hotel, RequestStatus, Submission};
pub use server::{router, AppState};
pub use store::{GuestRequestStore, MemoryStore, SqliteStore, StoreError};
pub use xml_codec::CodecError;
