//! Persistence for harvested records and the asset download queue.
//!
//! Record and queue state are each owned by one [`serial::SerialWriter`]: all
//! mutations are queued and applied one at a time, and a caller hears back
//! only after its write is durable.

pub mod archive;
pub mod dedup;
pub mod enqueue;
pub mod error;
pub mod kv;
pub mod names;
pub mod pg_kv;
pub mod queue;
pub mod records;
pub mod serial;
pub mod transfer;
pub mod worker;

pub use archive::Archive;
pub use dedup::{Admission, DedupIndex, Ticket};
pub use enqueue::{author_slug, destination_path, is_direct_media, plan_assets};
pub use error::{ArchiveError, Result};
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use names::NameStore;
pub use pg_kv::PgKvStore;
pub use queue::AssetQueue;
pub use records::RecordStore;
pub use transfer::{AssetTransfer, TransferError};
pub use worker::{DrainReport, QueueWorker};
