//! Live-page side of the harvester: host seam, capture state machine, scan
//! scheduling with auto-scroll, and the control-surface facade.

pub mod autoscroll;
pub mod capture;
pub mod events;
pub mod harvester;
pub mod host;
pub mod marking;
pub mod scan;
pub mod session;
pub mod settings;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use autoscroll::{AutoScroll, ScrollDecision};
pub use capture::{rejection, CaptureController, CaptureOutcome, Rejection};
pub use events::HarvestEvent;
pub use harvester::{export_records, HarvestStatus, Harvester};
pub use host::{HostPage, MutationBatch, SnapshotPage};
pub use marking::{ContainerMarks, Mark};
pub use scan::{ScanReport, Scanner};
pub use session::{run_session, SessionControl, SessionEnd};
pub use settings::HarvestSettings;
