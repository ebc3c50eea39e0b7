use postharvest_common::Record;
use serde::Serialize;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HarvestEvent {
    New { index: usize, record: Record },
    Replace { index: usize, record: Record },
    ScanComplete,
}
