//! API key distribution: round-robin rotation and capacity-aware batches.

mod batch;
mod rotator;

pub use batch::{
    filter_successful, summary, BatchError, BatchHandler, BatchOptions, BatchOutcome,
    BatchRequest, BatchResult, BatchSummary, DistributionPlan, KeyAssignment, KeyCapacity,
};
pub use rotator::{ApiKeyRotator, KeyPoolError};

/// Log-safe form of an API key: its first four characters.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdefghijklmnop"), "abcd...");
        assert_eq!(mask_key("ab"), "ab...");
    }
}
