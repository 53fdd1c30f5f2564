use serde::{Deserialize, Serialize};

/// A destination's per-stream state.
///
/// The stored form is text. Decoding never fails: a missing or unreadable
/// blob becomes the default state.
pub trait DestinationState: Clone + Default + Send + Sync + 'static {
    fn from_stored(stored: Option<&str>) -> Self;

    fn to_stored(&self) -> String;

    /// Whether the stream's final table must be rebuilt from the raw table.
    fn needs_soft_reset(&self) -> bool;

    fn with_soft_reset(&self, needs_soft_reset: bool) -> Self;
}

/// State carrying only the soft reset flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimumDestinationState {
    #[serde(default)]
    pub needs_soft_reset: bool,
}

impl DestinationState for MinimumDestinationState {
    fn from_stored(stored: Option<&str>) -> Self {
        stored
            .and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or_default()
    }

    fn to_stored(&self) -> String {
        serde_json::json!({ "needsSoftReset": self.needs_soft_reset }).to_string()
    }

    fn needs_soft_reset(&self) -> bool {
        self.needs_soft_reset
    }

    fn with_soft_reset(&self, needs_soft_reset: bool) -> Self {
        Self { needs_soft_reset }
    }
}
