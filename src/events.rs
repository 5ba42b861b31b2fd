use crate::error::LoadError;

/// Progress report handed to the loading callback.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingStatus {
    pub is_loading: bool,
    /// Settled share of the current batch, 0 to 100.
    pub progress: f32,
    pub current_item: Option<String>,
}

impl LoadingStatus {
    pub fn idle() -> Self {
        Self {
            is_loading: false,
            progress: 100.0,
            current_item: None,
        }
    }
}

/// Result of one finished decode, as observed by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub path: String,
    pub result: Result<(u32, u32), LoadError>,
}

impl LoadOutcome {
    pub fn is_ready(&self) -> bool {
        self.result.is_ok()
    }
}

/// Commands accepted by the globe host loop.
#[derive(Debug, Clone)]
pub enum GlobeCommand {
    Shake,
    Advance,
    SetSequence(Vec<String>),
}
