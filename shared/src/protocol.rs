/// Bytes of snapshot header preceding the first record
pub const SNAPSHOT_HEADER_LEN: usize = 100;

/// The record loop runs while strictly more than this many bytes remain
pub const RECORD_TRAILER_SLACK: usize = 3;

/// Safety rating byte meaning "no requirement"
pub const SAFETY_RATING_NONE: u8 = 255;

/// Content pack tag for tracks without one
pub const DEFAULT_DLC: &str = "base";

/// Country code recorded when enrichment fails, so it is not retried
pub const UNKNOWN_COUNTRY: &str = "un";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
