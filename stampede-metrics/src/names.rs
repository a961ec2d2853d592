//! Names of the metrics recorded by the engine itself

/// Counter: completed iterations
pub const ITERATIONS: &str = "iterations";

/// Trend: wall-clock duration of each iteration, in milliseconds
pub const ITERATION_DURATION: &str = "iteration_duration";

/// Counter: iterations that returned an error, tagged with `error_kind`
pub const ITERATION_ERRORS: &str = "iteration_errors";

/// Gauge: live workers per scenario
pub const ACTIVE_WORKERS: &str = "active_workers";

/// Counter: workers aborted after the graceful-stop window
pub const FORCED_STOPS: &str = "forced_stops";

/// Rate: outcome of named checks
pub const CHECKS: &str = "checks";

/// Counter: HTTP requests issued
pub const HTTP_REQS: &str = "http_reqs";

/// Trend: HTTP request duration, in milliseconds
pub const HTTP_REQ_DURATION: &str = "http_req_duration";

/// Rate: HTTP requests whose status was not expected
pub const HTTP_REQ_FAILED: &str = "http_req_failed";

/// Counter: failed operations, tagged by endpoint
pub const ERRORS: &str = "errors";

/// Rate: responses served from a cache
pub const CACHE_HIT_RATE: &str = "cache_hit_rate";

/// Tag keys set by the engine
pub mod tags {
    pub const SCENARIO: &str = "scenario";
    pub const ERROR_KIND: &str = "error_kind";
    pub const CHECK: &str = "check";
    pub const ENDPOINT: &str = "endpoint";
    pub const OPERATION: &str = "operation";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
}
