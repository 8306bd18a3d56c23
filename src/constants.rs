//! # System Constants
//!
//! Core constants that define the operational boundaries of the provisioning
//! orchestration engine: HTTP-like status codes relied upon by the task
//! services, default tunables, and well-known property keys.

/// HTTP-like status codes carried by store and adapter failures
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const ACCEPTED: u16 = 202;
    pub const NOT_MODIFIED: u16 = 304;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const NOT_FOUND: u16 = 404;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const BAD_GATEWAY: u16 = 502;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// Default tunables used when configuration does not override them
pub mod defaults {
    /// Adapter operations are retried once after a fixed delay
    pub const OPERATION_MAX_RETRIES: u32 = 1;
    pub const OPERATION_RETRY_DELAY_SECONDS: u64 = 5;

    /// Session acquisition (login) is retried once after a longer delay
    pub const LOGIN_MAX_RETRIES: u32 = 1;
    pub const LOGIN_RETRY_DELAY_SECONDS: u64 = 15;

    /// Sessions expire twelve hours after they were written
    pub const SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;

    /// Periodic maintenance interval; the session sweep margin is a multiple of it
    pub const MAINTENANCE_INTERVAL_SECONDS: u64 = 10;
    pub const SWEEP_MARGIN_MULTIPLIER: u32 = 2;

    pub const MAX_BUILD_RETRIES: u32 = 3;
    pub const BUILD_POLL_INTERVAL_SECONDS: u64 = 3;
    pub const BASE_IMAGE_POLL_INTERVAL_SECONDS: u64 = 5;
    pub const MAX_POLLS_PER_BUILD_ATTEMPT: u32 = 200;

    pub const PKS_POLL_INTERVAL_SECONDS: u64 = 60;
    pub const PKS_MAX_POLL_FAILURES: u32 = 10;

    pub const DEFAULT_OPERATION_TIMEOUT_SECONDS: u64 = 30;
    pub const LONG_OPERATION_TIMEOUT_SECONDS: u64 = 10 * 60;
    pub const TASK_EXPIRATION_SECONDS: u64 = 5 * 60 * 60;
    pub const EXPIRATION_CHECK_INTERVAL_SECONDS: u64 = 60;

    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}

/// Runtime configuration property keys
pub mod properties {
    pub const BUILD_IMAGE_RETRIES_COUNT: &str = "build.closure.image.retries.count";
}

/// Custom property keys understood by the PKS adapter
pub mod pks_properties {
    pub const CLUSTER_NAME: &str = "__pksClusterName";
    pub const PLAN_NAME: &str = "__pksPlanName";
    pub const MASTER_HOST: &str = "__pksMasterHost";
    pub const WORKER_INSTANCES: &str = "__pksWorkerInstances";
    pub const PREFER_MASTER_IP: &str = "__pksPreferMasterIP";
}

/// Tenant link prefixes used for project scoping
pub mod tenancy {
    pub const PROJECT_PREFIX: &str = "/projects/";
    pub const TENANT_PREFIX: &str = "/tenants/";
    pub const GROUP_SEGMENT: &str = "/groups/";
}

/// Compute power state considered live for host selection
pub const POWER_STATE_ON: &str = "ON";
