/// API resource management routes.
pub(crate) mod apis;

/// Authentication-related routes.
pub(crate) mod auth;

/// Code execution routes.
pub(crate) mod execute;

/// API key management routes.
pub(crate) mod keys;

/// Public marketplace routes.
pub(crate) mod marketplace;
