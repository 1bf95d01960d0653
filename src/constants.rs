//! Constants

// for authorized sessions
pub(crate) const SESSION_COOKIE_NAME: &str = "session_token";
pub(crate) const SESSION_DURATION_SECS: i64 = 2592000;

// for magic-link sign in requests
pub(crate) const VERIFY_KEY_PREFIX: &str = "verify:";
pub(crate) const VERIFY_EXPIRY_SECONDS: usize = 86400;

// for pending oauth authorizations
pub(crate) const OAUTH_STATE_PREFIX: &str = "oauth:";
pub(crate) const OAUTH_STATE_EXPIRY_SECONDS: usize = 600;

/// Provider id used for the passwordless email flow.
pub(crate) const EMAIL_PROVIDER_ID: &str = "email";

// pages
pub(crate) const SIGN_IN_PATH: &str = "/sign-in";
pub(crate) const VERIFY_REQUEST_PATH: &str = "/verify-request";
pub(crate) const ERROR_PATH: &str = "/error";

/// Error code the sign-in page understands when an OAuth email already belongs to someone else.
pub(crate) const ACCOUNT_NOT_LINKED: &str = "OAuthAccountNotLinked";
