//! Trust token resolution.
//!
//! Only this bootstrap layer touches the process environment; the core
//! receives the token by injection.

use trustsock_rpc::TrustToken;

/// Environment key carrying the shared secret.
pub const TRUST_ID_ENV: &str = "TRUST_ID";

/// Load a local `.env` file into the environment, if one exists.
///
/// Existing process variables win over file entries; a missing file is not
/// an error.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Resolve the configured trust token from the environment.
///
/// Returns `None` when the key is unset or empty; the caller decides
/// whether that is fatal.
#[must_use]
pub fn trust_token_from_env() -> Option<TrustToken> {
    std::env::var(TRUST_ID_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .map(TrustToken::new)
}
