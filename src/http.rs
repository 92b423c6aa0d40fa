//! Process-wide HTTP client with connection pooling.
//!
//! Every catalog and bottle fetch goes through this client so that
//! keep-alive connections and HTTP/2 streams are reused across the
//! whole run instead of being re-established per request.

use std::sync::OnceLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_IDLE_PER_HOST: usize = 100;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// The shared HTTP client. Lazily initialized on first use; proxy
/// settings are picked up from the environment by the builder.
pub fn client() -> &'static reqwest::Client {
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .user_agent(format!("fastbrew/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_singleton() {
        let a = client() as *const reqwest::Client;
        let b = client() as *const reqwest::Client;
        assert_eq!(a, b);
    }
}
