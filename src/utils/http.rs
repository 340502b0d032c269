use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Image generation routinely takes tens of seconds; stage deadlines are
/// enforced by the orchestrator, so this is only a backstop.
const HTTP_TIMEOUT: Duration = Duration::from_secs(180);

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client")
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
