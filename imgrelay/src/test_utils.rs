//! Helpers for building a relay and test server without touching the real GitHub API.

use crate::config::{Config, GithubConfig, GithubCredentials};
use crate::relay::{FixedClock, ImageRelay};
use crate::store::{GithubContentStore, InMemoryContentStore};
use crate::{AppState, build_router};
use axum_test::TestServer;
use std::sync::Arc;
use url::Url;
use wiremock::MockServer;

pub const TEST_TIMESTAMP: i64 = 1_700_000_000_000;

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

pub fn test_credentials() -> GithubCredentials {
    GithubCredentials {
        token: "ghp_test".to_string(),
        owner: "octo".to_string(),
        repo: "gallery".to_string(),
    }
}

/// A relay with no remote store, as when credentials are missing.
pub fn unconfigured_relay() -> ImageRelay {
    ImageRelay::new(None, Arc::new(FixedClock(TEST_TIMESTAMP)), "images")
}

pub fn memory_relay(store: Arc<InMemoryContentStore>) -> ImageRelay {
    ImageRelay::new(Some(store), Arc::new(FixedClock(TEST_TIMESTAMP)), "images")
}

/// A relay talking to a wiremock server standing in for the GitHub API as `octo/gallery`.
pub fn github_relay(server: &MockServer) -> ImageRelay {
    let config = GithubConfig {
        api_url: Url::parse(&server.uri()).expect("mock server uri"),
        ..GithubConfig::default()
    };
    let store = GithubContentStore::new(test_credentials(), &config).expect("Failed to create GitHub store");
    ImageRelay::new(Some(Arc::new(store)), Arc::new(FixedClock(TEST_TIMESTAMP)), "images")
}

pub fn create_test_server(relay: ImageRelay) -> TestServer {
    create_test_server_with_config(test_config(), relay)
}

pub fn create_test_server_with_config(config: Config, relay: ImageRelay) -> TestServer {
    let state = AppState::builder().config(config).relay(Arc::new(relay)).build();
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}
