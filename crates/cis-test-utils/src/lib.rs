// cis-test-utils: Shared test utilities for the intercept suite.
//
// Provides a WebSocket client for integration testing of the interceptor's
// frame protocol.

pub mod ws_client;

pub use ws_client::InterceptWsClient;
