//! Test support for `ranroute`.
//!
//! Provides a scripted [`MockTransport`] to drive streaming connections
//! without a network, sample messages for both streams and serialised log
//! capture.
//!
//! ```rust
//! use ranroute::{ConnectionConfig, Upstream};
//! use ranroute_testing::{MockTransport, connection_over, upstream_message};
//!
//! # async fn example() {
//! let transport = MockTransport::new();
//! transport.push_message(&upstream_message(1));
//! let connection = connection_over::<Upstream>(&transport, ConnectionConfig::default());
//! connection.connect().await.unwrap();
//! # }
//! ```

pub mod fixtures;
pub mod logging;
pub mod mock;

pub use fixtures::{
    TEST_TOKEN,
    connection_over,
    downstream_ack,
    downstream_result,
    mock_transport,
    test_endpoint,
    tx_window,
    upstream_message,
};
pub use logging::{LoggerHandle, logger};
pub use mock::MockTransport;
