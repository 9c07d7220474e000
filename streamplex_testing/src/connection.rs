//! Fixtures for in-process connections.

use std::sync::Arc;

use bytes::Bytes;
use rstest::fixture;
use streamplex::connection::MemoryConnection;

/// An open [`MemoryConnection`] with no listeners.
#[fixture]
pub fn open_connection() -> Arc<MemoryConnection> { MemoryConnection::open() }

/// Deliver every payload to `conn` in order.
pub fn deliver_all<I, P>(conn: &MemoryConnection, payloads: I)
where
    I: IntoIterator<Item = P>,
    P: Into<Bytes>,
{
    for payload in payloads {
        conn.deliver(payload);
    }
}
