use super::Conn;

/// Notified once per connection, from whichever task observed the closure.
/// Implementations must not block.
pub trait Events: Send + Sync {
    fn conn_closed(&self, conn: &Conn);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl Events for NoopEvents {
    fn conn_closed(&self, _conn: &Conn) {}
}
