//! Process-wide directory of listening engines for the shared-memory protocol.
//!
//! A server engine registers its address here; a client connecting to that
//! address gets one end of a fresh `ChannelTransport` and the server's accept
//! loop receives the other.

use std::sync::LazyLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;

use crate::transport::ChannelTransport;
use crate::transport::Result;
use crate::transport::TransportError;

type Acceptor = mpsc::UnboundedSender<ChannelTransport>;

static DIRECTORY: LazyLock<DashMap<String, Acceptor>> = LazyLock::new(DashMap::new);

/// Starts accepting connections at `address`.
pub fn listen(address: &str) -> Result<mpsc::UnboundedReceiver<ChannelTransport>> {
    match DIRECTORY.entry(address.to_string()) {
        Entry::Occupied(_) => Err(TransportError::Io(format!("{} is already listening", address))),
        Entry::Vacant(slot) => {
            let (tx, rx) = mpsc::unbounded_channel();
            slot.insert(tx);
            Ok(rx)
        }
    }
}

/// Stops accepting connections at `address`. Established connections are unaffected.
pub fn unlisten(address: &str) {
    DIRECTORY.remove(address);
}

/// Opens a connection to the engine listening at `address`.
pub fn connect(address: &str) -> Result<ChannelTransport> {
    let acceptor = DIRECTORY
        .get(address)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| TransportError::Unreachable(address.to_string()))?;

    let (local, remote) = ChannelTransport::pair();
    acceptor
        .send(remote)
        .map_err(|_| TransportError::Unreachable(address.to_string()))?;
    Ok(local)
}
