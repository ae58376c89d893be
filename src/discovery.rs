//! Discover devices on the local network
//!
use std::{
    collections::BTreeMap,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use tokio::{
    net::UdpSocket,
    time::{timeout_at, Instant},
};
use tracing::{debug, trace};

use crate::{
    datatypes::DeviceData,
    devices::QUERY,
    error::Result,
    protocol::{self, PORT},
};

/// Broadcast a query and collect every reply received before `timeout`.
///
/// Replies are keyed by sender so a device answering more than one of the
/// repeated broadcasts is only reported once. Results are ordered by address.
pub async fn with_timeout(timeout: Duration) -> Result<Vec<(SocketAddr, DeviceData)>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;

    let req = protocol::encrypt(QUERY)?;

    for _ in 0_u8..3 {
        socket
            .send_to(&req[4..req.len()], (Ipv4Addr::BROADCAST, PORT))
            .await?;
    }

    let deadline = Instant::now() + timeout;
    let mut buf = [0_u8; 4096];

    let mut devices = BTreeMap::new();
    while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (size, addr) = received?;
        let data = protocol::decrypt(&mut buf[0..size]);
        match serde_json::from_str::<DeviceData>(&data) {
            Ok(device_data) => {
                devices.insert(addr, device_data);
            }
            Err(err) => debug!(%addr, %err, "ignoring unparseable discovery reply"),
        }
    }
    trace!(count = devices.len(), "discovery window closed");

    Ok(devices.into_iter().collect())
}

