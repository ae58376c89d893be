use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tokio::{net::TcpStream, time::timeout};

use crate::error::{Error, Result};

/// Port every device listens on, for both TCP commands and UDP discovery
pub const PORT: u16 = 9999;

const MAX_RESPONSE_LEN: usize = 64 * 1024;

// Prepare and encrypt message to send to the device
// see: https://www.softscheck.com/en/reverse-engineering-tp-link-hs110/
pub fn encrypt(plain: &str) -> Result<Vec<u8>> {
    let msgbytes = plain.as_bytes();
    let mut cipher = Vec::with_capacity(msgbytes.len() + 4);
    cipher.write_u32::<BigEndian>(msgbytes.len() as u32)?;

    let mut key = 0xAB;
    for byte in msgbytes {
        key ^= byte;
        cipher.write_u8(key)?;
    }

    Ok(cipher)
}

// Decrypt received string
// see: https://www.softscheck.com/en/reverse-engineering-tp-link-hs110/
pub fn decrypt(cipher: &mut [u8]) -> String {
    let mut key = 0xAB;
    let mut next: u8;

    for item in cipher.iter_mut() {
        next = *item;
        *item ^= key;
        key = next;
    }

    String::from_utf8_lossy(cipher).into_owned()
}

#[async_trait]
pub trait Protocol: Send + Sync {
    async fn send(&self, addr: SocketAddr, msg: &str) -> Result<String>;
}

/// Length prefixed request/response over TCP
pub struct DefaultProtocol {
    timeout: Duration,
}

impl DefaultProtocol {
    pub fn new(timeout: Duration) -> DefaultProtocol {
        DefaultProtocol { timeout }
    }

    async fn exchange(addr: SocketAddr, payload: &[u8]) -> Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(payload).await?;

        let mut header = [0_u8; 4];
        stream.read_exact(&mut header).await?;
        let length = BigEndian::read_u32(&header) as usize;
        if length > MAX_RESPONSE_LEN {
            return Err(Error::Other(format!(
                "Response from {} too large ({} bytes)",
                addr, length
            )));
        }

        let mut resp = vec![0_u8; length];
        stream.read_exact(&mut resp).await?;

        Ok(decrypt(&mut resp))
    }
}

impl Default for DefaultProtocol {
    fn default() -> Self {
        DefaultProtocol::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Protocol for DefaultProtocol {
    async fn send(&self, addr: SocketAddr, msg: &str) -> Result<String> {
        let payload = encrypt(msg)?;
        match timeout(self.timeout, Self::exchange(addr, &payload)).await {
            Ok(resp) => resp,
            Err(_) => Err(Error::Timeout(addr)),
        }
    }
}

#[cfg(test)]
pub struct ProtocolMock {
    requests: std::sync::Mutex<Vec<(SocketAddr, String)>>,
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
}

#[cfg(test)]
impl ProtocolMock {
    pub fn new() -> ProtocolMock {
        ProtocolMock {
            requests: std::sync::Mutex::new(Vec::new()),
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn push_response(&self, resp: Result<String>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    pub fn requests(&self) -> Vec<(SocketAddr, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Protocol for ProtocolMock {
    async fn send(&self, addr: SocketAddr, msg: &str) -> Result<String> {
        self.requests.lock().unwrap().push((addr, msg.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::from("")))
    }
}
