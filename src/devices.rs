use std::{
    convert::TryFrom,
    net::{AddrParseError, IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    datatypes::DeviceData,
    error::{Error, Result, SectionError},
    protocol::{Protocol, PORT},
};

/// Query answered in one round trip with both sysinfo and the energy meter
pub const QUERY: &str = r#"{
    "system": {"get_sysinfo": null},
    "emeter": {"get_realtime": null}
}"#;

/// Parse `ip` or `ip:port`; devices listen on 9999 when no port is given
pub fn parse_addr(addr: &str) -> std::result::Result<SocketAddr, AddrParseError> {
    SocketAddr::from_str(addr).or_else(|_| Ok(SocketAddr::new(IpAddr::from_str(addr)?, PORT)))
}

/// A smart plug at a known address
pub struct Plug {
    addr: SocketAddr,
    protocol: Arc<dyn Protocol>,
}

impl Plug {
    pub fn new(addr: SocketAddr, protocol: Arc<dyn Protocol>) -> Self {
        Self { addr, protocol }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send a message to the plug and return its parsed response
    pub async fn send<T: DeserializeOwned>(&self, msg: &str) -> Result<T> {
        Ok(serde_json::from_str::<T>(
            &self.protocol.send(self.addr, msg).await?,
        )?)
    }

    /// Sysinfo and realtime meter reading together
    pub async fn poll(&self) -> Result<DeviceData> {
        self.send::<DeviceData>(QUERY).await
    }

    pub async fn switch_on(&self) -> Result<()> {
        self.set_relay_state(true).await
    }

    pub async fn switch_off(&self) -> Result<()> {
        self.set_relay_state(false).await
    }

    pub async fn set_relay_state(&self, on: bool) -> Result<()> {
        let command = json!({
            "system": {"set_relay_state": {"state": u8::from(on)}}
        })
        .to_string();
        let resp: Value = self.send(&command).await?;
        check_section(&resp["system"]["set_relay_state"])
    }
}

// Command replies only carry `err_code`, plus `err_msg` on failure.
fn check_section(section: &Value) -> Result<()> {
    match section.get("err_code").and_then(Value::as_i64) {
        Some(0) => Ok(()),
        Some(err_code) => {
            let err_msg = section["err_msg"].as_str().unwrap_or_default().to_string();
            match i16::try_from(err_code) {
                Ok(err_code) => Err(Error::from(SectionError { err_code, err_msg })),
                Err(_) => Err(Error::Other(format!(
                    "Device error {} out of range: {}",
                    err_code, err_msg
                ))),
            }
        }
        None => Err(Error::Other(String::from("Missing err_code in response"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::tests::{HS100_JSON, HS110_JSON};
    use crate::protocol::ProtocolMock;

    fn plug(protocol: &Arc<ProtocolMock>) -> Plug {
        Plug::new("10.0.0.2:9999".parse().unwrap(), protocol.clone())
    }

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            SocketAddr::from(([192, 168, 1, 7], 9999)),
            parse_addr("192.168.1.7").unwrap()
        );
        assert_eq!(
            SocketAddr::from(([192, 168, 1, 7], 10000)),
            parse_addr("192.168.1.7:10000").unwrap()
        );
        assert!(parse_addr("kettle").is_err());
    }

    #[tokio::test]
    async fn test_plug_submit_success() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from(HS100_JSON)));

        let device_data: DeviceData = plug(&protocol).send("{}").await.unwrap();

        assert_eq!("Switch Two", device_data.sysinfo().alias);
    }

    #[tokio::test]
    async fn test_plug_submit_failure() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from("invalid")));

        assert!(plug(&protocol).send::<DeviceData>("{}").await.is_err());
    }

    #[tokio::test]
    async fn test_plug_poll() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from(HS110_JSON)));

        let data = plug(&protocol).poll().await.unwrap();

        assert!(data.has_emeter());
        assert_eq!(Some(true), data.sysinfo().is_on());
        assert_eq!(QUERY, protocol.requests()[0].1);
    }

    #[tokio::test]
    async fn test_switch_on_sends_relay_state() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from(
            r#"{"system":{"set_relay_state":{"err_code":0}}}"#,
        )));

        plug(&protocol).switch_on().await.unwrap();

        let requests = protocol.requests();
        assert_eq!(1, requests.len());
        let sent: Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(1, sent["system"]["set_relay_state"]["state"]);
    }

    #[tokio::test]
    async fn test_switch_off_reports_device_error() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from(
            r#"{"system":{"set_relay_state":{"err_code":-3,"err_msg":"invalid argument"}}}"#,
        )));

        match plug(&protocol).switch_off().await {
            Err(Error::TPLink(err)) => assert_eq!("invalid argument", err.err_msg),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_err_code() {
        let protocol = Arc::new(ProtocolMock::new());
        protocol.push_response(Ok(String::from(
            r#"{"system":{"set_relay_state":{"err_code":70000,"err_msg":"odd firmware"}}}"#,
        )));

        match plug(&protocol).switch_on().await {
            Err(Error::Other(msg)) => assert!(msg.contains("70000")),
            other => panic!("expected out of range error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_section_without_err_code() {
        assert!(check_section(&json!({})).is_err());
        assert!(check_section(&json!({"err_code": 0})).is_ok());
    }
}
