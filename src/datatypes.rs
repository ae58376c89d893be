use crate::error::SectionError;

type ErrCode = i16;

/// `hw_type` reported by plugs; bulbs and strips report something else
pub const PLUG_TYPE: &str = "IOT.SMARTPLUGSWITCH";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceData {
    pub system: System,
    pub emeter: Option<SectionResult<Emeter>>,
}

impl DeviceData {
    pub fn sysinfo(self) -> SysInfo {
        self.system.sysinfo
    }

    /// Realtime reading carried by the same reply, if the device has a meter
    pub fn realtime(&self) -> Option<&EmeterRealtime> {
        match &self.emeter {
            Some(SectionResult::Ok(emeter)) => match &emeter.realtime {
                SectionResult::Ok(realtime) => Some(realtime),
                SectionResult::Err(_) => None,
            },
            _ => None,
        }
    }

    pub fn has_emeter(&self) -> bool {
        self.realtime().is_some()
    }
}

// Errors are tried first: a successful section never carries `err_msg`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum SectionResult<T> {
    Err(SectionError),
    Ok(T),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct System {
    #[serde(rename = "get_sysinfo")]
    pub sysinfo: SysInfo,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SysInfo {
    #[serde(default)]
    pub sw_ver: String,
    #[serde(default)]
    pub hw_ver: String,
    #[serde(rename = "type")]
    #[serde(alias = "mic_type")]
    pub hw_type: String,
    pub model: String,
    #[serde(default)]
    #[serde(alias = "mic_mac")]
    pub mac: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub alias: String,
    #[serde(default)]
    #[serde(alias = "description")]
    pub dev_name: String,
    #[serde(default)]
    pub err_code: ErrCode,
    pub rssi: Option<i32>,
    pub relay_state: Option<u8>,
    pub on_time: Option<i64>,
    pub feature: Option<String>,
    pub led_off: Option<u8>,
}

impl SysInfo {
    pub fn is_plug(&self) -> bool {
        self.hw_type == PLUG_TYPE
    }

    pub fn is_on(&self) -> Option<bool> {
        self.relay_state.map(|relay_state| relay_state > 0)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Emeter {
    #[serde(rename = "get_realtime")]
    pub realtime: SectionResult<EmeterRealtime>,
}

/// Older firmware reports floats in base units, newer firmware integers in
/// milli-units.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EmeterRealtime {
    pub power: Option<f64>,
    pub power_mw: Option<u32>,
    pub voltage: Option<f64>,
    pub voltage_mv: Option<u32>,
    pub current: Option<f64>,
    pub current_ma: Option<u32>,
    pub total: Option<f64>,
    pub total_wh: Option<u32>,
    pub err_code: ErrCode,
}

impl EmeterRealtime {
    pub fn watts(&self) -> Option<f64> {
        self.power
            .or_else(|| self.power_mw.map(|mw| f64::from(mw) / 1000.0))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub const HS100_JSON: &'static str = r#"{
      "system": {
        "get_sysinfo": {
          "sw_ver": "1.5.8 Build 180815 Rel.135935",
          "hw_ver": "2.1",
          "type": "IOT.SMARTPLUGSWITCH",
          "model": "HS100(UK)",
          "mac": "00:00:00:00:00:00",
          "dev_name": "Smart Wi-Fi Plug",
          "alias": "Switch Two",
          "relay_state": 0,
          "on_time": 0,
          "active_mode": "none",
          "feature": "TIM",
          "updating": 0,
          "icon_hash": "",
          "rssi": -53,
          "led_off": 0,
          "longitude_i": 123,
          "latitude_i": 3456,
          "hwId": "00000000000000000000000000000000",
          "fwId": "00000000000000000000000000000000",
          "deviceId": "0000000000000000000000000000000000000000",
          "oemId": "FDD18403D5E8DB3613009C820963E018",
          "next_action": {
            "type": -1
          },
          "ntc_state": 0,
          "err_code": 0
        }
      },
      "emeter": {
        "get_realtime": {
          "err_code": -1,
          "err_msg": "module not support"
        }
      },
      "smartlife.iot.dimmer": {
        "err_code": -1,
        "err_msg": "module not support"
      },
      "smartlife.iot.common.emeter": {
        "err_code": -1,
        "err_msg": "module not support"
      },
      "smartlife.iot.smartbulb.lightingservice": {
        "err_code": -1,
        "err_msg": "module not support"
      }
    }"#;

    pub const HS110_JSON: &'static str = r#"{
      "system": {
        "get_sysinfo": {
          "err_code": 0,
          "sw_ver": "1.2.5 Build 171213 Rel.095335",
          "hw_ver": "1.0",
          "type": "IOT.SMARTPLUGSWITCH",
          "model": "HS110(UK)",
          "mac": "00:00:00:00:00:00",
          "deviceId": "0000000000000000000000000000000000000000",
          "hwId": "00000000000000000000000000000000",
          "fwId": "00000000000000000000000000000000",
          "oemId": "90AEEA7AECBF1A879FCA3C104C58C4D8",
          "alias": "Switch One",
          "dev_name": "Wi-Fi Smart Plug With Energy Monitoring",
          "icon_hash": "",
          "relay_state": 1,
          "on_time": 12521,
          "active_mode": "schedule",
          "feature": "TIM:ENE",
          "updating": 0,
          "rssi": -40,
          "led_off": 0,
          "latitude": 0.0,
          "longitude": 0.0
        }
      },
      "emeter": {
        "get_realtime": {
          "current": 0.0,
          "voltage": 300.00,
          "power": 1.0,
          "total": 1.0,
          "err_code": 0
        }
      },
      "smartlife.iot.dimmer": {
        "err_code": -1,
        "err_msg": "module not support"
      },
      "smartlife.iot.common.emeter": {
        "err_code": -1,
        "err_msg": "module not support"
      },
      "smartlife.iot.smartbulb.lightingservice": {
        "err_code": -1,
        "err_msg": "module not support"
      }
    }"#;

    pub const KP115_JSON: &'static str = r#"{
      "system": {
        "get_sysinfo": {
          "sw_ver": "1.0.16 Build 210205 Rel.163735",
          "hw_ver": "1.0",
          "model": "KP115(EU)",
          "deviceId": "8006000000000000000000000000000000000001",
          "oemId": "00000000000000000000000000000000",
          "hwId": "00000000000000000000000000000000",
          "rssi": -61,
          "latitude_i": 0,
          "longitude_i": 0,
          "alias": "Kettle",
          "status": "new",
          "obd_src": "tplink",
          "mic_type": "IOT.SMARTPLUGSWITCH",
          "feature": "TIM:ENE",
          "mac": "00:00:00:00:00:01",
          "updating": 0,
          "led_off": 0,
          "relay_state": 1,
          "on_time": 3600,
          "icon_hash": "",
          "dev_name": "Smart Wi-Fi Plug Mini",
          "active_mode": "none",
          "next_action": {"type": -1},
          "err_code": 0
        }
      },
      "emeter": {
        "get_realtime": {
          "current_ma": 9120,
          "voltage_mv": 230512,
          "power_mw": 2100250,
          "total_wh": 1234,
          "err_code": 0
        }
      }
    }"#;

    pub const LB110_JSON: &'static str = r#"{
      "system": {
        "get_sysinfo": {
          "model": "LB110(EU)",
          "alias": "Lamp",
          "mic_type": "IOT.SMARTBULB",
          "deviceId": "0000000000000000000000000000000000000002",
          "err_code": 0
        }
      }
    }"#;

    #[test]
    fn deserialise_hs100() {
        let result = serde_json::from_str::<DeviceData>(&HS100_JSON).unwrap();

        assert!(!result.has_emeter());
        let sysinfo = result.sysinfo();
        assert_eq!(sysinfo.hw_ver, "2.1");
        assert_eq!(sysinfo.model, "HS100(UK)");
        assert!(sysinfo.is_plug());
        assert_eq!(Some(false), sysinfo.is_on());
    }

    #[test]
    fn deserialise_hs110() {
        let result = serde_json::from_str::<DeviceData>(&HS110_JSON).unwrap();

        assert_eq!(Some(1.0), result.realtime().and_then(EmeterRealtime::watts));
        let sysinfo = result.sysinfo();
        assert_eq!(sysinfo.hw_ver, "1.0");
        assert_eq!(sysinfo.model, "HS110(UK)");
        assert_eq!(Some(true), sysinfo.is_on());
    }

    #[test]
    fn deserialise_kp115_milli_units() {
        let result = serde_json::from_str::<DeviceData>(&KP115_JSON).unwrap();

        let realtime = result.realtime().unwrap();
        assert_eq!(Some(2100.25), realtime.watts());
        assert_eq!(Some(230512), realtime.voltage_mv);
        assert!(result.sysinfo().is_plug());
    }

    #[test]
    fn bulbs_are_not_plugs() {
        let result = serde_json::from_str::<DeviceData>(&LB110_JSON).unwrap();

        assert!(!result.has_emeter());
        let sysinfo = result.sysinfo();
        assert!(!sysinfo.is_plug());
        assert_eq!(None, sysinfo.is_on());
    }

    #[test]
    fn section_error_is_tried_first() {
        let section: SectionResult<Emeter> =
            serde_json::from_str(r#"{"err_code": -2001, "err_msg": "Module not support"}"#)
                .unwrap();

        match section {
            SectionResult::Err(err) => assert_eq!(-2001, err.err_code),
            other => panic!("expected section error, got {:?}", other),
        }
    }
}
