// Serial device discovery

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};

use crate::config::LinkConfig;
use crate::error::LinkError;

/// A serial port as reported by the operating system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    pub fn from_info(info: &SerialPortInfo) -> Self {
        match &info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name.clone(),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
                serial_number: usb.serial_number.clone(),
            },
            _ => Self {
                name: info.port_name.clone(),
                ..Self::default()
            },
        }
    }

    /// Port name, manufacturer and product joined for keyword matching
    pub fn description(&self) -> String {
        [
            Some(self.name.as_str()),
            self.manufacturer.as_deref(),
            self.product.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Every serial port on the system
pub fn list_ports() -> Result<Vec<PortDescriptor>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Enumeration {
        reason: e.to_string(),
    })?;
    Ok(ports.iter().map(PortDescriptor::from_info).collect())
}

/// Ports that look like a supported sensing device, in enumeration order
pub fn list_candidate_ports(config: &LinkConfig) -> Result<Vec<PortDescriptor>, LinkError> {
    let candidates: Vec<PortDescriptor> = list_ports()?
        .into_iter()
        .filter(|port| is_candidate(port, config))
        .collect();

    tracing::debug!(
        "[SerialLink] {} candidate port(s): {:?}",
        candidates.len(),
        candidates.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
    );
    Ok(candidates)
}

/// Vendor id on the allowlist, or a description keyword match
pub fn is_candidate(port: &PortDescriptor, config: &LinkConfig) -> bool {
    if port
        .vid
        .is_some_and(|vid| config.vendor_ids.contains(&vid))
    {
        return true;
    }

    let description = port.description().to_lowercase();
    config
        .description_keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && description.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, product: Option<&str>) -> PortDescriptor {
        PortDescriptor {
            name: name.to_string(),
            vid: Some(vid),
            pid: Some(0x0043),
            manufacturer: None,
            product: product.map(str::to_string),
            serial_number: None,
        }
    }

    #[test]
    fn test_vendor_allowlist_matches() {
        let config = LinkConfig::default();
        assert!(is_candidate(&usb("/dev/ttyACM0", 0x2341, None), &config));
        assert!(is_candidate(&usb("COM5", 0x1A86, None), &config));
        assert!(!is_candidate(&usb("/dev/ttyUSB3", 0x1234, None), &config));
    }

    #[test]
    fn test_description_keywords_match_case_insensitively() {
        let config = LinkConfig::default();
        assert!(is_candidate(
            &usb("/dev/ttyUSB0", 0x1234, Some("USB-Serial CH340")),
            &config
        ));

        let bluetooth = PortDescriptor {
            name: "/dev/rfcomm0".to_string(),
            ..PortDescriptor::default()
        };
        assert!(!is_candidate(&bluetooth, &config));

        let named = PortDescriptor {
            name: "/dev/cu.Arduino-Mega".to_string(),
            ..PortDescriptor::default()
        };
        assert!(is_candidate(&named, &config));
    }

    #[test]
    fn test_empty_filters_match_nothing() {
        let config = LinkConfig {
            vendor_ids: Vec::new(),
            description_keywords: vec![String::new()],
            ..LinkConfig::default()
        };
        assert!(!is_candidate(&usb("COM1", 0x2341, Some("Arduino")), &config));
    }
}
