//! Auto-detection of synth boards among serial ports
//!
//! Matching is table driven: known USB vendor/product pairs plus
//! case-insensitive substrings of the port description. The table is loaded
//! from configuration and can be replaced at runtime.

use serde::{Deserialize, Serialize};

use super::PortDescriptor;

/// Board family inferred from port metadata (informational only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardType {
    #[default]
    Unknown,
    Arduino,
    Teensy,
}

impl std::fmt::Display for BoardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardType::Unknown => write!(f, "unknown"),
            BoardType::Arduino => write!(f, "Arduino"),
            BoardType::Teensy => write!(f, "Teensy"),
        }
    }
}

/// A known USB vendor/product pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsbIdRule {
    pub vid: u16,
    pub pid: u16,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub board: BoardType,
}

/// A description keyword and the board family it implies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeywordRule {
    pub keyword: String,
    #[serde(default)]
    pub board: BoardType,
}

/// Detection table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DetectRules {
    #[serde(default)]
    pub usb_ids: Vec<UsbIdRule>,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
}

impl Default for DetectRules {
    fn default() -> Self {
        let usb = |vid, pid, label: &str, board| UsbIdRule {
            vid,
            pid,
            label: label.to_string(),
            board,
        };
        let keyword = |keyword: &str, board| KeywordRule {
            keyword: keyword.to_string(),
            board,
        };

        Self {
            usb_ids: vec![
                usb(0x2341, 0x0043, "Arduino Uno", BoardType::Arduino),
                usb(0x2341, 0x0001, "Arduino Uno (older)", BoardType::Arduino),
                usb(0x2341, 0x0010, "Arduino Mega", BoardType::Arduino),
                usb(0x2341, 0x003D, "Arduino Due", BoardType::Arduino),
                usb(0x1A86, 0x7523, "CH340", BoardType::Unknown),
                usb(0x0403, 0x6001, "FTDI FT232", BoardType::Unknown),
                usb(0x16C0, 0x0483, "Teensy (Serial)", BoardType::Teensy),
                usb(0x16C0, 0x0489, "Teensy (Serial + MIDI)", BoardType::Teensy),
            ],
            keywords: vec![
                keyword("arduino", BoardType::Arduino),
                keyword("teensy", BoardType::Teensy),
                keyword("ch340", BoardType::Unknown),
                keyword("ftdi", BoardType::Unknown),
            ],
        }
    }
}

impl DetectRules {
    /// Rules with no entries; nothing is ever detected
    pub fn empty() -> Self {
        Self {
            usb_ids: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Does this port look like a synth board?
    pub fn matches(&self, port: &PortDescriptor) -> bool {
        self.match_usb(port).is_some() || self.match_keyword(port).is_some()
    }

    /// Board family for a port, `Unknown` when nothing says otherwise
    pub fn board_type(&self, port: &PortDescriptor) -> BoardType {
        let from_usb = self.match_usb(port).map(|r| r.board);
        let from_keyword = self.match_keyword(port).map(|r| r.board);

        [from_usb, from_keyword]
            .into_iter()
            .flatten()
            .find(|b| *b != BoardType::Unknown)
            .unwrap_or(BoardType::Unknown)
    }

    /// First port in enumeration order that matches
    pub fn find<'a>(&self, ports: &'a [PortDescriptor]) -> Option<&'a PortDescriptor> {
        ports.iter().find(|p| self.matches(p))
    }

    fn match_usb(&self, port: &PortDescriptor) -> Option<&UsbIdRule> {
        let (vid, pid) = (port.vid?, port.pid?);
        self.usb_ids.iter().find(|r| r.vid == vid && r.pid == pid)
    }

    fn match_keyword(&self, port: &PortDescriptor) -> Option<&KeywordRule> {
        let description = port.description.to_lowercase();
        if description.is_empty() {
            return None;
        }
        self.keywords
            .iter()
            .find(|r| !r.keyword.is_empty() && description.contains(&r.keyword.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, description: &str, ids: Option<(u16, u16)>) -> PortDescriptor {
        PortDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            vid: ids.map(|(v, _)| v),
            pid: ids.map(|(_, p)| p),
        }
    }

    #[test]
    fn test_usb_id_match() {
        let rules = DetectRules::default();
        let teensy = port("/dev/ttyACM0", "", Some((0x16C0, 0x0489)));
        assert!(rules.matches(&teensy));
        assert_eq!(rules.board_type(&teensy), BoardType::Teensy);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let rules = DetectRules::default();
        let uno = port("COM3", "Arduino Uno (COM3)", None);
        assert!(rules.matches(&uno));
        assert_eq!(rules.board_type(&uno), BoardType::Arduino);
    }

    #[test]
    fn test_clone_chip_is_unknown_board() {
        let rules = DetectRules::default();
        let clone = port("/dev/ttyUSB0", "USB2.0-Serial", Some((0x1A86, 0x7523)));
        assert!(rules.matches(&clone));
        assert_eq!(rules.board_type(&clone), BoardType::Unknown);
    }

    #[test]
    fn test_unrelated_port_does_not_match() {
        let rules = DetectRules::default();
        let modem = port("/dev/ttyS0", "Bluetooth modem", Some((0x1234, 0x5678)));
        assert!(!rules.matches(&modem));
        assert!(!DetectRules::empty().matches(&port("x", "arduino", None)));
    }

    #[test]
    fn test_find_returns_first_match() {
        let rules = DetectRules::default();
        let ports = vec![
            port("/dev/ttyS0", "", None),
            port("/dev/ttyACM0", "Teensyduino", None),
            port("/dev/ttyACM1", "Arduino", None),
        ];
        assert_eq!(rules.find(&ports).unwrap().name, "/dev/ttyACM0");
    }

    #[test]
    fn test_rules_from_yaml() {
        let yaml = r#"
usb_ids:
  - { vid: 0x1209, pid: 0x0001, label: "Custom board", board: teensy }
keywords:
  - keyword: genesis
"#;
        let rules: DetectRules = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.usb_ids[0].vid, 0x1209);
        assert!(rules.matches(&port("p", "GenesisEngine", None)));
        assert_eq!(
            rules.board_type(&port("p", "", Some((0x1209, 0x0001)))),
            BoardType::Teensy
        );
    }
}
