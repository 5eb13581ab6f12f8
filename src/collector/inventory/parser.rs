use crate::collector::{CollectError, CollectResult};
use crate::ifname;
use crate::textfsm::{Record, Template, TemplateResult};
use std::collections::HashSet;

pub const SHOW_INTERFACES_STATS: &str = "show interfaces stats";
pub const SHOW_INVENTORY: &str = "show inventory";

const INTERFACES_STATS_TEMPLATE: &str = include_str!("templates/show_interfaces_stats.textfsm");
const INVENTORY_TEMPLATE: &str = include_str!("templates/show_inventory.textfsm");
const IDPROM_TEMPLATE: &str = include_str!("templates/show_idprom.textfsm");

/// Interfaces that never carry a transceiver
const VIRTUAL_PREFIXES: [&str; 4] = ["Vlan", "Loopback", "Tunnel", "Port-channel"];

pub fn show_idprom(interface: &str) -> String {
    format!("show idprom interface {}", interface)
}

/// One field replaceable unit from `show inventory`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryItem {
    pub name: String,
    pub description: String,
    pub part_number: String,
    pub serial_number: String,
}

impl InventoryItem {
    fn from_record(record: &Record) -> Self {
        Self {
            name: record.get("NAME").to_string(),
            description: record.get("DESCR").to_string(),
            part_number: record.get("PID").to_string(),
            serial_number: record.get("SN").to_string(),
        }
    }
}

/// A pluggable optic, named by the interface it sits in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransceiverItem {
    pub name: String,
    pub description: String,
    pub vendor: String,
    pub part_number: String,
    pub serial_number: String,
}

impl TransceiverItem {
    /// Refine an inventory entry with its EEPROM contents. Fields the
    /// EEPROM leaves empty keep the inventory values.
    fn refine(item: &InventoryItem, idprom: Option<&Record>) -> Self {
        let mut transceiver = Self {
            name: item.name.clone(),
            description: item.description.clone(),
            vendor: String::new(),
            part_number: item.part_number.clone(),
            serial_number: item.serial_number.clone(),
        };
        let Some(record) = idprom else {
            return transceiver;
        };

        let description = match record.get("TYPE") {
            "" => record.get("DESCRIPTION"),
            kind => kind,
        };
        let fields = [
            (&mut transceiver.description, description),
            (&mut transceiver.vendor, record.get("VENDOR")),
            (&mut transceiver.part_number, record.get("PID")),
            (&mut transceiver.serial_number, record.get("SN")),
        ];
        for (field, value) in fields {
            if !value.is_empty() {
                *field = value.to_string();
            }
        }
        transceiver
    }
}

/// Inventory split into general items and transceivers
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classified {
    pub items: Vec<InventoryItem>,
    pub transceivers: Vec<InventoryItem>,
}

/// An entry is a transceiver when its name, or the long form of it, is a
/// known physical interface. Transceivers are renamed to the long form.
pub fn classify(entries: Vec<InventoryItem>, known: &HashSet<String>) -> Classified {
    let mut classified = Classified::default();
    for mut entry in entries {
        if known.contains(&entry.name) {
            classified.transceivers.push(entry);
            continue;
        }
        match ifname::expand(&entry.name) {
            Some(long) if known.contains(&long) => {
                entry.name = long;
                classified.transceivers.push(entry);
            }
            _ => classified.items.push(entry),
        }
    }
    classified
}

fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

pub struct Templates {
    interfaces_stats: Template,
    inventory: Template,
    idprom: Template,
}

impl Templates {
    pub fn load() -> TemplateResult<Self> {
        Ok(Self {
            interfaces_stats: Template::parse(INTERFACES_STATS_TEMPLATE)?,
            inventory: Template::parse(INVENTORY_TEMPLATE)?,
            idprom: Template::parse(IDPROM_TEMPLATE)?,
        })
    }

    /// Long names of the physical interfaces in `show interfaces stats`
    pub fn known_interfaces(&self, output: &str) -> HashSet<String> {
        self.interfaces_stats
            .extract(output)
            .iter()
            .map(|record| ifname::canonical(record.get("NAME")))
            .filter(|name| !is_virtual(name))
            .collect()
    }

    pub fn parse_inventory(&self, output: &str) -> CollectResult<Vec<InventoryItem>> {
        let items: Vec<InventoryItem> = self
            .inventory
            .extract(output)
            .iter()
            .map(InventoryItem::from_record)
            .filter(|item| !item.name.is_empty())
            .collect();

        if items.is_empty() {
            return Err(CollectError::ParseMismatch {
                command: SHOW_INVENTORY.to_string(),
                reason: "no inventory entries found".to_string(),
            });
        }
        Ok(items)
    }

    pub fn parse_idprom(&self, item: &InventoryItem, output: &str) -> TransceiverItem {
        let records = self.idprom.extract(output);
        TransceiverItem::refine(item, records.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY_OUTPUT: &str = r#"NAME: "Chassis", DESCR: "Cisco Catalyst 9500 Series Chassis"
PID: C9500-48Y4C       , VID: V04  , SN: FXS0000001

NAME: "Slot 1 Supervisor", DESCR: "Cisco Catalyst 9500 Series Router"
PID: C9500-48Y4C       , VID: V04  , SN: 456

NAME: "TwentyFiveGigE1/0/1", DESCR: "GE T"
PID: XSUEG1-M1RN-GC    , VID:      , SN: 123

NAME: "Te1/0/2", DESCR: "SFP-10GBase-LR"
PID: SFP-10G-LR        , VID: V02  , SN: ABC

NAME: "Power Supply Module 0", DESCR: "Cisco Catalyst 9500 1600W AC Power Supply"
PID: C9K-PWR-1600WAC-R , VID: V01  , SN:
"#;

    const STATS_OUTPUT: &str = "TwentyFiveGigE1/0/1
          Switching path    Pkts In   Chars In   Pkts Out  Chars Out
               Processor          0          0          0          0
             Route cache          0          0          0          0
                   Total          0          0          0          0
Interface TenGigabitEthernet1/0/2 is disabled
Vlan1
          Switching path    Pkts In   Chars In   Pkts Out  Chars Out
                   Total          0          0          0          0
Port-channel10
";

    const IDPROM_C9500: &str = "IDPROM for transceiver HundredGigE1/0/49:
  Description                               = QSFP28 optics (type 134)
  Transceiver Type:                         = QSFP 100GE DWDM2 (462)
  Product Identifier (PID)                  =
  Vendor Revision                           = 10
  Serial Number (SN)                        = 1234
  Vendor Name                               = INPHI CORP
  Vendor OUI (IEEE company ID)              = 00.21.B8 (8632)
  CLEI code                                 =
  Cisco part number                         =
  Device State                              = Enabled.
  Date code (yy/mm/dd)                      = 20/11/06
  Connector type                            = LC
  Encoding                                  =
  Nominal bitrate per channel               = 25GE (25500 Mbits/s)
";

    const IDPROM_C9200: &str = "General SFP Information
-----------------------------------------------
Identifier            :   SFP/SFP+
Ext.Identifier        :   SFP function is defined by two-wire interface ID only
Connector             :   LC connector
Transceiver
 10/40GE Comp code       :   10G BASE-LR
 SONET Comp code      :   Unknown
 GE Comp code         :   Unknown
 Link length          :   Unknown
 Media                :   Single Mode
Encoding              :   64B/66B
BR_Nominal            :   10300 Mbps
Vendor Name           :   XenOpt
Vendor Part Number    :   XTS31A-10LY-TC
Vendor Revision       :   0x56 0x30 0x32 0x20
Vendor Serial Number  :   1234
Wavelength            :   1310.00 nm
-----------------------------------------------
";

    fn templates() -> Templates {
        Templates::load().unwrap()
    }

    fn item(name: &str) -> InventoryItem {
        InventoryItem {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_inventory() {
        let items = templates().parse_inventory(INVENTORY_OUTPUT).unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(
            items[1],
            InventoryItem {
                name: "Slot 1 Supervisor".to_string(),
                description: "Cisco Catalyst 9500 Series Router".to_string(),
                part_number: "C9500-48Y4C".to_string(),
                serial_number: "456".to_string(),
            }
        );
        assert_eq!(items[2].part_number, "XSUEG1-M1RN-GC");
        assert_eq!(items[4].serial_number, "");
    }

    #[test]
    fn test_parse_inventory_serial_on_its_own_line() {
        let output = r#"NAME: "Chassis", DESCR: "Cisco ASR1001-X Chassis"
PID: ASR1001-X         , VID: V07
SN: FXS1

NAME: "Fan Tray", DESCR: "Cisco ASR1000 Fan Tray"
PID:                   , VID:
SN:

NAME: "Power Supply Module 0", DESCR: "Cisco ASR1001-X AC Power Supply"
PID: ASR1001-X-PWR-AC  , VID: V01  , SN: ART2
"#;
        let items = templates().parse_inventory(output).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Chassis", "Fan Tray", "Power Supply Module 0"]);

        assert_eq!(items[0].part_number, "ASR1001-X");
        assert_eq!(items[0].serial_number, "FXS1");
        assert_eq!(items[1].part_number, "");
        assert_eq!(items[1].serial_number, "");
        assert_eq!(items[1].description, "Cisco ASR1000 Fan Tray");
        assert_eq!(items[2].serial_number, "ART2");
    }

    #[test]
    fn test_parse_inventory_mismatch() {
        let err = templates().parse_inventory("% Invalid input\n").unwrap_err();
        assert!(matches!(err, CollectError::ParseMismatch { .. }));
    }

    #[test]
    fn test_known_interfaces_skip_virtual() {
        let known = templates().known_interfaces(STATS_OUTPUT);
        let expected: HashSet<String> = ["TwentyFiveGigE1/0/1", "TenGigabitEthernet1/0/2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(known, expected);
    }

    #[test]
    fn test_short_inventory_name_is_transceiver() {
        let known: HashSet<String> = ["GigabitEthernet1/0/1".to_string()].into_iter().collect();
        let classified = classify(vec![item("Gi1/0/1"), item("Chassis")], &known);

        assert_eq!(classified.transceivers.len(), 1);
        assert_eq!(classified.transceivers[0].name, "GigabitEthernet1/0/1");
        assert_eq!(classified.items, vec![item("Chassis")]);
    }

    #[test]
    fn test_classify_inventory_output() {
        let templates = templates();
        let known = templates.known_interfaces(STATS_OUTPUT);
        let classified = classify(templates.parse_inventory(INVENTORY_OUTPUT).unwrap(), &known);

        let names: Vec<&str> = classified.transceivers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["TwentyFiveGigE1/0/1", "TenGigabitEthernet1/0/2"]);
        assert_eq!(classified.items.len(), 3);
    }

    #[test]
    fn test_idprom_key_equals_layout() {
        let inventory = InventoryItem {
            name: "HundredGigE1/0/49".to_string(),
            description: "QSFP 100G".to_string(),
            part_number: "QSFP-100G".to_string(),
            serial_number: "INV1".to_string(),
        };
        let transceiver = templates().parse_idprom(&inventory, IDPROM_C9500);

        assert_eq!(transceiver.name, "HundredGigE1/0/49");
        assert_eq!(transceiver.description, "QSFP 100GE DWDM2");
        assert_eq!(transceiver.vendor, "INPHI CORP");
        assert_eq!(transceiver.serial_number, "1234");
        // Empty PID in the EEPROM keeps the inventory part number
        assert_eq!(transceiver.part_number, "QSFP-100G");
    }

    #[test]
    fn test_idprom_key_colon_layout() {
        let transceiver = templates().parse_idprom(&item("TenGigabitEthernet1/0/2"), IDPROM_C9200);

        assert_eq!(transceiver.description, "10G BASE-LR");
        assert_eq!(transceiver.vendor, "XenOpt");
        assert_eq!(transceiver.part_number, "XTS31A-10LY-TC");
        assert_eq!(transceiver.serial_number, "1234");
    }

    #[test]
    fn test_idprom_without_record_keeps_inventory() {
        let inventory = InventoryItem {
            name: "TwentyFiveGigE1/0/1".to_string(),
            description: "GE T".to_string(),
            part_number: "XSUEG1-M1RN-GC".to_string(),
            serial_number: "123".to_string(),
        };
        let transceiver = templates().parse_idprom(&inventory, "");

        assert_eq!(transceiver.name, inventory.name);
        assert_eq!(transceiver.description, "GE T");
        assert_eq!(transceiver.vendor, "");
        assert_eq!(transceiver.serial_number, "123");
    }
}
