//! Interface name canonicalization.
//!
//! Cisco commands print interface names either abbreviated (`Gi1/0/1`,
//! `Vl4`) or in full (`GigabitEthernet1/0/1`, `Vlan4`). The full name is
//! used as the key whenever records from different commands are joined.

/// Abbreviation (lowercase) to full interface type
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("fa", "FastEthernet"),
    ("gi", "GigabitEthernet"),
    ("gig", "GigabitEthernet"),
    ("tw", "TwoGigabitEthernet"),
    ("fi", "FiveGigabitEthernet"),
    ("te", "TenGigabitEthernet"),
    ("ten", "TenGigabitEthernet"),
    ("twe", "TwentyFiveGigE"),
    ("fo", "FortyGigabitEthernet"),
    ("hu", "HundredGigE"),
    ("ap", "AppGigabitEthernet"),
    ("et", "Ethernet"),
    ("eth", "Ethernet"),
    ("vl", "Vlan"),
    ("lo", "Loopback"),
    ("po", "Port-channel"),
    ("tu", "Tunnel"),
    ("se", "Serial"),
    ("di", "Dialer"),
    ("bd", "BDI"),
    ("vi", "Virtual-Access"),
];

/// Expand an abbreviated interface name, e.g. `Gi1/0/1` to
/// `GigabitEthernet1/0/1`. Returns `None` for names that are not a known
/// abbreviation, including names that are already in full form.
pub fn expand(name: &str) -> Option<String> {
    let split = name.find(|c: char| c.is_ascii_digit())?;
    let (prefix, rest) = name.split_at(split);
    if prefix.is_empty() {
        return None;
    }

    let prefix = prefix.to_ascii_lowercase();
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == prefix)
        .map(|(_, long)| format!("{}{}", long, rest))
}

/// Full form of `name`: the expansion for known abbreviations, otherwise the
/// name unchanged. Idempotent.
pub fn canonical(name: &str) -> String {
    expand(name).unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_common_abbreviations() {
        assert_eq!(expand("Gi1/0/1").as_deref(), Some("GigabitEthernet1/0/1"));
        assert_eq!(expand("Te1/1/1").as_deref(), Some("TenGigabitEthernet1/1/1"));
        assert_eq!(expand("Twe1/0/1").as_deref(), Some("TwentyFiveGigE1/0/1"));
        assert_eq!(expand("Tw1/0/1").as_deref(), Some("TwoGigabitEthernet1/0/1"));
        assert_eq!(expand("Hu1/0/49").as_deref(), Some("HundredGigE1/0/49"));
        assert_eq!(expand("Vl4").as_deref(), Some("Vlan4"));
        assert_eq!(expand("Po10").as_deref(), Some("Port-channel10"));
        assert_eq!(expand("Eth1/1").as_deref(), Some("Ethernet1/1"));
    }

    #[test]
    fn test_expand_is_case_insensitive() {
        assert_eq!(expand("gi0/0").as_deref(), Some("GigabitEthernet0/0"));
        assert_eq!(expand("VL2").as_deref(), Some("Vlan2"));
    }

    #[test]
    fn test_expand_subinterface() {
        assert_eq!(
            expand("Gi0/0/1.100").as_deref(),
            Some("GigabitEthernet0/0/1.100")
        );
    }

    #[test]
    fn test_expand_rejects_long_and_unknown_names() {
        assert_eq!(expand("GigabitEthernet1/0/1"), None);
        assert_eq!(expand("Vlan4"), None);
        assert_eq!(expand("Slot 1 Supervisor"), None);
        assert_eq!(expand("mgmt0"), None);
        assert_eq!(expand("Power Supply"), None);
        assert_eq!(expand("1/0/1"), None);
    }

    #[test]
    fn test_canonical_round_trip() {
        let names = ["Gi1/0/1", "Vl11", "Twe1/0/48", "Lo0", "Tu5", "Fa0/1"];
        for short in names {
            let long = canonical(short);
            assert_ne!(long, short);
            assert_eq!(canonical(&long), long);
            assert_eq!(canonical(&canonical(&long)), canonical(&long));
        }
    }

    #[test]
    fn test_canonical_keeps_unknown_names() {
        assert_eq!(canonical("Slot 1 Supervisor"), "Slot 1 Supervisor");
        assert_eq!(canonical("GigabitEthernet1/0/1"), "GigabitEthernet1/0/1");
    }
}
