use crate::ifname;
use crate::textfsm::{Template, TemplateResult};
use std::collections::BTreeMap;
use std::fmt;

pub const SHOW_IP_INTERFACE_BRIEF: &str = "show ip interface brief";
pub const SHOW_IPV6_INTERFACE_BRIEF: &str = "show ipv6 interface brief";
pub const SHOW_ARP_DETAIL: &str = "show arp detail | include via";
pub const SHOW_IPV6_NEIGHBORS: &str = "show ipv6 neighbors";

const IPV4_INTERFACES_TEMPLATE: &str = include_str!("templates/show_ip_interface_brief.textfsm");
const IPV6_INTERFACES_TEMPLATE: &str = include_str!("templates/show_ipv6_interface_brief.textfsm");
const ARP_TEMPLATE: &str = include_str!("templates/show_arp_detail.textfsm");
const IPV6_NEIGHBORS_TEMPLATE: &str = include_str!("templates/show_ipv6_neighbors.textfsm");

const UNASSIGNED: &str = "unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Ipv4,
    Ipv6,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Ipv4 => "ipv4",
            Protocol::Ipv6 => "ipv6",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Incomplete,
}

impl NeighborState {
    /// Entry kind of `show arp detail`. `Interface` entries are the
    /// device's own addresses and are not neighbors.
    fn from_arp(kind: &str) -> Option<Self> {
        match kind {
            "Dynamic" => Some(NeighborState::Reachable),
            "Incomplete" => Some(NeighborState::Incomplete),
            _ => None,
        }
    }

    /// State column of `show ipv6 neighbors`
    fn from_ipv6(state: &str) -> Option<Self> {
        match state {
            "REACH" => Some(NeighborState::Reachable),
            "STALE" | "DELAY" | "PROBE" => Some(NeighborState::Stale),
            "INCMP" => Some(NeighborState::Incomplete),
            _ => None,
        }
    }
}

/// A neighbor table entry, keyed by the long interface name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub interface: String,
    pub state: NeighborState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NeighborCounts {
    pub reachable: f64,
    pub stale: f64,
    pub incomplete: f64,
}

/// Count neighbors per seeded interface. Neighbors on interfaces outside
/// the seed are ignored; seeded interfaces without neighbors count zero.
pub fn aggregate(seed: &[String], neighbors: &[Neighbor]) -> BTreeMap<String, NeighborCounts> {
    let mut counts: BTreeMap<String, NeighborCounts> = seed
        .iter()
        .map(|name| (ifname::canonical(name), NeighborCounts::default()))
        .collect();

    for neighbor in neighbors {
        let Some(entry) = counts.get_mut(&neighbor.interface) else {
            continue;
        };
        match neighbor.state {
            NeighborState::Reachable => entry.reachable += 1.0,
            NeighborState::Stale => entry.stale += 1.0,
            NeighborState::Incomplete => entry.incomplete += 1.0,
        }
    }
    counts
}

pub struct Templates {
    ipv4_interfaces: Template,
    ipv6_interfaces: Template,
    arp: Template,
    ipv6_neighbors: Template,
}

impl Templates {
    pub fn load() -> TemplateResult<Self> {
        Ok(Self {
            ipv4_interfaces: Template::parse(IPV4_INTERFACES_TEMPLATE)?,
            ipv6_interfaces: Template::parse(IPV6_INTERFACES_TEMPLATE)?,
            arp: Template::parse(ARP_TEMPLATE)?,
            ipv6_neighbors: Template::parse(IPV6_NEIGHBORS_TEMPLATE)?,
        })
    }

    /// Interfaces with an IPv4 address, in output order
    pub fn ipv4_interfaces(&self, output: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in self.ipv4_interfaces.extract(output) {
            let address = record.get("ADDRESS");
            if address.is_empty() || address == UNASSIGNED {
                continue;
            }
            push_unique(&mut names, record.get("INTERFACE"));
        }
        names
    }

    /// Interfaces with any IPv6 address, in output order
    pub fn ipv6_interfaces(&self, output: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in self.ipv6_interfaces.extract(output) {
            if record.get("ADDRESS") == UNASSIGNED {
                continue;
            }
            push_unique(&mut names, record.get("INTERFACE"));
        }
        names
    }

    pub fn ipv4_neighbors(&self, output: &str) -> Vec<Neighbor> {
        self.arp
            .extract(output)
            .iter()
            .filter_map(|record| {
                Some(Neighbor {
                    interface: ifname::canonical(record.get("INTERFACE")),
                    state: NeighborState::from_arp(record.get("KIND"))?,
                })
            })
            .collect()
    }

    pub fn ipv6_neighbors(&self, output: &str) -> Vec<Neighbor> {
        self.ipv6_neighbors
            .extract(output)
            .iter()
            .filter_map(|record| {
                Some(Neighbor {
                    interface: ifname::canonical(record.get("INTERFACE")),
                    state: NeighborState::from_ipv6(record.get("STATE"))?,
                })
            })
            .collect()
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPV4_INTERFACES: &str = "#show ip interface brief
Interface              IP-Address      OK? Method Status                Protocol
Vlan1                  100.64.6.1      YES manual up                    up
TwentyFiveGigE1/0/1    unassigned      YES unset  up                    up
";

    const IPV6_INTERFACES: &str = "#show ipv6 interface brief
Vlan1                  [up/up]
    unassigned
Vlan2                  [up/down]
    FE80::AA4F:B1FF:FE58:949F
    2001:DB8:F53F:CC::1
";

    const ARP: &str = "#show arp detail | include via
Interface, via Vlan2, last updated 71582 minutes ago.
Interface, via Vlan11, last updated 71582 minutes ago.
Incomplete, via Vlan11, last updated 0 minute ago.
Incomplete, via Vlan11, last updated 0 minute ago.
Incomplete, via Vlan11, last updated 0 minute ago.
Incomplete, via Vlan11, last updated 0 minute ago.
Incomplete, via Vlan11, last updated 0 minute ago.
Dynamic, via TwentyFiveGigE1/0/48, last updated 2 minutes ago.
";

    const IPV6_NEIGHBORS: &str = "#show ipv6 neighbors
IPv6 Address                              Age Link-layer Addr State Interface
2001:DB8:EC39:0:5060:3BE5:FD4F:8311         0 00AA.c21e.30cd  REACH Vl2
2001:DB8:EC39:0:5CC5:1F6B:A000:BD61         0 00aa.4da6.0a6a  STALE Vl2
2001:DB8:EC39:0:7196:69BD:9C3:710E          0 00aa.f063.7713  STALE Vl2
2001:DB8:F70E:AA:ECA:FBFF:FE28:75B5         0 00aa.fb28.75b5  STALE Vl4
2001:DB8:F70E:AA:1D17:6BCF:3B7A:8C45        0 00aa.6235.2e60  REACH Vl4
2001:DB8:F70E:AA:38F1:E51F:DF31:C659        0 -               INCMP Vl4
2001:DB8:F70E:AA:4CBC:52C2:AD18:3C82        0 -               INCMP Vl4
2001:DB8:F70E:AA:5944:CD47:32B6:2FF5        0 00AA.5d40.a801  STALE Vl4
2001:DB8:F70E:AA:74BC:C4B9:4C24:4680        0 -               INCMP Vl4
2001:DB8:F70E:AA:81A7:E629:3C31:7CD5        0 00aa.c648.495d  REACH Vl4
2001:DB8:F70E:AA:B051:88B3:DECD:A058        0 00AA.24d2.698e  STALE Vl4
2001:DB8:F70E:AA:C533:89DF:1BDF:852F        0 00aa.2346.e561  STALE Vl4
2001:DB8:F70E:AA:C59C:B68E:B848:A0B3        0 00aa.994b.cca0  STALE Vl4
2001:DB8:F70E:AA:E089:21CD:A1E6:CEB5        0 00aa.880e.5a12  STALE Vl4
";

    fn templates() -> Templates {
        Templates::load().unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ipv4_interfaces_need_an_address() {
        let interfaces = templates().ipv4_interfaces(IPV4_INTERFACES);
        assert_eq!(interfaces, names(&["Vlan1"]));
    }

    #[test]
    fn test_ipv6_interfaces_need_an_address() {
        let interfaces = templates().ipv6_interfaces(IPV6_INTERFACES);
        assert_eq!(interfaces, names(&["Vlan2"]));
    }

    #[test]
    fn test_ipv4_neighbor_counts() {
        let neighbors = templates().ipv4_neighbors(ARP);
        let counts = aggregate(&names(&["Vlan11", "Vlan2"]), &neighbors);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts["Vlan11"].incomplete, 5.0);
        assert_eq!(counts["Vlan2"].reachable, 0.0);
        assert!(!counts.contains_key("TwentyFiveGigE1/0/48"));
    }

    #[test]
    fn test_ipv6_neighbor_counts() {
        let neighbors = templates().ipv6_neighbors(IPV6_NEIGHBORS);
        assert_eq!(neighbors.len(), 14);

        let counts = aggregate(&names(&["Vlan2", "Vlan4"]), &neighbors);
        assert_eq!(counts["Vlan2"].stale, 2.0);
        assert_eq!(counts["Vlan2"].reachable, 1.0);
        assert_eq!(counts["Vlan4"].stale, 6.0);
        assert_eq!(counts["Vlan4"].reachable, 2.0);
        assert_eq!(counts["Vlan4"].incomplete, 3.0);
        assert!(!counts.contains_key("Vl4"));
    }

    #[test]
    fn test_aggregate_is_pure() {
        let seed = names(&["Vl4"]);
        let neighbors = vec![Neighbor {
            interface: "Vlan4".to_string(),
            state: NeighborState::Stale,
        }];

        let first = aggregate(&seed, &neighbors);
        let second = aggregate(&seed, &neighbors);
        assert_eq!(first, second);
        assert_eq!(first["Vlan4"].stale, 1.0);
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(NeighborState::from_ipv6("DELAY"), Some(NeighborState::Stale));
        assert_eq!(NeighborState::from_ipv6("PROBE"), Some(NeighborState::Stale));
        assert_eq!(NeighborState::from_ipv6("????"), None);
        assert_eq!(NeighborState::from_arp("Dynamic"), Some(NeighborState::Reachable));
        assert_eq!(NeighborState::from_arp("Interface"), None);
    }
}
