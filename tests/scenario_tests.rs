//! End-to-end scenarios: YAML hierarchy in, rendered files out.

use netplan_rs::{Parser, State};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(root: &Path, name: &str, content: &str) {
    let dir = root.join("etc/netplan");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

fn import(root: &Path) -> Result<State, netplan_rs::NetplanError> {
    let mut parser = Parser::new();
    parser.load_yaml_hierarchy(root)?;
    State::import(parser)
}

#[test]
fn minimal_dhcp_ethernet() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        "network: {version: 2, renderer: networkd, ethernets: {eth0: {dhcp4: true}}}",
    );

    let state = import(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();

    let network = fs::read_to_string(
        temp.path().join("run/systemd/network/10-netplan-eth0.network"),
    )
    .unwrap();
    assert_eq!(
        network,
        "[Match]\nName=eth0\n\n[Network]\nLinkLocalAddressing=no\nDHCP=ipv4\n\n\
         [DHCP]\nRouteMetric=100\nUseMTU=false\n"
    );
}

#[test]
fn vlan_on_ethernet() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0: {dhcp4: true}
  vlans:
    vlan10: {id: 10, link: eth0, addresses: [10.10.0.2/24]}
"#,
    );

    let state = import(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();

    let parent = fs::read_to_string(
        temp.path().join("run/systemd/network/10-netplan-eth0.network"),
    )
    .unwrap();
    assert!(parent.contains("VLAN=vlan10"));

    let netdev = fs::read_to_string(
        temp.path().join("run/systemd/network/10-netplan-vlan10.netdev"),
    )
    .unwrap();
    assert!(netdev.contains("Kind=vlan\n\n[VLAN]\nId=10\n"));
}

#[test]
fn wifi_psk_networkd() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        r#"
network:
  version: 2
  renderer: networkd
  wifis:
    wlan0:
      dhcp4: true
      access-points:
        "mySSID":
          password: "abcdef123456"
"#,
    );

    let state = import(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();

    let conf_path = temp.path().join("run/netplan/wpa-wlan0.conf");
    let conf = fs::read_to_string(&conf_path).unwrap();
    assert!(conf.contains(
        "network={\n  ssid=\"mySSID\"\n  key_mgmt=WPA-PSK\n  psk=\"abcdef123456\"\n}\n"
    ));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&conf_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    assert!(
        temp.path()
            .join("run/systemd/system/netplan-wpa-wlan0.service")
            .exists()
    );
    assert!(
        temp.path()
            .join("run/systemd/system/systemd-networkd.service.wants/netplan-wpa-wlan0.service")
            .symlink_metadata()
            .is_ok()
    );
    let network = fs::read_to_string(
        temp.path().join("run/systemd/network/10-netplan-wlan0.network"),
    )
    .unwrap();
    assert!(network.contains("DHCP=ipv4"));
    assert!(network.contains("RouteMetric=600"));
}

#[test]
fn duplicate_default_route() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0: {addresses: [10.0.0.2/24], gateway4: 10.0.0.1}
    eth1: {addresses: [10.0.1.2/24], gateway4: 10.0.0.1}
"#,
    );

    let err = import(temp.path()).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("eth0") && text.contains("eth1"), "{text}");
    assert!(text.contains("AF_INET"));
    assert!(text.contains("table: main"));
    assert!(text.contains("metric: default"));
    // Import failed, so nothing was generated
    assert!(!temp.path().join("run/systemd/network").exists());
}

#[test]
fn nm_keyfile_round_trip() {
    let keyfile_input = "\
[connection]
id=c1
uuid=626dd384-8b3d-3690-9511-192b2c79b3fd
type=ethernet
interface-name=enp0s3

[ipv4]
method=auto
";
    let temp = TempDir::new().unwrap();
    let yaml_path = netplan_rs::import_keyfile(keyfile_input, temp.path()).unwrap();
    assert!(yaml_path.ends_with(
        "etc/netplan/90-NM-626dd384-8b3d-3690-9511-192b2c79b3fd.yaml"
    ));

    let state = import(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();

    let rendered = fs::read_to_string(temp.path().join(
        "run/NetworkManager/system-connections/netplan-NM-626dd384-8b3d-3690-9511-192b2c79b3fd.nmconnection",
    ))
    .unwrap();

    // Equal modulo key ordering
    let input = netplan_rs::keyfile::KeyFile::parse(keyfile_input).unwrap();
    let output = netplan_rs::keyfile::KeyFile::parse(&rendered).unwrap();
    let mut input_entries: Vec<_> = input.iter().collect();
    let mut output_entries: Vec<_> = output.iter().collect();
    input_entries.sort();
    output_entries.sort();
    assert_eq!(input_entries, output_entries);
}

#[test]
fn null_overlay_deletes_definition() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0: {dhcp4: true}
    eth1: {dhcp4: true, routes: [{to: default, via: 10.0.0.1}]}
"#,
    );

    // First pass: both definitions render
    let state = import(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();
    let eth0_file = temp.path().join("run/systemd/network/10-netplan-eth0.network");
    assert!(eth0_file.exists());

    // Second pass with a null overlay deleting eth0
    let mut parser = Parser::new();
    parser.load_yaml_hierarchy(temp.path()).unwrap();
    parser
        .load_nullable_fields("network: {ethernets: {eth0: null}}".as_bytes())
        .unwrap();
    let state = State::import(parser).unwrap();
    assert!(state.get_netdef("eth0").is_none());
    assert!(state.get_netdef("eth1").is_some());

    state.generate(temp.path()).unwrap();
    assert!(!eth0_file.exists());
    assert!(
        temp.path()
            .join("run/systemd/network/10-netplan-eth1.network")
            .exists()
    );
}

#[test]
fn layered_hierarchy_shadowing() {
    let temp = TempDir::new().unwrap();
    for dir in ["lib/netplan", "etc/netplan", "run/netplan"] {
        fs::create_dir_all(temp.path().join(dir)).unwrap();
    }
    fs::write(
        temp.path().join("lib/netplan/00-vendor.yaml"),
        "network: {version: 2, ethernets: {eth0: {dhcp4: false, mtu: 1500}}}",
    )
    .unwrap();
    // etc shadows lib for the same basename
    fs::write(
        temp.path().join("etc/netplan/00-vendor.yaml"),
        "network: {version: 2, ethernets: {eth0: {dhcp4: true, mtu: 1500}}}",
    )
    .unwrap();
    // later basename overrides
    fs::write(
        temp.path().join("run/netplan/90-local.yaml"),
        "network: {version: 2, ethernets: {eth0: {mtu: 9000}}}",
    )
    .unwrap();

    let state = import(temp.path()).unwrap();
    let def = state.get_netdef("eth0").unwrap();
    assert_eq!(def.dhcp4, Some(true));
    assert_eq!(def.mtu, Some(9000));
    assert_eq!(state.sources().len(), 2);
}

#[test]
fn validation_only_writes_nothing() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "01.yaml",
        "network: {version: 2, renderer: networkd, ethernets: {eth0: {dhcp4: true}}}",
    );

    let mut parser = Parser::new();
    parser.set_flags(netplan_rs::ParserFlags {
        ignore_errors: false,
        validation_only: true,
    });
    parser.load_yaml_hierarchy(temp.path()).unwrap();
    let state = State::import(parser).unwrap();
    state.generate(temp.path()).unwrap();
    assert!(!temp.path().join("run/systemd/network").exists());
}
