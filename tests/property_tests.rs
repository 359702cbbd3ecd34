//! Cross-cutting guarantees: merge order-invariance, idempotent
//! generation, round-tripping, passthrough preservation, cleanup bounds
//! and file modes.

use netplan_rs::{Parser, State};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn import(root: &Path) -> State {
    let mut parser = Parser::new();
    parser.load_yaml_hierarchy(root).unwrap();
    State::import(parser).unwrap()
}

fn dump(state: &State) -> String {
    let mut out = Vec::new();
    state.dump_yaml(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

/// Two trees whose per-basename winners are the same files produce the
/// same state, no matter which directories the losers sat in.
#[test]
fn merge_order_invariance_by_basename() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    let winner_one = "network: {version: 2, ethernets: {eth0: {dhcp4: true}}}";
    let winner_two = "network: {version: 2, ethernets: {eth0: {mtu: 9000}, eth1: {dhcp6: true}}}";

    // Tree A: winners in etc, a shadowed loser in lib
    fs::create_dir_all(a.path().join("lib/netplan")).unwrap();
    fs::create_dir_all(a.path().join("etc/netplan")).unwrap();
    fs::write(
        a.path().join("lib/netplan/10-a.yaml"),
        "network: {version: 2, ethernets: {eth0: {dhcp4: false, mtu: 1280}}}",
    )
    .unwrap();
    fs::write(a.path().join("etc/netplan/10-a.yaml"), winner_one).unwrap();
    fs::write(a.path().join("etc/netplan/20-b.yaml"), winner_two).unwrap();

    // Tree B: the same winners, one promoted to run
    fs::create_dir_all(b.path().join("etc/netplan")).unwrap();
    fs::create_dir_all(b.path().join("run/netplan")).unwrap();
    fs::write(b.path().join("etc/netplan/10-a.yaml"), "network: {version: 2}").unwrap();
    fs::write(b.path().join("run/netplan/10-a.yaml"), winner_one).unwrap();
    fs::write(b.path().join("etc/netplan/20-b.yaml"), winner_two).unwrap();

    assert_eq!(dump(&import(a.path())), dump(&import(b.path())));
}

/// cleanup+generate twice over unchanged input yields identical bytes.
#[test]
fn generation_is_idempotent() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("etc/netplan")).unwrap();
    fs::write(
        temp.path().join("etc/netplan/01.yaml"),
        r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0: {dhcp4: true}
  bridges:
    br0: {interfaces: [eth0], addresses: [10.0.0.2/24]}
  vlans:
    vlan10: {id: 10, link: br0, addresses: [10.10.0.2/24]}
"#,
    )
    .unwrap();

    let state = import(temp.path());
    state.generate(temp.path()).unwrap();
    let collect = |root: &Path| -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![root.join("run")];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.is_file() {
                    files.push((
                        path.strip_prefix(root).unwrap().display().to_string(),
                        fs::read(&path).unwrap(),
                    ));
                }
            }
        }
        files.sort();
        files
    };

    let first = collect(temp.path());
    state.generate(temp.path()).unwrap();
    let second = collect(temp.path());
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

/// parse -> emit -> parse over the recognized key set is a fixed point.
#[test]
fn typed_round_trip() {
    let input = r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0:
      match:
        macaddress: "00:11:22:33:44:55"
      set-name: "lan0"
      wakeonlan: true
      mtu: 9000
      dhcp4: true
      dhcp4-overrides:
        use-dns: false
        route-metric: 50
      nameservers:
        addresses: ["8.8.8.8", "2001:4860:4860::8888"]
        search: ["example.com"]
      routes:
        - to: "10.0.0.0/8"
          via: "10.0.0.1"
          metric: 42
      routing-policy:
        - from: "10.0.0.0/8"
          table: 100
  bonds:
    bond0:
      interfaces: [eth0]
      parameters:
        mode: "802.3ad"
        lacp-rate: fast
        mii-monitor-interval: 100
      addresses: ["10.1.0.2/24"]
  vlans:
    vlan10:
      id: 10
      link: bond0
      addresses: ["10.10.0.2/24"]
"#;
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("etc/netplan")).unwrap();
    fs::write(temp.path().join("etc/netplan/01.yaml"), input).unwrap();
    let first_dump = dump(&import(temp.path()));

    let again = TempDir::new().unwrap();
    fs::create_dir_all(again.path().join("etc/netplan")).unwrap();
    fs::write(again.path().join("etc/netplan/01.yaml"), &first_dump).unwrap();
    let second_dump = dump(&import(again.path()));

    assert_eq!(first_dump, second_dump);
}

/// Unrecognized keyfile entries survive import and re-render verbatim.
#[test]
fn nm_passthrough_preservation() {
    let keyfile_input = "\
[connection]
id=myconn
uuid=2b22e237-6d1c-4996-b9f4-3bd0c2150e4f
type=ethernet
interface-name=enp1s0
permissions=user:alice:;

[ethernet]
auto-negotiate=true

[ipv4]
method=auto
dns-priority=42

[proxy]
method=none
";
    let temp = TempDir::new().unwrap();
    netplan_rs::import_keyfile(keyfile_input, temp.path()).unwrap();

    let state = import(temp.path());
    let def = state
        .get_netdef("NM-2b22e237-6d1c-4996-b9f4-3bd0c2150e4f")
        .unwrap();
    let passthrough = &def.networkmanager.as_ref().unwrap().passthrough;
    assert_eq!(
        passthrough.get("connection.permissions").map(String::as_str),
        Some("user:alice:;")
    );
    assert_eq!(
        passthrough.get("ethernet.auto-negotiate").map(String::as_str),
        Some("true")
    );
    assert_eq!(
        passthrough.get("proxy.method").map(String::as_str),
        Some("none")
    );

    state.generate(temp.path()).unwrap();
    let rendered = fs::read_to_string(temp.path().join(
        "run/NetworkManager/system-connections/netplan-NM-2b22e237-6d1c-4996-b9f4-3bd0c2150e4f.nmconnection",
    ))
    .unwrap();
    for line in [
        "permissions=user:alice:;",
        "auto-negotiate=true",
        "dns-priority=42",
        "method=none",
    ] {
        assert!(rendered.contains(line), "missing {line} in:\n{rendered}");
    }
}

/// Cleanup only ever touches the renderer's own files.
#[test]
fn cleanup_bound() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("etc/netplan")).unwrap();
    fs::write(
        temp.path().join("etc/netplan/01.yaml"),
        "network: {version: 2, renderer: networkd, ethernets: {eth0: {dhcp4: true}}}",
    )
    .unwrap();

    // Foreign files in the output directories
    let foreign = [
        "run/systemd/network/25-custom.network",
        "run/udev/rules.d/70-local.rules",
        "run/NetworkManager/system-connections/home.nmconnection",
        "run/systemd/system/my.service",
    ];
    for path in foreign {
        let full = temp.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, "keep me").unwrap();
    }

    let state = import(temp.path());
    state.generate(temp.path()).unwrap();
    state.generate(temp.path()).unwrap();

    for path in foreign {
        assert!(temp.path().join(path).exists(), "{path} was deleted");
    }
}

/// Secret-bearing files are 0600, others 0640, directories 0755.
#[cfg(unix)]
#[test]
fn file_mode_discipline() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("etc/netplan")).unwrap();
    fs::write(
        temp.path().join("etc/netplan/01.yaml"),
        r#"
network:
  version: 2
  renderer: networkd
  ethernets:
    eth0: {dhcp4: true}
  wifis:
    wlan0:
      dhcp4: true
      access-points:
        "net": {password: "abcdef123456"}
"#,
    )
    .unwrap();
    let state = import(temp.path());
    state.generate(temp.path()).unwrap();

    let mode_of = |path: &str| {
        fs::metadata(temp.path().join(path))
            .unwrap()
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode_of("run/netplan/wpa-wlan0.conf"), 0o600);
    assert_eq!(mode_of("run/systemd/network/10-netplan-eth0.network"), 0o640);
    assert_eq!(mode_of("run/systemd/network"), 0o755);
    assert_eq!(mode_of("run/netplan"), 0o755);
}

/// Forward references resolve across files; a dangling one is an error
/// naming the referencing definition.
#[test]
fn forward_reference_closure() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("etc/netplan")).unwrap();
    // The VLAN referencing eth9 sorts before the file defining it
    fs::write(
        temp.path().join("etc/netplan/10-vlan.yaml"),
        "network: {version: 2, vlans: {vlan10: {id: 10, link: eth9}}}",
    )
    .unwrap();
    fs::write(
        temp.path().join("etc/netplan/20-eth.yaml"),
        "network: {version: 2, ethernets: {eth9: {dhcp4: true}}}",
    )
    .unwrap();
    let state = import(temp.path());
    assert!(state.get_netdef("vlan10").is_some());

    // Now break the reference
    fs::remove_file(temp.path().join("etc/netplan/20-eth.yaml")).unwrap();
    let mut parser = Parser::new();
    parser.load_yaml_hierarchy(temp.path()).unwrap();
    let err = State::import(parser).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("vlan10"));
    assert!(text.contains("eth9"));
    assert!(text.contains("10-vlan.yaml"));
}
