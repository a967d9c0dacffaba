use std::io::Write;

use fleetprobe::ports::{load_ports_from_path, parse_port_spec, parse_ports_str};
use fleetprobe::{ConfigError, PortSpec};

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8001  # duplicate
        # blank line follows

    "#;

    let ports = parse_ports_str(input).expect("parse ok");
    // Dedup, preserve order of first appearance
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    assert!(matches!(
        parse_ports_str("0\n"),
        Err(ConfigError::PortOutOfRange(0))
    ));
}

#[test]
fn cli_spec_resolves_to_sorted_unique_ports() {
    let spec = parse_port_spec("443,22,20-23").unwrap();
    assert_eq!(spec, PortSpec::Set(vec![443, 22, 20, 21, 23]));
    assert_eq!(spec.resolve().unwrap(), vec![20, 21, 22, 23, 443]);
}

#[test]
fn ports_file_round_trip_from_disk() {
    let path = std::env::temp_dir().join(format!("fleetprobe-ports-{}.txt", std::process::id()));
    {
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# ssh and web").unwrap();
        writeln!(f, "22").unwrap();
        writeln!(f, "80-81").unwrap();
    }
    let ports = load_ports_from_path(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(ports, vec![22, 80, 81]);
}

#[test]
fn missing_or_empty_ports_file_is_an_error() {
    assert!(matches!(
        load_ports_from_path("/definitely/not/here/ports.txt"),
        Err(ConfigError::File { .. })
    ));

    let path = std::env::temp_dir().join(format!("fleetprobe-empty-{}.txt", std::process::id()));
    std::fs::write(&path, "# nothing here\n").unwrap();
    let res = load_ports_from_path(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(res, Err(ConfigError::EmptyPorts)));
}
