use port_watch_rs::config::DEFAULT_PORT_SPEC;
use port_watch_rs::ports::{load_ports_from_path, parse_port_spec, RangePolicy};

#[test]
fn parse_documented_examples() {
    assert_eq!(
        parse_port_spec("22,80,443", RangePolicy::Tolerant).unwrap(),
        vec![22, 80, 443]
    );
    assert_eq!(
        parse_port_spec("1-3", RangePolicy::Tolerant).unwrap(),
        vec![1, 2, 3]
    );
}

#[test]
fn reversed_range_per_policy() {
    assert_eq!(
        parse_port_spec("5-3", RangePolicy::Tolerant).unwrap(),
        vec![3, 4, 5]
    );
    assert!(parse_port_spec("5-3", RangePolicy::Strict).is_err());
}

#[test]
fn output_strictly_ascending_and_in_range() {
    let ports = parse_port_spec("65535,0,1,100-90,90,70000,x-1", RangePolicy::Tolerant).unwrap();
    assert!(ports.windows(2).all(|w| w[0] < w[1]));
    assert!(ports.iter().all(|&p| p >= 1));
    assert_eq!(ports.first(), Some(&1));
    assert_eq!(ports.last(), Some(&65535));
    assert_eq!(ports.len(), 1 + 11 + 1);
}

#[test]
fn default_spec_covers_privileged_ports() {
    let ports = parse_port_spec(DEFAULT_PORT_SPEC, RangePolicy::Tolerant).expect("parse ok");
    assert_eq!(ports.len(), 1024);
}

#[test]
fn ports_file_with_comments() {
    let dir = std::env::temp_dir().join(format!(
        "port-watch-ports-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("ports.txt");
    std::fs::write(
        &path,
        "# ssh\n22\n\n80, 443  # web\n8000-8002\n8001  # duplicate\n",
    )
    .unwrap();

    let ports = load_ports_from_path(&path, RangePolicy::Tolerant).expect("parse ok");
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn missing_ports_file_errors() {
    let path = std::env::temp_dir().join("port-watch-definitely-missing-ports.txt");
    assert!(load_ports_from_path(path, RangePolicy::Tolerant).is_err());
}
