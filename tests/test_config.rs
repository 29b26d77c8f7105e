use lux_monitor::prelude::*;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn loads_minimal_config() {
    let file = write_config(
        r#"
inverters:
  - host: 10.10.10.1
    port: 8000
"#,
    );

    let config = Config::new(file.path().to_string_lossy().to_string()).unwrap();

    assert_eq!(config.inverters.len(), 1);
    let inverter = &config.inverters[0];
    assert!(inverter.enabled());
    assert_eq!(inverter.host(), "10.10.10.1");
    assert_eq!(inverter.port(), 8000);
    assert_eq!(inverter.protocol(), 1);
    assert_eq!(inverter.register_block_size(), 40);
    assert_eq!(inverter.datalog(), Serial::broadcast());
    assert_eq!(inverter.serial(), Serial::unaddressed());

    assert_eq!(config.loglevel(), "info");
    assert_eq!(config.poll_interval_ms(), 5000);
    assert_eq!(config.enabled_inverters().len(), 1);
}

#[test]
fn parses_serials_and_scheduler() {
    let file = write_config(
        r#"
inverters:
  - host: 10.10.10.1
    port: 8000
    datalog: BA12345678
    serial: CC12345678
    protocol: 2
  - host: 10.10.10.2
    port: 8000
    enabled: false
scheduler:
  poll_interval_ms: 1000
loglevel: debug
"#,
    );

    let config = Config::new(file.path().to_string_lossy().to_string()).unwrap();

    assert_eq!(config.inverters.len(), 2);
    assert_eq!(config.enabled_inverters().len(), 1);

    let inverter = &config.inverters[0];
    assert_eq!(inverter.datalog().data(), *b"BA12345678");
    assert_eq!(inverter.serial().data(), *b"CC12345678");
    assert_eq!(inverter.protocol(), 2);

    assert_eq!(config.poll_interval_ms(), 1000);
    assert_eq!(config.loglevel(), "debug");
}

#[test]
fn rejects_bad_serial_length() {
    let file = write_config(
        r#"
inverters:
  - host: 10.10.10.1
    port: 8000
    datalog: SHORT
"#,
    );

    assert!(Config::new(file.path().to_string_lossy().to_string()).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    assert!(Config::new("/nonexistent/config.yaml".to_string()).is_err());
}
