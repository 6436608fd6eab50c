// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use netwarden::cfg::config::Config;

fn minimal_yaml() -> String {
    format!(
        "encryption:\n  key: \"{}\"\ndatabase:\n  host: localhost\n  name: netwarden\n  user: nw\n",
        crate::unit_tests::test_key_b64()
    )
}

#[test]
fn minimal_config_gets_spec_defaults() {
    let cfg = Config::load_from_str(&minimal_yaml()).expect("minimal config");

    assert_eq!(cfg.discovery.worker.instances, 2);
    assert_eq!(cfg.discovery.worker.pool_size, 4);
    assert_eq!(cfg.discovery.worker.total_workers(), 8);

    assert_eq!(cfg.discovery.scan.liveness_timeout, Duration::from_secs(1));
    assert_eq!(cfg.discovery.scan.port_timeout, Duration::from_secs(5));
    assert_eq!(cfg.discovery.scan.ssh_timeout, Duration::from_secs(5));
    assert_eq!(cfg.discovery.scan.max_concurrent_probes, 128);
    assert_eq!(cfg.discovery.scan.min_prefix, 16);
    assert!(!cfg.discovery.scan.allow_large_ranges);

    assert_eq!(cfg.transport.capacity, 64);
    assert_eq!(cfg.transport.reply_timeout, Duration::from_secs(30));

    assert_eq!(cfg.database.port, 5432);
    assert_eq!(cfg.database.max_connections, 8);
    assert!(!cfg.database.ssl);
    assert_eq!(cfg.database.password, "");
}

#[test]
fn renamed_keys_are_recognized() {
    let yaml = format!(
        r#"
discovery:
  worker:
    instances: 3
    poolSize: 5
  scan:
    livenessTimeout: 2
    portTimeout: 3
    sshTimeout: 7
    maxConcurrentProbes: 200
    minPrefix: 20
    allowLargeRanges: true
transport:
  capacity: 10
  replyTimeout: 5
encryption:
  key: "{}"
database:
  host: db.internal
  port: 5433
  name: nw
  user: nw
  password: hunter2
  ssl: true
  maxConnections: 4
"#,
        crate::unit_tests::test_key_b64()
    );
    let cfg = Config::load_from_str(&yaml).expect("full config");

    assert_eq!(cfg.discovery.worker.total_workers(), 15);
    assert_eq!(cfg.discovery.scan.liveness_timeout, Duration::from_secs(2));
    assert_eq!(cfg.discovery.scan.ssh_timeout, Duration::from_secs(7));
    assert_eq!(cfg.discovery.scan.max_concurrent_probes, 200);
    assert_eq!(cfg.discovery.scan.min_prefix, 20);
    assert!(cfg.discovery.scan.allow_large_ranges);
    assert_eq!(cfg.transport.reply_timeout, Duration::from_secs(5));
    assert_eq!(cfg.database.port, 5433);
    assert!(cfg.database.ssl);
    assert_eq!(cfg.database.max_connections, 4);
}

#[test]
fn probe_cap_is_raised_to_the_floor() {
    let yaml = minimal_yaml() + "discovery:\n  scan:\n    maxConcurrentProbes: 8\n";
    let cfg = Config::load_from_str(&yaml).expect("config");
    assert_eq!(cfg.discovery.scan.max_concurrent_probes, 64);
}

#[test]
fn zero_workers_are_rejected() {
    let yaml = minimal_yaml() + "discovery:\n  worker:\n    instances: 0\n";
    assert!(Config::load_from_str(&yaml).is_err());
}

#[test]
fn blank_encryption_key_is_rejected() {
    let yaml = "encryption:\n  key: \"  \"\ndatabase:\n  host: h\n  name: n\n  user: u\n";
    assert!(Config::load_from_str(yaml).is_err());
}

#[test]
fn missing_database_section_is_rejected() {
    let yaml = format!("encryption:\n  key: \"{}\"\n", crate::unit_tests::test_key_b64());
    assert!(Config::load_from_str(&yaml).is_err());
}
