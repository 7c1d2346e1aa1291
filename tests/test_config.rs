use clap::Parser;
use std::time::Duration;
use tollgate::config::{Cli, Config, ConfigError, FileConfig};
use tollgate::proxy::DialPolicy;

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["tollgate"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn resolve(args: &[&str]) -> Result<Config, ConfigError> {
    Config::resolve(FileConfig::default(), cli(args))
}

#[test]
fn test_config_defaults() {
    let cfg = Config::resolve(FileConfig::default(), Cli::default()).unwrap();

    assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:80");
    assert!(cfg.allow_list.is_empty());
    assert_eq!(cfg.upstream, None);
    assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
    assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    assert_eq!(cfg.dial_policy, DialPolicy::ForceIpv6);
}

#[test]
fn test_config_flags() {
    let cfg = resolve(&[
        "--listen",
        "127.0.0.1:8080",
        "--backend-cidr",
        "10.0.0.0/8",
        "--backend-cidr",
        "fd00::/8,192.168.0.0/16",
        "--connect-timeout-secs",
        "2",
        "--no-force-ipv6",
    ])
    .unwrap();

    assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
    let ranges: Vec<String> = cfg
        .allow_list
        .ranges()
        .iter()
        .map(|r| r.to_string())
        .collect();
    assert_eq!(ranges, vec!["10.0.0.0/8", "fd00::/8", "192.168.0.0/16"]);
    assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
    assert_eq!(cfg.dial_policy, DialPolicy::Native);
}

#[test]
fn test_malformed_cidr_is_fatal() {
    let err = resolve(&["--backend-cidr", "10.0.0.0/8", "--backend-cidr", "10.0.0.0"]).unwrap_err();

    match err {
        ConfigError::InvalidCidr { value, .. } => assert_eq!(value, "10.0.0.0"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_malformed_listen_addr_is_fatal() {
    let err = resolve(&["--listen", "localhost"]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidListenAddr { .. }));
}

#[test]
fn test_zero_timeout_is_fatal() {
    let err = resolve(&["--request-timeout-secs", "0"]).unwrap_err();
    assert!(matches!(err, ConfigError::ZeroTimeout("request timeout")));
}

#[test]
fn test_upstream_is_normalized() {
    let cfg = resolve(&["--upstream", "cert-solver.internal"]).unwrap();
    assert_eq!(cfg.upstream.as_deref(), Some("cert-solver.internal:80"));

    let cfg = resolve(&["--upstream", "10.0.0.5:8089"]).unwrap();
    assert_eq!(cfg.upstream.as_deref(), Some("10.0.0.5:8089"));

    let cfg = resolve(&["--upstream", "[fd00::5]:8089"]).unwrap();
    assert_eq!(cfg.upstream.as_deref(), Some("[fd00::5]:8089"));
}

#[test]
fn test_upstream_with_path_is_fatal() {
    let err = resolve(&["--upstream", "10.0.0.5:8089/solver"]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUpstream(_)));
}

#[test]
fn test_yaml_file_layer() {
    let file = FileConfig::from_yaml(
        r#"
listen_addr: "[::]:8080"
backend_cidrs:
  - 10.0.0.0/8
upstream: "10.0.0.5:8089"
request_timeout_secs: 10
force_ipv6: false
"#,
    )
    .unwrap();

    let cfg = Config::resolve(file, cli(&["--backend-cidr", "fd00::/8"])).unwrap();

    assert_eq!(cfg.listen_addr.to_string(), "[::]:8080");
    assert_eq!(cfg.allow_list.ranges().len(), 2);
    assert_eq!(cfg.upstream.as_deref(), Some("10.0.0.5:8089"));
    assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.dial_policy, DialPolicy::Native);
}

#[test]
fn test_flags_override_file() {
    let file = FileConfig::from_yaml("listen_addr: \"0.0.0.0:8080\"\n").unwrap();

    let cfg = Config::resolve(file, cli(&["--listen", "127.0.0.1:9000"])).unwrap();

    assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:9000");
}

#[test]
fn test_unknown_yaml_key_is_rejected() {
    assert!(FileConfig::from_yaml("backend_cidr: 10.0.0.0/8\n").is_err());
}

#[test]
fn test_malformed_cidr_in_file_is_fatal() {
    let file = FileConfig::from_yaml("backend_cidrs: [\"not-a-cidr\"]\n").unwrap();

    let err = Config::resolve(file, Cli::default()).unwrap_err();

    assert!(matches!(err, ConfigError::InvalidCidr { .. }));
}

#[test]
fn test_missing_config_file_is_fatal() {
    let err = Config::from_cli(cli(&["--config", "/nonexistent/tollgate.yaml"])).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
