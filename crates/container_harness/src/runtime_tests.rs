use super::*;

#[test]
fn test_instance_spec_builder() {
    let spec = InstanceSpec::new("test-dbimage-local-basic", "mysql:8.0")
        .with_env("MYSQL_ROOT_PASSWORD", "secret")
        .with_env("MYSQL_DATABASE", "app")
        .with_network("test-dbimage-net")
        .with_volume("test-dbimage-vol", "/var/lib/mysql")
        .with_labels(harness_labels("run1"));

    assert_eq!(spec.name, "test-dbimage-local-basic");
    assert_eq!(spec.image, "mysql:8.0");
    assert_eq!(spec.network.as_deref(), Some("test-dbimage-net"));
    assert_eq!(
        spec.volume,
        Some(VolumeMount {
            volume: "test-dbimage-vol".to_string(),
            target: "/var/lib/mysql".to_string(),
        })
    );
    assert!(!spec.auto_remove);
    assert_eq!(spec.labels.get(RUN_LABEL).map(String::as_str), Some("run1"));
}

#[test]
fn test_env_pairs_are_sorted_by_key() {
    let spec = InstanceSpec::new("db", "mysql:8.0")
        .with_env("MYSQL_ROOT_PASSWORD", "secret")
        .with_env("MYSQL_DATABASE", "app");

    assert_eq!(
        spec.env_pairs(),
        vec![
            "MYSQL_DATABASE=app".to_string(),
            "MYSQL_ROOT_PASSWORD=secret".to_string(),
        ]
    );
}

#[test]
fn test_harness_labels() {
    let labels = harness_labels("abc");
    assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
    assert_eq!(labels.get(RUN_LABEL).map(String::as_str), Some("abc"));
    assert_eq!(labels.len(), 2);
}

#[test]
fn test_exec_output_success() {
    let output = ExecOutput::success("mysql\n");
    assert!(output.is_success());
    assert!(!ExecOutput {
        exit_code: 1,
        output: String::new(),
    }
    .is_success());
}
