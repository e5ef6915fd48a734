use super::*;

fn entry(
    key: &str,
    value: &str,
) -> RemoteEntry {
    RemoteEntry {
        key: key.to_string(),
        value: value.as_bytes().to_vec(),
    }
}

#[test]
fn test_should_group_values_by_second_to_last_segment() {
    let services = group_by_service(vec![
        entry("prefix/svcA/1", "v1"),
        entry("prefix/svcA/2", "v2"),
        entry("prefix/svcB/1", "v3"),
    ]);

    assert_eq!(services.len(), 2);
    let mut svc_a = services["svcA"].clone();
    svc_a.sort();
    assert_eq!(svc_a, vec!["v1", "v2"]);
    assert_eq!(services["svcB"], vec!["v3"]);
}

#[test]
fn test_should_skip_keys_without_separator() {
    let services = group_by_service(vec![entry("lonely", "x"), entry("a/b", "y")]);

    assert_eq!(services.len(), 1);
    assert_eq!(services["a"], vec!["y"]);
}

#[test]
fn test_should_keep_repeated_values() {
    let services = group_by_service(vec![
        entry("/hub/api/pod-1", "10.0.0.1:80"),
        entry("/hub/api/pod-2", "10.0.0.1:80"),
    ]);

    assert_eq!(services["api"], vec!["10.0.0.1:80", "10.0.0.1:80"]);
}

#[test]
fn test_leading_separator_yields_empty_service_name() {
    let services = group_by_service(vec![entry("/top", "v")]);

    assert_eq!(services[""], vec!["v"]);
}

#[test]
fn test_empty_scan_yields_empty_map() {
    assert!(group_by_service(Vec::new()).is_empty());
}
