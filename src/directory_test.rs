use super::*;

#[test]
fn new_accepts_http_and_https() {
    assert!(HttpDirectory::new("http://127.0.0.1:8080").is_ok());
    assert!(HttpDirectory::new("https://cobrowse.example").is_ok());
}

#[test]
fn new_rejects_non_http_urls() {
    for base in ["ws://host", "not a url", "/relative", ""] {
        let err = HttpDirectory::new(base).expect_err("should reject");
        assert!(matches!(err, DirectoryError::InvalidBaseUrl(ref b) if b == base), "{base:?}");
    }
}

#[test]
fn endpoint_joins_api_prefix() {
    let directory = HttpDirectory::new("http://host:3000/").expect("directory");
    assert_eq!(directory.endpoint("sessions"), "http://host:3000/api/v1/sessions");
    assert_eq!(directory.endpoint("/sessions/abc/join"), "http://host:3000/api/v1/sessions/abc/join");
}

#[test]
fn endpoint_keeps_base_path() {
    let directory = HttpDirectory::new("https://host/cobrowse").expect("directory");
    assert_eq!(directory.endpoint("sessions"), "https://host/cobrowse/api/v1/sessions");
}

#[test]
fn origin_drops_path_and_default_port() {
    let directory = HttpDirectory::new("https://host:443/some/path").expect("directory");
    assert_eq!(directory.origin(), "https://host");
    let directory = HttpDirectory::new("http://127.0.0.1:8080/x").expect("directory");
    assert_eq!(directory.origin(), "http://127.0.0.1:8080");
}

#[test]
fn base_url_is_exposed() {
    let directory = HttpDirectory::new("http://host:3000").expect("directory");
    assert_eq!(directory.base_url().as_str(), "http://host:3000/");
}

#[test]
fn status_error_reports_code_and_body() {
    let err = DirectoryError::Status { status: 404, body: "no such session".to_owned() };
    assert_eq!(err.to_string(), "directory returned HTTP 404: no such session");
}
