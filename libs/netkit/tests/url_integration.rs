#![allow(clippy::unwrap_used, clippy::expect_used)]

//! URL resolution properties as seen through the client

use std::sync::Arc;

use netkit::url_builder;
use netkit::{NetworkClient, NetworkConfig, QueryValue, RequestContentType, RequestDescriptor, RequestError, mock::MockTransport};

fn client(base: Option<&str>) -> NetworkClient {
    let mut config = NetworkConfig::builder(Arc::new(MockTransport::ok()));
    if let Some(base) = base {
        config = config.base_path(base);
    }
    let client = NetworkClient::new();
    client.configure(config.build(), None).unwrap();
    client
}

#[test]
fn absolute_paths_ignore_every_base() {
    for base in [None, Some("https://global.example")] {
        let client = client(base);
        for path in [
            "https://api.example.com/a/b",
            "http://localhost:8080/health",
            "ftp://files.example.com/pub",
        ] {
            let uri = client
                .url(&RequestDescriptor::get(path).base_path("https://local.example"))
                .unwrap();
            assert_eq!(uri.to_string(), path);
        }
    }
}

#[test]
fn relative_paths_need_a_base() {
    let client = client(None);
    for path in ["users", "/users", ""] {
        assert!(matches!(
            client.url(&RequestDescriptor::get(path)),
            Err(RequestError::NoBasePath)
        ));
    }
}

#[test]
fn slash_joining_is_normalised() {
    for base in ["https://x.com/", "https://x.com//", "https://x.com"] {
        let client = client(Some(base));
        for path in ["/y", "y"] {
            assert_eq!(client.url(&RequestDescriptor::get(path)).unwrap(), "https://x.com/y");
        }
    }
}

#[test]
fn query_serialization_is_deterministic() {
    let params = [
        ("z", QueryValue::from("last")),
        ("a", QueryValue::from(1)),
        ("flag", QueryValue::from(true)),
        ("off", QueryValue::from(false)),
        ("m", QueryValue::from("x y")),
    ];

    let forward: Vec<_> = params.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect();
    let mut backward = forward.clone();
    backward.reverse();

    let a = url_builder::query_string(&forward, &RequestContentType::Json);
    let b = url_builder::query_string(&backward, &RequestContentType::Json);
    assert_eq!(a, b);
    assert_eq!(a, "a=1&flag&m=x%20y&z=last");
    assert_eq!(a, url_builder::query_string(&forward, &RequestContentType::Json));
}

#[test]
fn descriptor_query_reaches_url() {
    let client = client(Some("https://api.example.com"));
    let descriptor = RequestDescriptor::get("search?sort=asc")
        .query("q", "rust lang")
        .query("page", 3_u32)
        .query("exact", false);
    assert_eq!(
        client.url(&descriptor).unwrap(),
        "https://api.example.com/search?sort=asc&page=3&q=rust%20lang"
    );
}

#[test]
fn unconfigured_client_reports_not_configured() {
    let client = NetworkClient::new();
    assert!(matches!(
        client.url(&RequestDescriptor::get("https://a.example")),
        Err(RequestError::NotConfigured)
    ));
}
