#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use netkit::mock::MockTransport;
use netkit::{NetworkConfig, RequestDescriptor, url_builder};

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    global_base: Option<String>,
    local_base: Option<String>,
    path: String,
}

fuzz_target!(|input: Input| {
    // Limit input size to avoid slow runs on pathological inputs
    if input.path.len() > 1024 {
        return;
    }

    let mut config = NetworkConfig::builder(Arc::new(MockTransport::ok()));
    if let Some(base) = input.global_base {
        config = config.base_path(base);
    }
    let config = config.build();

    let mut descriptor = RequestDescriptor::get(input.path.clone());
    if let Some(base) = input.local_base {
        descriptor = descriptor.base_path(base);
    }

    // Errors are expected; panics are not
    if let Ok(path) = url_builder::path(&descriptor, Some(&config)) {
        if url_builder::is_absolute(&input.path) {
            assert_eq!(path, input.path);
        }
        let _ = url_builder::url(&descriptor, Some(&config));
    }
});
