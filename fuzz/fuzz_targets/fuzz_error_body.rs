#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use netkit::ErrorBody;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    // Any byte sequence must classify without panicking
    match ErrorBody::from_bytes(&Bytes::copy_from_slice(data)) {
        ErrorBody::None => assert!(data.is_empty()),
        ErrorBody::JsonObject(_) | ErrorBody::JsonArray(_) => {
            assert!(serde_json::from_slice::<serde_json::Value>(data).is_ok());
        }
        ErrorBody::Raw(_) => {}
    }
});
