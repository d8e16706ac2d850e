#![no_main]

use libfuzzer_sys::fuzz_target;
use netkit::{QueryValue, RequestContentType, url_builder};

#[derive(Debug, arbitrary::Arbitrary)]
enum Value {
    Flag(bool),
    Text(String),
    Number(i64),
}

fuzz_target!(|params: Vec<(String, Value)>| {
    if params.len() > 64 {
        return;
    }
    let params: Vec<(String, QueryValue)> = params
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Flag(b) => QueryValue::from(b),
                Value::Text(s) => QueryValue::from(s),
                Value::Number(n) => QueryValue::from(n),
            };
            (k, v)
        })
        .collect();

    // Order of parameters never changes the result
    let mut reversed = params.clone();
    reversed.reverse();
    for content_type in [RequestContentType::Json, RequestContentType::FormUrlEncoded] {
        let forward = url_builder::query_string(&params, &content_type);
        assert_eq!(forward, url_builder::query_string(&reversed, &content_type));
        assert!(!forward.contains(' '));
    }
});
