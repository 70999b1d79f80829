//! Fuzz target: `broker::classify`
//!
//! Inbound broker payloads come from the network.  Classification must
//! never panic, and an accepted configuration must fit in one radio frame.
//!
//! cargo fuzz run fuzz_inbound_classify

#![no_main]

use libfuzzer_sys::fuzz_target;
use sphere_hub::bridge::broker::{classify, Inbound, MAX_RADIO_PAYLOAD};

fuzz_target!(|data: &[u8]| {
    if let Ok(Inbound::Configure { document, .. }) = classify(data) {
        assert!(document.len() <= MAX_RADIO_PAYLOAD);
        assert!(is_json_object(&document));
    }
});

fn is_json_object(doc: &str) -> bool {
    doc.starts_with('{') && doc.ends_with('}')
}
