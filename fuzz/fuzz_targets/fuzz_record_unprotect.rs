#![no_main]
use libfuzzer_sys::fuzz_target;
use tls13hs::crypt::traffic_keys::{TrafficKeys, TrafficPhase};
use tls13hs::crypt::CipherSuiteParams;
use tls13hs::record::cipher_spec::CipherSpec;
use tls13hs::record::encryption::unprotect_record;
use tls13hs::record::RecordLayer;
use tls13hs::{CipherSuite, Transport};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let transport = if selector & 1 == 0 {
        Transport::Stream
    } else {
        Transport::Datagram
    };
    let suite = match (selector >> 1) % 3 {
        0 => CipherSuite::TLS_AES_128_GCM_SHA256,
        1 => CipherSuite::TLS_AES_256_GCM_SHA384,
        _ => CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
    };
    let Ok(params) = CipherSuiteParams::from_suite(suite) else {
        return;
    };
    let secret = vec![0x5c; params.hash_len];
    let Ok(keys) = TrafficKeys::derive(&params, TrafficPhase::ApplicationData, &secret) else {
        return;
    };
    let Ok(spec) = CipherSpec::new(
        &params,
        TrafficPhase::ApplicationData,
        1,
        &keys,
        transport,
        params.max_records,
    ) else {
        return;
    };

    let layer = RecordLayer::new(transport);
    let mut offset = 0;
    while let Ok((record, used)) = layer.parse_record(&rest[offset..]) {
        let _ = unprotect_record(&spec, transport, &record);
        offset += used;
    }
});
