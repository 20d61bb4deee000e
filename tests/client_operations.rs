//! End-to-end coverage of the client facade's public operations, driven
//! through a `FakeTransport` rather than a real network round trip.

use randomorg::{
    ClientOptions, DispatchConfig, DispatchEngine, FakeTransport, MonotonicClock, RandomData,
    RandomOrgClient, ScriptedResponse, SignedOptions, SystemWallClock, TokioSleeper,
};
use serde_json::json;
use std::sync::Arc;

fn fake_client(serialized: bool) -> (Arc<RandomOrgClient>, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::new());
    let dispatch = DispatchEngine::new(DispatchConfig {
        transport: transport.clone(),
        clock: Arc::new(MonotonicClock::default()),
        wall_clock: Arc::new(SystemWallClock),
        sleeper: Arc::new(TokioSleeper),
        url: "http://fake-randomorg".into(),
        serialized,
    });
    let options = ClientOptions { serialized, ..ClientOptions::default() };
    let client = RandomOrgClient::with_dispatch_engine("test-key", options, dispatch);
    (client, transport)
}

#[tokio::test]
async fn generate_integers_round_trips_plain_data() {
    let (client, transport) = fake_client(true);
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({
            "jsonrpc": "2.0",
            "result": {
                "random": {"data": [4, 8, 15, 16, 23]},
                "bitsUsed": 25, "bitsLeft": 999_975,
                "requestsUsed": 1, "requestsLeft": 999,
                "advisoryDelay": 0
            },
            "id": "1"
        }),
    });

    let numbers = client.generate_integers(5, 1, 100, true, 10).await.unwrap();
    assert_eq!(numbers, RandomData::Integers(vec![4, 8, 15, 16, 23]));

    let usage = client.usage_snapshot();
    assert_eq!(usage.requests_remaining, Some(999));
    assert_eq!(usage.bits_remaining, Some(999_975));
}

#[tokio::test]
async fn generate_integers_rejects_invalid_params_without_a_request() {
    let (client, transport) = fake_client(true);
    let err = client.generate_integers(0, 1, 100, true, 10).await.unwrap_err();
    assert!(matches!(err, randomorg::ClientError::Param(_)));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn generate_integers_with_non_base10_decodes_digit_strings() {
    let (client, transport) = fake_client(true);
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({
            "jsonrpc": "2.0",
            "result": {"random": {"data": ["ff", "1a"]}, "advisoryDelay": 0},
            "id": "1"
        }),
    });

    let data = client.generate_integers(2, 0, 255, true, 16).await.unwrap();
    assert_eq!(data, RandomData::DigitStrings(vec!["ff".to_string(), "1a".to_string()]));
}

#[tokio::test]
async fn generate_integer_sequences_multiform_validates_array_lengths() {
    let (client, _transport) = fake_client(true);
    let err = client
        .generate_integer_sequences_multiform(2, &[5], &[0, 0], &[9, 9], &[true, true], &[10, 10])
        .await
        .unwrap_err();
    assert!(matches!(err, randomorg::ClientError::Param(_)));
}

#[tokio::test]
async fn generate_signed_integers_carries_byte_exact_random_and_signature() {
    let (client, transport) = fake_client(true);
    // Whitespace/ordering here is deliberately unusual: this is what proves
    // the bundle carries the literal bytes rather than a reserialized Value.
    transport.push(ScriptedResponse::HttpError {
        status: 200,
        body: r#"{"jsonrpc":"2.0","result":{"random":{"method":"generateSignedIntegers","n":2,"data":[7,9]},"signature":"c2ln=="},"id":"1"}"#.to_string(),
    });

    let bundle = client
        .generate_signed_integers(2, 1, 10, true, 10, &SignedOptions::default())
        .await
        .unwrap();
    assert_eq!(bundle.data, RandomData::Integers(vec![7, 9]));
    assert_eq!(bundle.signature, "c2ln==");
    assert_eq!(bundle.random.get(), r#"{"method":"generateSignedIntegers","n":2,"data":[7,9]}"#);
}

#[tokio::test]
async fn service_error_402_arms_backoff_for_subsequent_calls() {
    let (client, transport) = fake_client(true);
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({"jsonrpc": "2.0", "error": {"code": 402, "message": "quota exhausted"}, "id": "1"}),
    });

    let err = client.generate_uuids(3).await.unwrap_err();
    let randomorg::ClientError::Request(inner) = err else { panic!("expected Request error") };
    assert!(inner.is_insufficient_requests());

    // Second call hits the in-process back-off gate, never reaching the wire.
    let err2 = client.generate_uuids(3).await.unwrap_err();
    assert!(matches!(err2, randomorg::ClientError::Request(e) if e.is_insufficient_requests()));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn create_and_list_tickets_round_trip() {
    let (client, transport) = fake_client(true);
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({
            "jsonrpc": "2.0",
            "result": [{"ticketId": "t1"}, {"ticketId": "t2"}],
            "id": "1"
        }),
    });
    let tickets = client.create_tickets(2, false).await.unwrap();
    assert_eq!(tickets.len(), 2);

    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({"jsonrpc": "2.0", "result": [{"ticketId": "t1"}], "id": "2"}),
    });
    let listed = client.list_tickets("singleton").await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn verify_signature_reports_authenticity() {
    let (client, transport) = fake_client(true);
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({"jsonrpc": "2.0", "result": {"authenticity": true}, "id": "1"}),
    });
    let random = json!({"data": [1, 2, 3]});
    let ok = client.verify_signature(&random, "sig==").await.unwrap();
    assert!(ok);
}

#[tokio::test]
async fn unknown_usage_triggers_a_proactive_getusage_refresh() {
    let (client, transport) = fake_client(true);
    // Served first, to the proactive getUsage call the client issues because
    // its usage snapshot starts out unknown.
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({
            "jsonrpc": "2.0",
            "result": {"requestsLeft": 500, "bitsLeft": 40_000},
            "id": "1"
        }),
    });
    transport.push(ScriptedResponse::Success {
        status: 200,
        body: json!({
            "jsonrpc": "2.0",
            "result": {"random": {"data": [1, 2, 3]}, "advisoryDelay": 0},
            "id": "2"
        }),
    });

    let data = client.generate_integers(3, 1, 10, true, 10).await.unwrap();
    assert_eq!(data, RandomData::Integers(vec![1, 2, 3]));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2, "expected a getUsage refresh ahead of the real call");
    assert_eq!(requests[0]["method"], "getUsage");
    assert_eq!(requests[1]["method"], "generateIntegers");

    let usage = client.usage_snapshot();
    assert_eq!(usage.requests_remaining, Some(500));
    assert_eq!(usage.bits_remaining, Some(40_000));
}

#[tokio::test]
async fn generate_blobs_rejects_non_octet_aligned_size() {
    let (client, _transport) = fake_client(true);
    let err = client.generate_blobs(1, 5, "base64").await.unwrap_err();
    assert!(matches!(err, randomorg::ClientError::Param(_)));
}
