use urlbar_core::autocomplete::{AutoComplete, StoreSource};
use urlbar_core::contract::{CoreRequest, CoreResponse, OpenPageRequest, SearchRequest};
use urlbar_core::model::{PlaceRecord, SearchStatus};
use urlbar_core::places_store;
use urlbar_core::prefs::PrefBranch;
use urlbar_core::transport::{handle_json, handle_request, ErrorCode, TransportResponse};

fn autocomplete_with_seed_page() -> AutoComplete {
    let db = places_store::open_memory().unwrap();
    places_store::upsert_place(
        &db,
        &PlaceRecord::new("http://www.mozilla.org/", "Mozilla").with_visits(2, 100),
    )
    .unwrap();
    AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db))
}

#[test]
fn request_handler_returns_ok_transport_response() {
    let mut autocomplete = autocomplete_with_seed_page();

    let response = handle_request(
        &mut autocomplete,
        CoreRequest::Search(SearchRequest {
            query: "moz".into(),
            actions: false,
        }),
    );

    match response {
        TransportResponse::Ok {
            response: CoreResponse::Search(payload),
        } => {
            assert_eq!(payload.status, SearchStatus::Success);
            assert_eq!(payload.results[0].url, "http://www.mozilla.org/");
            let encoded = serde_json::to_string(&TransportResponse::Ok {
                response: CoreResponse::Search(payload),
            })
            .unwrap();
            assert!(encoded.contains("\"status\":\"ok\""));
        }
        _ => panic!("expected ok search response"),
    }
}

#[test]
fn json_handler_returns_invalid_json_error_code() {
    let mut autocomplete = autocomplete_with_seed_page();

    let raw = handle_json(&mut autocomplete, "{not-json");
    let parsed: TransportResponse = serde_json::from_str(&raw).unwrap();

    match parsed {
        TransportResponse::Err { error } => assert_eq!(error.code, ErrorCode::InvalidJson),
        _ => panic!("expected invalid json error"),
    }
}

#[test]
fn json_handler_returns_invalid_request_error_code() {
    let mut autocomplete = autocomplete_with_seed_page();
    let request = CoreRequest::RegisterOpenPage(OpenPageRequest { url: "   ".into() });

    let raw = handle_json(&mut autocomplete, &serde_json::to_string(&request).unwrap());
    let parsed: TransportResponse = serde_json::from_str(&raw).unwrap();

    match parsed {
        TransportResponse::Err { error } => assert_eq!(error.code, ErrorCode::InvalidRequest),
        _ => panic!("expected invalid request error"),
    }
}

#[test]
fn json_handler_reports_store_errors() {
    let blocker = std::env::temp_dir().join(format!(
        "urlbar-transport-blocker-{}",
        std::process::id()
    ));
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut autocomplete = AutoComplete::new(
        PrefBranch::new(),
        StoreSource::Path(blocker.join("places.sqlite")),
    );

    let raw = handle_json(
        &mut autocomplete,
        r#"{"kind":"Autofill","payload":{"query":"moz"}}"#,
    );
    let parsed: TransportResponse = serde_json::from_str(&raw).unwrap();
    std::fs::remove_file(&blocker).unwrap();

    match parsed {
        TransportResponse::Err { error } => assert_eq!(error.code, ErrorCode::Store),
        _ => panic!("expected store error"),
    }
}

#[test]
fn open_page_round_trip_reports_counts() {
    let mut autocomplete = autocomplete_with_seed_page();
    let register = r#"{"kind":"RegisterOpenPage","payload":{"url":"http://tab.example/"}}"#;
    let unregister = r#"{"kind":"UnregisterOpenPage","payload":{"url":"http://tab.example/"}}"#;

    handle_json(&mut autocomplete, register);
    let raw = handle_json(&mut autocomplete, register);
    assert!(raw.contains("\"open_count\":2"), "{raw}");

    let raw = handle_json(&mut autocomplete, unregister);
    assert!(raw.contains("\"open_count\":1"), "{raw}");
}
