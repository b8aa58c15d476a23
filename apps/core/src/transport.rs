use serde::{Deserialize, Serialize};

use crate::autocomplete::{AutoComplete, AutoCompleteError, ENABLE_ACTIONS_PARAM};
use crate::contract::{
    AutofillResponse, CoreRequest, CoreResponse, OpenPageResponse, SearchResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    InvalidRequest,
    Store,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransportResponse {
    Ok { response: CoreResponse },
    Err { error: ErrorResponse },
}

const SERIALIZE_FAILURE: &str =
    r#"{"status":"err","error":{"code":"invalid_request","message":"response could not be serialized"}}"#;

pub fn handle_request(autocomplete: &mut AutoComplete, request: CoreRequest) -> TransportResponse {
    match execute(autocomplete, request) {
        Ok(response) => TransportResponse::Ok { response },
        Err(error) => TransportResponse::Err {
            error: map_error(error),
        },
    }
}

pub fn handle_json(autocomplete: &mut AutoComplete, payload: &str) -> String {
    let response = match serde_json::from_str::<CoreRequest>(payload) {
        Ok(request) => handle_request(autocomplete, request),
        Err(error) => TransportResponse::Err {
            error: ErrorResponse {
                code: ErrorCode::InvalidJson,
                message: error.to_string(),
            },
        },
    };

    serde_json::to_string(&response).unwrap_or_else(|_| SERIALIZE_FAILURE.to_string())
}

fn execute(
    autocomplete: &mut AutoComplete,
    request: CoreRequest,
) -> Result<CoreResponse, AutoCompleteError> {
    match request {
        CoreRequest::Search(search) => {
            let params = if search.actions { ENABLE_ACTIONS_PARAM } else { "" };
            let result = autocomplete.search_blocking(&search.query, params);
            Ok(CoreResponse::Search(SearchResponse::from(result)))
        }
        CoreRequest::RegisterOpenPage(page) => {
            autocomplete.register_open_page(&page.url)?;
            let open_count = autocomplete.open_page_count(&page.url)?.unwrap_or(0);
            Ok(CoreResponse::RegisterOpenPage(OpenPageResponse {
                url: page.url,
                open_count,
            }))
        }
        CoreRequest::UnregisterOpenPage(page) => {
            autocomplete.unregister_open_page(&page.url)?;
            let open_count = autocomplete.open_page_count(&page.url)?.unwrap_or(0);
            Ok(CoreResponse::UnregisterOpenPage(OpenPageResponse {
                url: page.url,
                open_count,
            }))
        }
        CoreRequest::Autofill(autofill) => {
            let completion = autocomplete.autofill(&autofill.query)?;
            Ok(CoreResponse::Autofill(AutofillResponse::from(completion)))
        }
    }
}

fn map_error(error: AutoCompleteError) -> ErrorResponse {
    match error {
        AutoCompleteError::InvalidRequest(message) => ErrorResponse {
            code: ErrorCode::InvalidRequest,
            message,
        },
        AutoCompleteError::Store(error) => ErrorResponse {
            code: ErrorCode::Store,
            message: error.to_string(),
        },
    }
}
