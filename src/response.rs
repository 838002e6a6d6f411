//! Response envelopes shared by the dynamic and management surfaces.

use crate::query::{Page, PageRequest};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ListEnvelope {
    pub data: Vec<Value>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl ListEnvelope {
    pub fn new(page: Page, req: &PageRequest) -> Self {
        ListEnvelope {
            data: page.rows,
            total: page.total,
            page: req.page,
            limit: req.limit,
        }
    }
}

#[derive(Serialize)]
pub struct Created {
    pub id: Value,
    pub message: String,
    pub data: Value,
}

impl IntoResponse for Created {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}

#[derive(Serialize)]
pub struct Message {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Message {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Message {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl IntoResponse for Message {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
