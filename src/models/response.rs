use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::DispatchSummary;

/// Envelope returned by every HTTP endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub detail: String,
}

/// Outcome of a dispatch request.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub notification_id: Uuid,
    #[serde(flatten)]
    pub summary: DispatchSummary,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failed(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                detail: detail.into(),
            }),
        }
    }
}
