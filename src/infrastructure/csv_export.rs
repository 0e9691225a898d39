// CSV download response
use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode, header},
};

/// Builds a `text/csv` attachment response.
pub fn csv_response(filename: &str, csv: String) -> Result<Response<Body>, StatusCode> {
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    );
    let disposition = HeaderValue::from_str(&disposition).map_err(|e| {
        tracing::error!(error = %e, "invalid content-disposition");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(csv))
        .map_err(|e| {
            tracing::error!(error = %e, "CSV response build error");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
