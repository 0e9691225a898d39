// Infrastructure layer - External dependencies and adapters
pub mod chunked_json;
pub mod config;
pub mod csv_export;
pub mod file_notes;
pub mod http_tutor;
