//! services/api/src/bin/openapi.rs
//!
//! Dumps the attendance API's OpenAPI document, e.g. for client generation.
//!
//! Usage: `openapi [PATH]`; the path defaults to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, api_doc.to_pretty_json()?)?;
    println!("Wrote the attendance API document to {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    write_document(ApiDoc::openapi(), &path)?;
    Ok(())
}
