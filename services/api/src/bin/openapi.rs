//! services/api/src/bin/openapi.rs
//!
//! Dumps the NeuroStudy OpenAPI document. `openapi [PATH]` writes it to PATH
//! (default `openapi.json`); `openapi -` prints it to stdout.

use std::io::Write;
use std::path::Path;

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let doc = ApiDoc::openapi();
    let json = doc.to_pretty_json()?;
    let target = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());

    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        return Ok(());
    }

    if let Some(dir) = Path::new(&target).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&target, json)?;
    eprintln!("Wrote {} paths to {}", doc.paths.paths.len(), target);
    Ok(())
}
