//! Attachment storage (receipts, voucher photos, invoice scans).
//!
//! Best-effort by contract: a file that cannot be decoded or written is
//! logged and skipped, and the caller gets the locations that did succeed.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::payload::{pick_array, pick_str};

/// Joins multiple locations in a single sheet cell.
pub const LOCATION_SEPARATOR: &str = " | ";

/// Where an attachment belongs: `<site>/<kind>/<yyyy-mm>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHints {
    pub site: String,
    pub kind: String,
    pub year_month: String,
}

impl PathHints {
    /// `year_month` comes from an ISO `date`, or the current month when the
    /// date does not parse.
    pub fn new(site: &str, kind: &str, date: &str) -> Self {
        let year_month = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map(|d| d.format("%Y-%m").to_string())
            .unwrap_or_else(|_| Utc::now().format("%Y-%m").to_string());
        Self {
            site: site.to_string(),
            kind: kind.to_string(),
            year_month,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub base64_data: String,
}

impl Attachment {
    /// Sanitized name, with an extension taken from the MIME type when the
    /// caller sent none.
    fn file_name(&self) -> String {
        let name = sanitize_segment(&self.name);
        if name.contains('.') {
            return name;
        }
        match extension_for(&self.mime_type) {
            Some(ext) => format!("{name}.{ext}"),
            None => name,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let base64_data = pick_str(value, &["base64Data", "data", "base64", "contenido"])?;
        Some(Attachment {
            name: pick_str(value, &["name", "nombre", "fileName"])
                .unwrap_or_else(|| "adjunto".to_string()),
            mime_type: pick_str(value, &["mimeType", "tipo", "type"])
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            base64_data,
        })
    }
}

/// Attachment list of a payload (`attachments` or `adjuntos`). Entries
/// without data are ignored.
pub fn attachments_from(payload: &Value) -> Vec<Attachment> {
    pick_array(payload, &["attachments", "adjuntos"])
        .map(|files| files.iter().filter_map(Attachment::from_value).collect())
        .unwrap_or_default()
}

pub trait BlobStore {
    /// Persist `files` and return one location per stored file. Never fails.
    fn store(&self, hints: &PathHints, files: &[Attachment]) -> Vec<String>;
}

/// Filesystem blob store rooted at `root`.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url,
        }
    }

    fn write_one(&self, dir: &Path, file: &Attachment) -> Result<String, String> {
        let bytes = decode_base64(&file.base64_data)?;
        let file_name = format!("{}-{}", Uuid::new_v4(), file.file_name());
        let full_dir = self.root.join(dir);
        fs::create_dir_all(&full_dir).map_err(|e| format!("create {}: {e}", full_dir.display()))?;
        let path = full_dir.join(&file_name);
        fs::write(&path, &bytes).map_err(|e| format!("write {}: {e}", path.display()))?;

        let relative = format!(
            "{}/{file_name}",
            dir.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
        );
        Ok(match &self.base_url {
            Some(base) => format!("{}/{relative}", base.trim_end_matches('/')),
            None => format!("file://{}", path.display()),
        })
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, hints: &PathHints, files: &[Attachment]) -> Vec<String> {
        if files.is_empty() {
            return Vec::new();
        }
        let dir = PathBuf::from(sanitize_segment(&hints.site))
            .join(sanitize_segment(&hints.kind))
            .join(sanitize_segment(&hints.year_month));

        let mut locations = Vec::with_capacity(files.len());
        for file in files {
            match self.write_one(&dir, file) {
                Ok(location) => locations.push(location),
                Err(e) => warn!(file = %file.name, error = %e, "Attachment dropped"),
            }
        }
        info!(
            kind = %hints.kind,
            stored = locations.len(),
            requested = files.len(),
            "Attachments stored"
        );
        locations
    }
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
fn decode_base64(raw: &str) -> Result<Vec<u8>, String> {
    let data = match raw.find(";base64,") {
        Some(idx) if raw.starts_with("data:") => &raw[idx + ";base64,".len()..],
        _ => raw,
    };
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| format!("invalid base64: {e}"))
}

fn extension_for(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Path-safe form of a user-supplied name.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "sin_nombre".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attachment(name: &str, data: &str) -> Attachment {
        Attachment {
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            base64_data: data.to_string(),
        }
    }

    #[test]
    fn test_path_hints_year_month() {
        assert_eq!(PathHints::new("CERRITOS", "gastos", "2024-03-01").year_month, "2024-03");
        let fallback = PathHints::new("CERRITOS", "gastos", "ayer");
        assert_eq!(fallback.year_month.len(), 7);
    }

    #[test]
    fn test_store_writes_under_hinted_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), Some("https://files.example.co/".into()));
        let hints = PathHints::new("CERRITOS", "siigo", "2024-03-01");

        // "hola" in base64, once bare and once as a data URL
        let files = [
            attachment("voucher 1.png", "aG9sYQ=="),
            attachment("../voucher2.png", "data:image/png;base64,aG9sYQ=="),
        ];
        let locations = store.store(&hints, &files);

        assert_eq!(locations.len(), 2);
        for location in &locations {
            assert!(location.starts_with("https://files.example.co/CERRITOS/siigo/2024-03/"));
        }
        assert!(locations[0].ends_with("-voucher_1.png"));

        let month_dir = dir.path().join("CERRITOS").join("siigo").join("2024-03");
        let written: Vec<_> = fs::read_dir(&month_dir).unwrap().flatten().collect();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(written[0].path()).unwrap(), b"hola");
    }

    #[test]
    fn test_bad_file_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None);
        let hints = PathHints::new("CERRITOS", "facturas", "2024-03-01");

        let locations = store.store(
            &hints,
            &[attachment("bad.pdf", "%%% not base64 %%%"), attachment("ok.pdf", "aG9sYQ==")],
        );
        assert_eq!(locations.len(), 1);
        assert!(locations[0].starts_with("file://"));
        assert!(store.store(&hints, &[]).is_empty());
    }

    #[test]
    fn test_attachments_from_payload() {
        let payload = json!({
            "adjuntos": [
                {"nombre": "a.png", "tipo": "image/png", "data": "aG9sYQ=="},
                {"nombre": "vacio.png"}
            ]
        });
        let files = attachments_from(&payload);
        assert_eq!(
            files,
            vec![Attachment {
                name: "a.png".into(),
                mime_type: "image/png".into(),
                base64_data: "aG9sYQ==".into(),
            }]
        );
        assert!(attachments_from(&json!({})).is_empty());
    }

    #[test]
    fn test_missing_extension_comes_from_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None);
        let hints = PathHints::new("CERRITOS", "facturas", "2024-03-01");

        let mut scan = attachment("factura 12", "aG9sYQ==");
        scan.mime_type = "application/pdf".into();
        let mut unknown = attachment("notas", "aG9sYQ==");
        unknown.mime_type = "application/octet-stream".into();

        let locations = store.store(&hints, &[scan, unknown, attachment("foto.jpeg", "aG9sYQ==")]);
        assert!(locations[0].ends_with("-factura_12.pdf"));
        assert!(locations[1].ends_with("-notas"));
        assert!(locations[2].ends_with("-foto.jpeg"));
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_segment("  "), "sin_nombre");
        assert_eq!(sanitize_segment("Sede Norte"), "Sede_Norte");
    }
}
