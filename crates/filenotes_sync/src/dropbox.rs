//! Dropbox-backed cloud service (API v2).
//!
//! Endpoint mapping:
//!
//! | Capability | Endpoint |
//! |---|---|
//! | `files` | `files/list_folder`, then `files/list_folder/continue` while `has_more` |
//! | `download` | `files/download` (content host) |
//! | `upload` | `files/upload` in overwrite mode (content host) |
//! | `delete` | `files/delete_v2` |
//!
//! The access token lives in the settings store. Acquiring one (the OAuth
//! flow) happens outside the library; [`DropboxCloud::complete_login`]
//! stores the result.

use crate::cloud::CloudService;
use crate::config::SyncConfig;
use crate::descriptor::{FileDescriptor, FileHandle, FileSet, Side};
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::local::{validate_name, LocalFileSystem};
use crate::settings::SettingsStore;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

const API_HOST: &str = "https://api.dropboxapi.com/2";
const CONTENT_HOST: &str = "https://content.dropboxapi.com/2";
const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
enum Metadata {
    File(FileMetadata),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    name: String,
    path_lower: Option<String>,
    path_display: Option<String>,
    server_modified: DateTime<Utc>,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_summary: String,
}

/// Cloud service over the Dropbox HTTP API.
pub struct DropboxCloud<C: HttpClient, S: SettingsStore> {
    client: C,
    settings: Arc<S>,
    local: LocalFileSystem,
    app_key: String,
    root: String,
}

impl<C: HttpClient, S: SettingsStore> DropboxCloud<C, S> {
    /// Creates a service for the app folder configured in `config`.
    pub fn new(
        config: &SyncConfig,
        client: C,
        settings: Arc<S>,
        local: LocalFileSystem,
        app_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            settings,
            local,
            app_key: app_key.into(),
            root: config.remote_root.trim_end_matches('/').to_string(),
        }
    }

    /// URL the user visits to obtain an access code.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}?client_id={}&response_type=code",
            AUTHORIZE_URL, self.app_key
        )
    }

    /// Stores an access token obtained from the OAuth flow.
    pub fn complete_login(&self, token: &str) -> SyncResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SyncError::NotAuthenticated);
        }
        self.settings.set_access_token(token)
    }

    fn token(&self) -> SyncResult<String> {
        self.settings
            .access_token()
            .filter(|t| !t.is_empty())
            .ok_or(SyncError::NotAuthenticated)
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.root, name)
    }

    fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let request = request.header("Authorization", format!("Bearer {}", self.token()?));
        let url = request.url.clone();
        let response = self
            .client
            .post(request)
            .map_err(|e| SyncError::provider_retryable(format!("{}: {}", url, e)))?;

        if response.is_success() {
            return Ok(response);
        }

        let summary = serde_json::from_slice::<ApiError>(&response.body)
            .map(|e| e.error_summary)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());

        Err(match response.status {
            401 => SyncError::AuthExpired(summary),
            409 if summary.contains("not_found") => SyncError::NotFound(summary),
            429 | 500..=599 => SyncError::provider_retryable(format!(
                "{} ({}): {}",
                url, response.status, summary
            )),
            status => SyncError::provider_fatal(format!("{} ({}): {}", url, status, summary)),
        })
    }

    fn rpc(&self, endpoint: &str, arg: serde_json::Value) -> SyncResult<HttpResponse> {
        self.send(
            HttpRequest::post(format!("{}/{}", API_HOST, endpoint))
                .header("Content-Type", "application/json")
                .body(serde_json::to_vec(&arg)?),
        )
    }

    fn list_page(&self, endpoint: &str, arg: serde_json::Value) -> SyncResult<ListFolderResult> {
        let response = self.rpc(endpoint, arg)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("{}: {}", endpoint, e)))
    }
}

impl<C: HttpClient, S: SettingsStore> CloudService for DropboxCloud<C, S> {
    fn is_authenticated(&self) -> bool {
        self.token().is_ok()
    }

    fn login(&self) -> SyncResult<()> {
        if self.is_authenticated() {
            return Ok(());
        }
        info!("login: visit {} and store the token", self.authorize_url());
        Err(SyncError::NotAuthenticated)
    }

    fn logout(&self) -> SyncResult<()> {
        info!("logout");
        self.settings.clear_access_token()
    }

    fn files(&self) -> SyncResult<FileSet> {
        let mut files = FileSet::new();
        let mut page = self.list_page("files/list_folder", json!({ "path": self.root }))?;

        loop {
            for entry in page.entries {
                match entry {
                    Metadata::File(f) if validate_name(&f.name).is_err() => {
                        debug!("files: skipping unmanaged name {}", f.name)
                    }
                    Metadata::File(f) => {
                        let id = f
                            .path_lower
                            .unwrap_or_else(|| self.remote_path(&f.name).to_lowercase());
                        let mut descriptor =
                            FileDescriptor::remote(f.name, f.size, f.server_modified, id);
                        if let Some(display) = f.path_display {
                            descriptor.path = display;
                        }
                        files.push(descriptor)?;
                    }
                    Metadata::Other => debug!("files: skipping non-file entry"),
                }
            }

            if !page.has_more {
                break;
            }
            page = self.list_page(
                "files/list_folder/continue",
                json!({ "cursor": page.cursor }),
            )?;
        }

        Ok(files)
    }

    fn local(&self) -> &LocalFileSystem {
        &self.local
    }

    fn download(&self, file: &FileDescriptor, rename_to: Option<&str>) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        let target = rename_to.unwrap_or(&file.name);
        validate_name(target)?;

        let response = self.send(
            HttpRequest::post(format!("{}/files/download", CONTENT_HOST))
                .header("Dropbox-API-Arg", header_safe_json(&json!({ "path": remote_id(file) }))),
        )?;
        self.local.write(target, &response.body)
    }

    fn upload(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Local)?;
        let data = self.local.read(&file.name)?;
        let arg = json!({
            "path": self.remote_path(&file.name),
            "mode": "overwrite",
            "autorename": false,
            "mute": true,
        });

        self.send(
            HttpRequest::post(format!("{}/files/upload", CONTENT_HOST))
                .header("Dropbox-API-Arg", header_safe_json(&arg))
                .header("Content-Type", "application/octet-stream")
                .body(data),
        )?;
        Ok(())
    }

    fn delete_remote(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        self.rpc("files/delete_v2", json!({ "path": remote_id(file) }))?;
        Ok(())
    }
}

fn remote_id(file: &FileDescriptor) -> &str {
    match &file.handle {
        FileHandle::Remote(id) => id,
        FileHandle::Local(_) => &file.path,
    }
}

/// JSON for the `Dropbox-API-Arg` header, which must be printable ASCII.
fn header_safe_json(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        // serde_json already escapes the other control characters
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ScriptedClient;
    use crate::settings::MemorySettings;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> DropboxCloud<ScriptedClient, MemorySettings> {
        let config = SyncConfig::new(temp.path());
        let settings = Arc::new(MemorySettings::new());
        settings.set_access_token("sl.test").unwrap();
        DropboxCloud::new(
            &config,
            ScriptedClient::new(),
            settings,
            LocalFileSystem::open(&config).unwrap(),
            "appkey",
        )
    }

    fn file_entry(name: &str, size: u64) -> serde_json::Value {
        json!({
            ".tag": "file",
            "name": name,
            "path_lower": format!("/{}", name.to_lowercase()),
            "path_display": format!("/{}", name),
            "id": "id:abc",
            "client_modified": "2020-01-01T00:00:00Z",
            "server_modified": "2020-01-02T03:04:05Z",
            "rev": "015",
            "size": size,
        })
    }

    #[test]
    fn lists_files_across_pages() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        dropbox.client.respond(
            200,
            json!({
                "entries": [file_entry("A.txt", 3), {".tag": "folder", "name": "sub", "id": "id:x"}],
                "cursor": "c1",
                "has_more": true,
            })
            .to_string(),
        );
        dropbox.client.respond(
            200,
            json!({ "entries": [file_entry("b.txt", 4)], "cursor": "c2", "has_more": false })
                .to_string(),
        );

        let files = dropbox.files().unwrap();
        assert_eq!(files.names(), vec!["A.txt", "b.txt"]);

        let a = files.get("A.txt").unwrap();
        assert_eq!(a.size, 3);
        assert_eq!(a.path, "/A.txt");
        assert_eq!(
            a.last_modified,
            Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
        );

        let requests = dropbox.client.requests();
        assert_eq!(requests[0].url, "https://api.dropboxapi.com/2/files/list_folder");
        assert_eq!(requests[0].header_value("Authorization"), Some("Bearer sl.test"));
        assert_eq!(
            requests[1].url,
            "https://api.dropboxapi.com/2/files/list_folder/continue"
        );
        assert_eq!(requests[1].body, br#"{"cursor":"c1"}"#);
    }

    #[test]
    fn listing_skips_reserved_names() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        dropbox.client.respond(
            200,
            json!({
                "entries": [file_entry(".draft.filenotes.tmp", 5), file_entry("a.txt", 1)],
                "cursor": "c1",
                "has_more": false,
            })
            .to_string(),
        );

        assert_eq!(dropbox.files().unwrap().names(), vec!["a.txt"]);
    }

    #[test]
    fn download_writes_local_file() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        dropbox.client.respond(200, b"remote body".to_vec());

        let remote = FileDescriptor::remote("n.txt", 11, Utc::now(), "/n.txt");
        dropbox.download(&remote, Some("n.txt.conflict")).unwrap();

        assert_eq!(dropbox.local().read("n.txt.conflict").unwrap(), b"remote body");
        let request = &dropbox.client.requests()[0];
        assert_eq!(request.url, "https://content.dropboxapi.com/2/files/download");
        assert_eq!(request.header_value("Dropbox-API-Arg"), Some(r#"{"path":"/n.txt"}"#));
    }

    #[test]
    fn upload_overwrites() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        dropbox.local().write("x.txt", b"local").unwrap();
        dropbox.client.respond(200, b"{}".to_vec());

        let local = dropbox.local().describe("x.txt").unwrap();
        dropbox.upload(&local).unwrap();

        let request = &dropbox.client.requests()[0];
        assert_eq!(request.body, b"local");
        let arg: serde_json::Value =
            serde_json::from_str(request.header_value("Dropbox-API-Arg").unwrap()).unwrap();
        assert_eq!(arg["path"], "/x.txt");
        assert_eq!(arg["mode"], "overwrite");
    }

    #[test]
    fn status_codes_map_to_errors() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        let remote = FileDescriptor::remote("gone.txt", 1, Utc::now(), "/gone.txt");

        dropbox
            .client
            .respond(401, json!({"error_summary": "expired_access_token/"}).to_string());
        assert!(matches!(dropbox.files(), Err(SyncError::AuthExpired(_))));

        dropbox.client.respond(
            409,
            json!({"error_summary": "path_lookup/not_found/.."}).to_string(),
        );
        assert!(matches!(dropbox.delete(&remote), Err(SyncError::NotFound(_))));

        dropbox.client.respond(503, b"busy".to_vec());
        assert!(dropbox.files().unwrap_err().is_retryable());

        dropbox.client.respond(400, b"bad".to_vec());
        assert!(!dropbox.files().unwrap_err().is_retryable());

        dropbox.client.fail("dns failure");
        assert!(dropbox.files().unwrap_err().is_retryable());
    }

    #[test]
    fn malformed_listing_is_protocol_error() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        dropbox.client.respond(200, b"<html>".to_vec());
        assert!(matches!(dropbox.files(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn session_follows_token() {
        let temp = TempDir::new().unwrap();
        let dropbox = service(&temp);
        assert!(dropbox.is_authenticated());
        assert!(dropbox.login().is_ok());

        dropbox.logout().unwrap();
        assert!(!dropbox.is_authenticated());
        assert!(matches!(dropbox.login(), Err(SyncError::NotAuthenticated)));
        assert!(matches!(dropbox.files(), Err(SyncError::NotAuthenticated)));
        assert!(dropbox.client.requests().is_empty());

        dropbox.complete_login("  sl.new  ").unwrap();
        assert_eq!(dropbox.settings.access_token().as_deref(), Some("sl.new"));
        assert!(dropbox.authorize_url().contains("client_id=appkey"));
    }

    #[test]
    fn header_json_is_ascii() {
        let arg = json!({ "path": "/café.txt" });
        assert_eq!(header_safe_json(&arg), r#"{"path":"/caf\u00e9.txt"}"#);
        let arg = json!({ "path": "/😀" });
        assert_eq!(header_safe_json(&arg), r#"{"path":"/\ud83d\ude00"}"#);
        let arg = json!({ "path": "/a\u{7f}b" });
        assert_eq!(header_safe_json(&arg), r#"{"path":"/a\u007fb"}"#);
    }
}
