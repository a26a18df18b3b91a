//! HTTP implementation of the remote sync API
//!
//! JSON bodies for create/pull, multipart for image uploads. Every request
//! carries a bounded timeout; a request that exceeds it is a network failure,
//! not an application one.

use std::path::Path;

use chrono::{DateTime, Utc};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CreatedPkg, PulledChanges, RemoteApi, RemoteError, RemotePkg, UploadedImage};
use crate::config::CoreConfig;

pub struct HttpRemoteApi {
	base_url: String,
	client: reqwest::Client,
	upload_client: reqwest::Client,
}

#[derive(Serialize)]
struct CreatePkgRequest<'a> {
	id: &'a str,
}

#[derive(Deserialize)]
struct CreatePkgResponse {
	success: bool,
	pkg: Option<CreatedPkg>,
	error: Option<String>,
}

#[derive(Deserialize)]
struct UploadImageResponse {
	success: bool,
	url: Option<String>,
	filename: Option<String>,
	error: Option<String>,
}

#[derive(Serialize)]
struct SyncPullRequest {
	last_pulled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SyncPullResponse {
	success: bool,
	#[serde(default)]
	pkgs: Vec<RemotePkg>,
	timestamp: Option<DateTime<Utc>>,
	error: Option<String>,
}

/// Map a transport error onto the failure taxonomy.
///
/// Timeouts and connect failures (which include name resolution) are
/// environment state; everything else is treated as application-level so it
/// counts toward the bounded retry budget.
fn classify(err: reqwest::Error) -> RemoteError {
	if err.is_timeout() || err.is_connect() {
		RemoteError::Network(err.to_string())
	} else {
		RemoteError::Application(err.to_string())
	}
}

fn rejection(error: Option<String>, fallback: &str) -> RemoteError {
	RemoteError::Application(error.unwrap_or_else(|| fallback.to_string()))
}

impl HttpRemoteApi {
	pub fn new(config: &CoreConfig) -> anyhow::Result<Self> {
		Ok(Self {
			base_url: config.api_base_url.trim_end_matches('/').to_string(),
			client: reqwest::Client::builder()
				.timeout(config.request_timeout())
				.build()?,
			upload_client: reqwest::Client::builder()
				.timeout(config.upload_timeout())
				.build()?,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}
}

#[async_trait::async_trait]
impl RemoteApi for HttpRemoteApi {
	async fn create_pkg(&self, pkg_id: &str) -> Result<CreatedPkg, RemoteError> {
		let response = self
			.client
			.post(self.url("/api/pkgs"))
			.json(&CreatePkgRequest { id: pkg_id })
			.send()
			.await
			.map_err(classify)?;

		if !response.status().is_success() {
			return Err(RemoteError::Application(format!(
				"create_pkg returned HTTP {}",
				response.status()
			)));
		}

		let body: CreatePkgResponse = response.json().await.map_err(classify)?;
		if !body.success {
			return Err(rejection(body.error, "create_pkg rejected"));
		}

		body.pkg
			.ok_or_else(|| RemoteError::Application("create_pkg response missing pkg".to_string()))
	}

	async fn upload_image(
		&self,
		pkg_id: &str,
		image_uri: &str,
	) -> Result<UploadedImage, RemoteError> {
		let path = image_uri.strip_prefix("file://").unwrap_or(image_uri);
		let filename = Path::new(path)
			.file_name()
			.and_then(|name| name.to_str())
			.unwrap_or("image.jpg")
			.to_string();
		let mime = match Path::new(path).extension().and_then(|ext| ext.to_str()) {
			Some(ext) => format!("image/{}", ext.to_lowercase()),
			None => "image/jpeg".to_string(),
		};

		// An unreadable local file can never upload, so it burns budget
		// instead of retrying forever
		let bytes = tokio::fs::read(path).await.map_err(|e| {
			RemoteError::Application(format!("unreadable image {image_uri}: {e}"))
		})?;

		debug!(pkg_id, filename = %filename, size = bytes.len(), "Uploading image");

		let part = multipart::Part::bytes(bytes)
			.file_name(filename)
			.mime_str(&mime)
			.map_err(classify)?;
		let form = multipart::Form::new()
			.part("image", part)
			.text("pkgId", pkg_id.to_string());

		let response = self
			.upload_client
			.post(self.url("/api/images/upload"))
			.multipart(form)
			.send()
			.await
			.map_err(classify)?;

		if !response.status().is_success() {
			return Err(RemoteError::Application(format!(
				"upload_image returned HTTP {}",
				response.status()
			)));
		}

		let body: UploadImageResponse = response.json().await.map_err(classify)?;
		if !body.success {
			return Err(rejection(body.error, "upload_image rejected"));
		}

		match (body.url, body.filename) {
			(Some(url), filename) => Ok(UploadedImage {
				url,
				filename: filename.unwrap_or_default(),
			}),
			(None, _) => Err(RemoteError::Application(
				"upload_image response missing url".to_string(),
			)),
		}
	}

	async fn sync_pull(
		&self,
		last_pulled_at: Option<DateTime<Utc>>,
	) -> Result<PulledChanges, RemoteError> {
		let response = self
			.client
			.post(self.url("/api/sync/pull"))
			.json(&SyncPullRequest { last_pulled_at })
			.send()
			.await
			.map_err(classify)?;

		if !response.status().is_success() {
			return Err(RemoteError::Application(format!(
				"sync_pull returned HTTP {}",
				response.status()
			)));
		}

		let body: SyncPullResponse = response.json().await.map_err(classify)?;
		if !body.success {
			return Err(rejection(body.error, "sync_pull rejected"));
		}

		let timestamp = body.timestamp.ok_or_else(|| {
			RemoteError::Application("sync_pull response missing timestamp".to_string())
		})?;

		Ok(PulledChanges {
			pkgs: body.pkgs,
			timestamp,
		})
	}
}
