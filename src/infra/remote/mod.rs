//! Remote sync API abstraction
//!
//! Trait-based seam between the sync services and the HTTP implementation.
//! The processor, puller, and tests all talk to `RemoteApi`; only
//! `HttpRemoteApi` knows about endpoints and transports.

pub mod http;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpRemoteApi;

/// Failure classes for remote calls
///
/// `Network` covers connectivity: connection refused, timeout, name
/// resolution, offline. These reflect environment state, not mutation
/// validity, so they never count against a retry budget. `Application` is an
/// explicit server rejection (or a malformed success) and does count.
/// Classification happens structurally at the transport boundary; anything
/// ambiguous is `Application` so it stays inside the bounded budget.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
	#[error("network failure: {0}")]
	Network(String),

	#[error("application failure: {0}")]
	Application(String),
}

impl RemoteError {
	pub fn is_network(&self) -> bool {
		matches!(self, RemoteError::Network(_))
	}
}

/// Server acknowledgement for a created package
///
/// The server echoes the client-assigned id and returns the authoritative
/// creation timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPkg {
	pub id: String,
	pub created_at: DateTime<Utc>,
}

/// Server result of an image upload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadedImage {
	pub url: String,
	pub filename: String,
}

/// One package row in a delta pull response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePkg {
	pub id: String,
	pub image_url: Option<String>,
	pub created_at: DateTime<Utc>,
}

/// Delta pull response: changed packages plus the server-side cursor to store
/// as the next checkpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PulledChanges {
	pub pkgs: Vec<RemotePkg>,
	pub timestamp: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
	/// Create a package on the server under the client-assigned id
	async fn create_pkg(&self, pkg_id: &str) -> Result<CreatedPkg, RemoteError>;

	/// Upload the image at `image_uri` for a package, returning the durable
	/// shareable URL that replaces the local device URI
	async fn upload_image(
		&self,
		pkg_id: &str,
		image_uri: &str,
	) -> Result<UploadedImage, RemoteError>;

	/// Pull package changes since `last_pulled_at` (`None` = from the
	/// beginning of time)
	async fn sync_pull(
		&self,
		last_pulled_at: Option<DateTime<Utc>>,
	) -> Result<PulledChanges, RemoteError>;
}
