//! Core configuration
//!
//! Static knobs for the engine: where the remote API lives and how requests
//! are bounded and paced. Retry budgets are deliberately *not* here — they
//! live in `sync_metadata` so the settings UI can change them at runtime.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
	/// Base URL of the remote sync API
	pub api_base_url: String,
	/// Timeout for JSON requests (create, pull), in seconds
	pub request_timeout_secs: u64,
	/// Timeout for multipart image uploads, in seconds
	pub upload_timeout_secs: u64,
	/// Pause between mutations within a drain pass, in milliseconds
	pub inter_mutation_pause_ms: u64,
}

impl Default for CoreConfig {
	fn default() -> Self {
		Self {
			api_base_url: "http://localhost:3000".to_string(),
			request_timeout_secs: 30,
			upload_timeout_secs: 30,
			inter_mutation_pause_ms: 100,
		}
	}
}

impl CoreConfig {
	pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(raw)
	}

	pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
		let raw = tokio::fs::read_to_string(path.as_ref()).await?;
		Ok(Self::from_toml(&raw)?)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn upload_timeout(&self) -> Duration {
		Duration::from_secs(self.upload_timeout_secs)
	}

	pub fn inter_mutation_pause(&self) -> Duration {
		Duration::from_millis(self.inter_mutation_pause_ms)
	}
}
