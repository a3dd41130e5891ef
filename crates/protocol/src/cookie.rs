//! Cookie types shared by the RPC surface and the driver layer.

use serde::{Deserialize, Serialize};

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
	/// Sent with same-site and cross-site requests.
	#[serde(rename = "None")]
	None,
	/// Sent with same-site requests and cross-site top-level navigations.
	#[default]
	#[serde(rename = "Lax")]
	Lax,
	/// Only sent with same-site requests.
	#[serde(rename = "Strict")]
	Strict,
}

/// A browser cookie as read from or written to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Unix timestamp in seconds; absent for session cookies.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
	/// URL to infer domain and path from when they are not set explicitly.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl Cookie {
	/// Creates a cookie with the required fields.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: None,
			path: None,
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
			url: None,
		}
	}

	/// Sets the cookie domain.
	pub fn domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = Some(domain.into());
		self
	}

	/// Sets the URL used to infer domain and path.
	pub fn url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}
}
