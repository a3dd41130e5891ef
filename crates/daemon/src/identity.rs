//! Device identity and trust store.
//!
//! A device identity is a self-signed certificate plus its key pair; the
//! device ID is the SHA-256 fingerprint of the certificate's
//! SubjectPublicKeyInfo, rendered as lowercase hex. The trust store is the
//! set of peer device IDs this daemon accepts at the TLS layer. Nothing
//! beyond accept/reject ever consults peer identity.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;

const KEY_FILE: &str = "device.key";
const CERT_FILE: &str = "device.crt";
const TRUST_FILE: &str = "trusted.json";

/// This daemon's key pair and certificate.
pub struct DeviceIdentity {
	device_id: String,
	cert_pem: String,
	key_pem: String,
}

impl DeviceIdentity {
	/// Loads the identity from `dir`, generating and persisting a fresh one
	/// on first run.
	pub fn load_or_generate(dir: &Path) -> Result<Self> {
		fs::create_dir_all(dir).with_context(|| format!("creating identity dir {}", dir.display()))?;
		let key_path = dir.join(KEY_FILE);
		let cert_path = dir.join(CERT_FILE);

		if key_path.exists() && cert_path.exists() {
			let key_pem = fs::read_to_string(&key_path).with_context(|| format!("reading {}", key_path.display()))?;
			let cert_pem = fs::read_to_string(&cert_path).with_context(|| format!("reading {}", cert_path.display()))?;
			let device_id = device_id_from_cert_pem(&cert_pem)?;
			return Ok(Self {
				device_id,
				cert_pem,
				key_pem,
			});
		}

		let key = rcgen::KeyPair::generate().context("generating device key")?;
		let mut params = rcgen::CertificateParams::new(vec!["scout-device".to_string()]).context("certificate params")?;
		params
			.distinguished_name
			.push(rcgen::DnType::CommonName, "scout-device");
		let cert = params.self_signed(&key).context("self-signing device certificate")?;

		let cert_pem = cert.pem();
		let key_pem = key.serialize_pem();
		let device_id = device_id_from_cert_pem(&cert_pem)?;

		fs::write(&key_path, &key_pem).with_context(|| format!("writing {}", key_path.display()))?;
		fs::write(&cert_path, &cert_pem).with_context(|| format!("writing {}", cert_path.display()))?;
		tracing::info!(target = "scout.identity", device_id = %device_id, "generated device identity");

		Ok(Self {
			device_id,
			cert_pem,
			key_pem,
		})
	}

	pub fn device_id(&self) -> &str {
		&self.device_id
	}

	pub fn cert_pem(&self) -> &str {
		&self.cert_pem
	}

	pub fn key_pem(&self) -> &str {
		&self.key_pem
	}
}

/// Device ID of a PEM certificate: hex SHA-256 over the SPKI DER.
pub fn device_id_from_cert_pem(cert_pem: &str) -> Result<String> {
	let (_, pem) = parse_x509_pem(cert_pem.as_bytes()).map_err(|e| anyhow::anyhow!("parsing certificate PEM: {e}"))?;
	device_id_from_cert_der(&pem.contents)
}

/// Device ID of a DER certificate, as presented during the TLS handshake.
pub fn device_id_from_cert_der(cert_der: &[u8]) -> Result<String> {
	let cert = x509_parser::parse_x509_certificate(cert_der)
		.map_err(|e| anyhow::anyhow!("parsing certificate DER: {e}"))?
		.1;
	Ok(spki_fingerprint(cert.tbs_certificate.subject_pki.raw))
}

/// Lowercase-hex SHA-256 of a SubjectPublicKeyInfo DER blob.
pub fn spki_fingerprint(spki_der: &[u8]) -> String {
	let digest = Sha256::digest(spki_der);
	digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
	devices: BTreeSet<String>,
}

/// Persistent set of accepted peer device IDs.
#[derive(Debug)]
pub struct TrustStore {
	path: PathBuf,
	devices: Mutex<BTreeSet<String>>,
}

impl TrustStore {
	/// Loads the trust store from `dir`; a missing file means an empty
	/// store.
	pub fn load(dir: &Path) -> Result<Self> {
		let path = dir.join(TRUST_FILE);
		let devices = if path.exists() {
			let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
			serde_json::from_str::<TrustFile>(&text)
				.with_context(|| format!("parsing {}", path.display()))?
				.devices
		} else {
			BTreeSet::new()
		};
		Ok(Self {
			path,
			devices: Mutex::new(devices),
		})
	}

	pub fn contains(&self, device_id: &str) -> bool {
		self.devices.lock().contains(device_id)
	}

	/// Adds a device and persists. Returns false when it was already
	/// trusted.
	pub fn add(&self, device_id: &str) -> Result<bool> {
		let added = self.devices.lock().insert(device_id.to_string());
		if added {
			self.save()?;
		}
		Ok(added)
	}

	/// Removes a device and persists. Returns false when it was unknown.
	pub fn remove(&self, device_id: &str) -> Result<bool> {
		let removed = self.devices.lock().remove(device_id);
		if removed {
			self.save()?;
		}
		Ok(removed)
	}

	pub fn list(&self) -> Vec<String> {
		self.devices.lock().iter().cloned().collect()
	}

	pub fn is_empty(&self) -> bool {
		self.devices.lock().is_empty()
	}

	fn save(&self) -> Result<()> {
		let file = TrustFile {
			devices: self.devices.lock().clone(),
		};
		let text = serde_json::to_string_pretty(&file)?;
		fs::write(&self.path, text).with_context(|| format!("writing {}", self.path.display()))?;
		Ok(())
	}
}
