//! Mutual-TLS plumbing for the secure listener.
//!
//! Peers present self-signed certificates; acceptance is decided purely by
//! whether the certificate's SPKI fingerprint (the peer's device ID) is in
//! the trust store. Signature verification delegates to the ring provider,
//! so a peer must also hold the private key it claims.

use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use tokio_rustls::TlsAcceptor;

use crate::identity::{DeviceIdentity, TrustStore, device_id_from_cert_der};

/// Accepts client certificates whose device ID is trusted.
#[derive(Debug)]
pub struct DeviceCertVerifier {
	trust: Arc<TrustStore>,
	provider: Arc<rustls::crypto::CryptoProvider>,
}

impl DeviceCertVerifier {
	pub fn new(trust: Arc<TrustStore>) -> Self {
		Self {
			trust,
			provider: Arc::new(rustls::crypto::ring::default_provider()),
		}
	}
}

impl ClientCertVerifier for DeviceCertVerifier {
	fn offer_client_auth(&self) -> bool {
		true
	}

	fn client_auth_mandatory(&self) -> bool {
		true
	}

	fn root_hint_subjects(&self) -> &[DistinguishedName] {
		&[]
	}

	fn verify_client_cert(
		&self,
		end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_now: UnixTime,
	) -> std::result::Result<ClientCertVerified, rustls::Error> {
		let device_id = device_id_from_cert_der(end_entity.as_ref())
			.map_err(|_| rustls::Error::InvalidCertificate(rustls::CertificateError::BadEncoding))?;

		if self.trust.contains(&device_id) {
			Ok(ClientCertVerified::assertion())
		} else {
			tracing::warn!(target = "scout.tls", device_id = %device_id, "rejecting untrusted peer");
			Err(rustls::Error::InvalidCertificate(rustls::CertificateError::ApplicationVerificationFailure))
		}
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.provider.signature_verification_algorithms.supported_schemes()
	}
}

/// Builds the acceptor for the secure listener: server identity from the
/// device cert, client auth through the trust store.
pub fn build_acceptor(identity: &DeviceIdentity, trust: Arc<TrustStore>) -> Result<TlsAcceptor> {
	let certs = parse_certs(identity.cert_pem())?;
	let key = parse_key(identity.key_pem())?;

	let verifier = Arc::new(DeviceCertVerifier::new(trust));
	let config = ServerConfig::builder()
		.with_client_cert_verifier(verifier)
		.with_single_cert(certs, key)
		.context("building TLS server config")?;

	Ok(TlsAcceptor::from(Arc::new(config)))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
	let mut reader = std::io::Cursor::new(pem.as_bytes());
	rustls_pemfile::certs(&mut reader)
		.collect::<std::result::Result<Vec<_>, _>>()
		.context("parsing device certificate")
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
	let mut reader = std::io::Cursor::new(pem.as_bytes());
	rustls_pemfile::private_key(&mut reader)
		.context("parsing device key")?
		.context("device key PEM contains no private key")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn verify(verifier: &DeviceCertVerifier, cert_pem: &str) -> std::result::Result<ClientCertVerified, rustls::Error> {
		let certs = parse_certs(cert_pem).unwrap();
		verifier.verify_client_cert(&certs[0], &[], UnixTime::now())
	}

	#[test]
	fn trusted_peer_is_accepted_untrusted_rejected() {
		let server_dir = tempfile::tempdir().unwrap();
		let peer_dir = tempfile::tempdir().unwrap();
		let stranger_dir = tempfile::tempdir().unwrap();

		let peer = DeviceIdentity::load_or_generate(peer_dir.path()).unwrap();
		let stranger = DeviceIdentity::load_or_generate(stranger_dir.path()).unwrap();

		let trust = Arc::new(TrustStore::load(server_dir.path()).unwrap());
		trust.add(peer.device_id()).unwrap();

		let verifier = DeviceCertVerifier::new(trust);
		assert!(verify(&verifier, peer.cert_pem()).is_ok());
		assert!(verify(&verifier, stranger.cert_pem()).is_err());
	}

	#[test]
	fn acceptor_builds_from_generated_identity() {
		let dir = tempfile::tempdir().unwrap();
		let identity = DeviceIdentity::load_or_generate(dir.path()).unwrap();
		let trust = Arc::new(TrustStore::load(dir.path()).unwrap());
		assert!(build_acceptor(&identity, trust).is_ok());
	}
}
