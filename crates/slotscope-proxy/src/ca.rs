//! Certificate Authority management for the MITM proxy.
//!
//! Ensures a locally-trusted root certificate/key pair exists on disk,
//! generating one on first use. The engine signs per-domain leaf
//! certificates with it on the fly. Provisioning failure is fatal to
//! session start; it is never retried.

use std::fs;
use std::path::{Path, PathBuf};

use hudsucker::certificate_authority::RcgenAuthority;
use hudsucker::rcgen::{CertificateParams, DnType, Issuer, KeyPair};
use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use time::{Duration, OffsetDateTime};

use slotscope_core::CertificateError;

/// CA certificate and key file names, fixed by the persisted layout.
const CA_CERT_FILENAME: &str = "slotscope-ca.pem";
const CA_KEY_FILENAME: &str = "slotscope-ca.key";

const CA_COMMON_NAME: &str = "Slotscope Root CA";
const RSA_KEY_BITS: usize = 2048;
const CA_VALIDITY_DAYS: i64 = 3650;

/// Manages the root CA certificate for the MITM proxy.
///
/// The files are written once, before the session handles any traffic,
/// and are read-only afterward.
#[derive(Debug, Clone)]
pub struct CaManager {
    ca_dir: PathBuf,
}

impl CaManager {
    /// Creates a new CA manager rooted at the given directory.
    pub fn new(ca_dir: impl AsRef<Path>) -> Self {
        Self {
            ca_dir: ca_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the CA certificate file.
    pub fn cert_path(&self) -> PathBuf {
        self.ca_dir.join(CA_CERT_FILENAME)
    }

    /// Returns the path to the CA private key file.
    pub fn key_path(&self) -> PathBuf {
        self.ca_dir.join(CA_KEY_FILENAME)
    }

    /// Checks whether both CA files exist.
    pub fn ca_exists(&self) -> bool {
        self.cert_path().exists() && self.key_path().exists()
    }

    /// Ensures the CA certificate exists, generating it if necessary,
    /// and returns the certificate and key paths. Idempotent when the
    /// files are already present.
    pub fn ensure_certificate(&self) -> Result<(PathBuf, PathBuf), CertificateError> {
        if !self.ca_exists() {
            self.generate_ca()?;
        }
        Ok((self.cert_path(), self.key_path()))
    }

    /// Generates a new RSA-2048 key and self-signed root certificate,
    /// writing both atomically.
    fn generate_ca(&self) -> Result<(), CertificateError> {
        fs::create_dir_all(&self.ca_dir)?;

        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CertificateError::Generation(e.to_string()))?;
        let key_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CertificateError::Generation(e.to_string()))?;
        let key_pair = KeyPair::from_pem(key_pem.as_str())
            .map_err(|e| CertificateError::Generation(e.to_string()))?;

        let mut params = CertificateParams::new(vec![CA_COMMON_NAME.to_string()])
            .map_err(|e| CertificateError::Generation(e.to_string()))?;
        params
            .distinguished_name
            .push(DnType::CommonName, CA_COMMON_NAME);
        params.is_ca =
            hudsucker::rcgen::IsCa::Ca(hudsucker::rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![
            hudsucker::rcgen::KeyUsagePurpose::KeyCertSign,
            hudsucker::rcgen::KeyUsagePurpose::CrlSign,
            hudsucker::rcgen::KeyUsagePurpose::DigitalSignature,
        ];
        params.extended_key_usages = vec![
            hudsucker::rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            hudsucker::rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = OffsetDateTime::now_utc() + Duration::days(CA_VALIDITY_DAYS);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertificateError::Generation(e.to_string()))?;

        write_atomic(&self.cert_path(), cert.pem().as_bytes())?;
        write_atomic(&self.key_path(), key_pem.as_bytes())?;

        tracing::info!(path = %self.cert_path().display(), "generated new CA certificate");
        Ok(())
    }

    /// Loads the CA material and builds the hudsucker authority used
    /// to sign leaf certificates.
    pub fn load_authority(&self) -> Result<RcgenAuthority, CertificateError> {
        let cert_pem = fs::read_to_string(self.cert_path())?;
        let key_pem = fs::read_to_string(self.key_path())?;

        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| CertificateError::Parse(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(&cert_pem, key_pair)
            .map_err(|e| CertificateError::Parse(e.to_string()))?;

        Ok(RcgenAuthority::new(issuer, 1000, default_provider()))
    }
}

/// Writes via a sibling temp file and rename so a crash mid-write
/// never leaves a truncated certificate behind.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CertificateError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| CertificateError::Generation(format!("invalid path {}", path.display())))?
        .to_string_lossy()
        .into_owned();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
