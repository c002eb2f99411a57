//! Cluster certificate authority
//!
//! The CA key pair and certificate are generated on first use and persisted
//! under `pki/`. Component certificates (apiserver, kubelet, ...) are signed
//! by the CA and persisted next to it, keyed by id.

use crate::error::{Result, StateError};
use crate::vfs::{Vfs, validate_id};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const CA_ID: &str = "ca";
const CA_COMMON_NAME: &str = "kubernetes";

/// A certificate issued by (or being) the cluster CA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub id: String,
    pub subject: String,
    pub alternate_names: Vec<String>,
    pub certificate_pem: String,
    pub private_key_pem: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CertificateMeta {
    subject: String,
    alternate_names: Vec<String>,
}

/// Persistent CA with issue/find operations
#[derive(Debug)]
pub struct CaStore {
    vfs: Arc<dyn Vfs>,
    // Serializes CA creation and issuance
    lock: Mutex<Option<IssuedCertificate>>,
}

impl CaStore {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Self {
            vfs,
            lock: Mutex::new(None),
        }
    }

    fn cert_path(id: &str) -> String {
        format!("pki/issued/{id}.crt")
    }

    fn meta_path(id: &str) -> String {
        format!("pki/issued/{id}.json")
    }

    fn key_path(id: &str) -> String {
        format!("pki/private/{id}.key")
    }

    fn read_string(&self, path: &str) -> Result<Option<String>> {
        match self.vfs.read(path)? {
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|e| StateError::Pki(format!("{path} is not valid UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    fn load(&self, id: &str) -> Result<Option<IssuedCertificate>> {
        let cert = self.read_string(&Self::cert_path(id))?;
        let key = self.read_string(&Self::key_path(id))?;
        let (Some(certificate_pem), Some(private_key_pem)) = (cert, key) else {
            return Ok(None);
        };

        let meta_path = Self::meta_path(id);
        let meta = match self.vfs.read(&meta_path)? {
            Some(raw) => {
                serde_json::from_slice(&raw).map_err(|e| StateError::json(&meta_path, e))?
            }
            None => CertificateMeta {
                subject: id.to_string(),
                alternate_names: Vec::new(),
            },
        };

        Ok(Some(IssuedCertificate {
            id: id.to_string(),
            subject: meta.subject,
            alternate_names: meta.alternate_names,
            certificate_pem,
            private_key_pem,
        }))
    }

    fn persist(&self, issued: &IssuedCertificate) -> Result<()> {
        let meta_path = Self::meta_path(&issued.id);
        let meta = CertificateMeta {
            subject: issued.subject.clone(),
            alternate_names: issued.alternate_names.clone(),
        };
        let meta = serde_json::to_vec_pretty(&meta).map_err(|e| StateError::json(&meta_path, e))?;

        // Key first: a certificate without its key is never observable
        self.vfs
            .write(&Self::key_path(&issued.id), issued.private_key_pem.as_bytes())?;
        self.vfs.write(&meta_path, &meta)?;
        self.vfs
            .write(&Self::cert_path(&issued.id), issued.certificate_pem.as_bytes())?;
        Ok(())
    }

    fn ca_locked(&self, slot: &mut Option<IssuedCertificate>) -> Result<IssuedCertificate> {
        if let Some(ca) = slot.as_ref() {
            return Ok(ca.clone());
        }
        let ca = match self.load(CA_ID)? {
            Some(ca) => ca,
            None => {
                let ca = generate_ca()?;
                self.persist(&ca)?;
                tracing::info!(location = %self.vfs.location(), "Created cluster CA");
                ca
            }
        };
        *slot = Some(ca.clone());
        Ok(ca)
    }

    /// The CA certificate and key, created on first use
    pub fn ca(&self) -> Result<IssuedCertificate> {
        let mut slot = self.lock.lock().map_err(|_| StateError::LockPoisoned)?;
        self.ca_locked(&mut slot)
    }

    /// PEM certificate of the CA
    pub fn ca_certificate_pem(&self) -> Result<String> {
        Ok(self.ca()?.certificate_pem)
    }

    /// A previously issued certificate
    pub fn find_cert(&self, id: &str) -> Result<Option<IssuedCertificate>> {
        validate_id(id)?;
        let _guard = self.lock.lock().map_err(|_| StateError::LockPoisoned)?;
        self.load(id)
    }

    /// Sign a new certificate for `subject` and persist it under `id`,
    /// replacing any previous certificate with that id
    #[tracing::instrument(skip(self, alternate_names))]
    pub fn issue(
        &self,
        id: &str,
        subject: &str,
        alternate_names: &[String],
    ) -> Result<IssuedCertificate> {
        validate_id(id)?;
        if id == CA_ID {
            return Err(StateError::InvalidId(id.to_string()));
        }

        let mut slot = self.lock.lock().map_err(|_| StateError::LockPoisoned)?;
        let ca = self.ca_locked(&mut slot)?;

        let ca_key = KeyPair::from_pem(&ca.private_key_pem)?;
        let issuer = Issuer::from_ca_cert_pem(&ca.certificate_pem, ca_key)?;

        let mut params = CertificateParams::new(alternate_names.to_vec())?;
        params.distinguished_name = distinguished_name(subject);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        params.not_before = rcgen::date_time_ymd(2025, 1, 1);
        params.not_after = rcgen::date_time_ymd(2035, 1, 1);

        let key_pair = KeyPair::generate()?;
        let cert = params.signed_by(&key_pair, &issuer)?;

        let issued = IssuedCertificate {
            id: id.to_string(),
            subject: subject.to_string(),
            alternate_names: alternate_names.to_vec(),
            certificate_pem: cert.pem(),
            private_key_pem: key_pair.serialize_pem(),
        };
        self.persist(&issued)?;
        tracing::info!(id = %id, subject = %subject, "Issued certificate");
        Ok(issued)
    }

    /// Return the certificate stored under `id`, issuing it when absent
    pub fn get_or_issue(
        &self,
        id: &str,
        subject: &str,
        alternate_names: &[String],
    ) -> Result<IssuedCertificate> {
        match self.find_cert(id)? {
            Some(existing) => Ok(existing),
            None => self.issue(id, subject, alternate_names),
        }
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

fn generate_ca() -> Result<IssuedCertificate> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(CA_COMMON_NAME);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = rcgen::date_time_ymd(2025, 1, 1);
    params.not_after = rcgen::date_time_ymd(2035, 1, 1);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(IssuedCertificate {
        id: CA_ID.to_string(),
        subject: CA_COMMON_NAME.to_string(),
        alternate_names: Vec::new(),
        certificate_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
    })
}
