#![forbid(unsafe_code)]

//! The two-phase signature service.
//!
//! A session is created for one [`SigningRequest`], hands out the digest to
//! sign in [`pre_sign`](SignatureService::pre_sign) and writes the signed
//! document once [`post_sign`](SignatureService::post_sign) receives the
//! signature value. Container input is kept in a temporary file for the
//! lifetime of the session; the file is gone once the session is signed,
//! has failed or is dropped.

use std::fs::File;
use std::io::Write;

use dss_core::config::DssConfig;
use dss_core::{Error, Result};
use dss_crypto::DigestAlgo;
use dss_xades::facets::xades::XADES_DIGESTS;
use dss_xades::facets::{IdentityFacet, KeyInfoFacet, OdfFacet, XadesFacet, XadesXlFacet};
use dss_xades::{
    DigestInfo, NoSource, PendingSignature, RevocationDataService, SignatureBuilder, SignatureFacet,
    Signer, TimestampService, ZipSource,
};

use crate::formats::{asic, ooxml, package, xml};
use crate::request::{ContentType, SigningRequest};
use crate::storage::TemporaryDataStorage;

/// The services a signing session calls out to.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub timestamp: &'a dyn TimestampService,
    pub revocation: &'a dyn RevocationDataService,
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    PreSigned,
    Signed,
    Failed,
}

enum State {
    Created,
    PreSigned(PendingSignature),
    Signed,
    Failed,
}

pub struct SignatureService<'a> {
    content_type: ContentType,
    builder: SignatureBuilder<'a>,
    /// The XML document a signature is appended to.
    host: Option<String>,
    /// Snapshot of container input.
    storage: Option<TemporaryDataStorage>,
    state: State,
}

impl<'a> SignatureService<'a> {
    /// Start a session, keeping container input in the system temporary
    /// directory.
    pub fn new(
        request: &SigningRequest,
        capabilities: Capabilities<'a>,
        config: &DssConfig,
    ) -> Result<Self> {
        let storage = if request.content_type().is_container() {
            Some(TemporaryDataStorage::new()?)
        } else {
            None
        };
        Self::build(request, capabilities, config, storage)
    }

    /// Start a session backed by `storage`.
    pub fn with_storage(
        request: &SigningRequest,
        capabilities: Capabilities<'a>,
        config: &DssConfig,
        mut storage: TemporaryDataStorage,
    ) -> Result<Self> {
        if request.content_type().is_container() {
            Self::build(request, capabilities, config, Some(storage))
        } else {
            storage.close()?;
            Self::build(request, capabilities, config, None)
        }
    }

    fn build(
        request: &SigningRequest,
        capabilities: Capabilities<'a>,
        config: &DssConfig,
        mut storage: Option<TemporaryDataStorage>,
    ) -> Result<Self> {
        let content_type = request.content_type();
        let prepared = prepare(request, capabilities, config, storage.as_mut());
        match prepared {
            Ok((builder, host)) => {
                log::info!(
                    "{content_type} signing session with {} (facets: {})",
                    builder.digest(),
                    builder.facet_names().join(", ")
                );
                Ok(Self {
                    content_type,
                    builder,
                    host,
                    storage,
                    state: State::Created,
                })
            }
            Err(e) => {
                if let Some(storage) = storage.as_mut() {
                    storage.close()?;
                }
                Err(e)
            }
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// The digest algorithm negotiated for this session.
    pub fn digest(&self) -> DigestAlgo {
        self.builder.digest()
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Created => SessionState::Created,
            State::PreSigned(_) => SessionState::PreSigned,
            State::Signed => SessionState::Signed,
            State::Failed => SessionState::Failed,
        }
    }

    /// Build the signature for `chain` (signer first) and return the digest
    /// the external signer has to sign.
    pub fn pre_sign(&mut self, chain: &[Vec<u8>]) -> Result<Vec<DigestInfo>> {
        if !matches!(self.state, State::Created) {
            return Err(Error::Precondition(format!(
                "pre-sign in state {:?}",
                self.state()
            )));
        }
        match self.build_signature(chain) {
            Ok(pending) => {
                if let Some(storage) = self.storage.as_mut() {
                    storage.set_attribute("signature-id", pending.signature_id.as_str());
                }
                log::debug!("pre-signed {}", pending.signature_id);
                let digest_info = pending.digest_info.clone();
                self.state = State::PreSigned(pending);
                Ok(vec![digest_info])
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Complete the signature with `signature_value` and write the signed
    /// document to `out`.
    pub fn post_sign(
        &mut self,
        signature_value: &[u8],
        chain: &[Vec<u8>],
        out: &mut dyn Write,
    ) -> Result<()> {
        let pending = match std::mem::replace(&mut self.state, State::Failed) {
            State::PreSigned(pending) => pending,
            other => {
                self.state = other;
                return Err(Error::Precondition(format!(
                    "post-sign in state {:?}",
                    self.state()
                )));
            }
        };
        let id = pending.signature_id.clone();
        match self.write_signature(pending, signature_value, chain, out) {
            Ok(()) => {
                self.close_storage()?;
                self.state = State::Signed;
                log::info!("signature {id} written");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run both phases with `signer`.
    pub fn sign(mut self, signer: &dyn Signer, chain: &[Vec<u8>], out: &mut dyn Write) -> Result<()> {
        let digest_infos = self.pre_sign(chain)?;
        let value = match signer.sign(&digest_infos, chain) {
            Ok(value) => value,
            Err(e) => return Err(self.fail(e)),
        };
        self.post_sign(&value, chain, out)
    }

    fn build_signature(&self, chain: &[Vec<u8>]) -> Result<PendingSignature> {
        match self.content_type {
            ContentType::Xml => self.builder.pre_sign(chain, &NoSource, self.host.as_deref()),
            _ => {
                let source = self.container()?;
                let host = match self.content_type {
                    ContentType::Zip | ContentType::Odf => Some(package::host_document(&source)?),
                    ContentType::Asic => Some(asic::host_document(&source)?),
                    _ => None,
                };
                self.builder.pre_sign(chain, &source, host.as_deref())
            }
        }
    }

    fn write_signature(
        &self,
        pending: PendingSignature,
        signature_value: &[u8],
        chain: &[Vec<u8>],
        out: &mut dyn Write,
    ) -> Result<()> {
        let signed = self.builder.post_sign(pending, signature_value, chain)?;
        match self.content_type {
            ContentType::Xml => xml::write_signed(&signed, out),
            ContentType::Zip | ContentType::Odf => {
                package::write_signed(&mut self.container()?.into_inner(), &signed, out)
            }
            ContentType::Asic => asic::write_signed(&mut self.container()?.into_inner(), &signed, out),
            ContentType::Ooxml => ooxml::write_signed(self.container()?, &signed, out),
        }
    }

    fn container(&self) -> Result<ZipSource<File>> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| Error::Precondition("no container snapshot".into()))?;
        ZipSource::new(storage.open()?)
    }

    fn close_storage(&mut self) -> Result<()> {
        match self.storage.as_mut() {
            Some(storage) => storage.close(),
            None => Ok(()),
        }
    }

    /// Move to `Failed`, dropping the snapshot, and hand back `e`.
    fn fail(&mut self, e: Error) -> Error {
        self.state = State::Failed;
        if let Err(close) = self.close_storage() {
            log::warn!("could not remove temporary storage: {close}");
        }
        e
    }
}

/// Negotiate the digest, check the document and assemble the facets.
fn prepare<'a>(
    request: &SigningRequest,
    capabilities: Capabilities<'a>,
    config: &DssConfig,
    storage: Option<&mut TemporaryDataStorage>,
) -> Result<(SignatureBuilder<'a>, Option<String>)> {
    let content_type = request.content_type();
    let digest = negotiate_digest(request, config)?;
    let timestamp_digest = DigestAlgo::from_name(&config.timestamp_digest_algorithm)?;

    let host = match storage {
        Some(storage) => {
            storage.write(request.document())?;
            storage.set_attribute("content-type", content_type.mime_type());
            ZipSource::new(storage.open()?)
                .map_err(|e| Error::DocumentFormat(format!("not a {content_type} container: {e}")))?;
            None
        }
        None => Some(xml::host_document(request.document())?),
    };

    let mut facets: Vec<Box<dyn SignatureFacet + 'a>> = match content_type {
        ContentType::Xml => xml::facets(),
        ContentType::Zip => package::facets(false),
        ContentType::Odf => package::facets(true),
        ContentType::Asic => asic::facets(),
        ContentType::Ooxml => ooxml::facets(),
    };
    if let Some(identity) = request.identity() {
        facets.push(Box::new(IdentityFacet::new(identity.clone())));
    }
    facets.push(Box::new(KeyInfoFacet::default()));
    let role = request.role().map(str::to_owned).or_else(|| config.role.clone());
    facets.push(Box::new(XadesFacet::new(role, digest)?));
    facets.push(Box::new(XadesXlFacet::new(
        capabilities.timestamp,
        capabilities.revocation,
        timestamp_digest,
    )?));

    let mut builder = SignatureBuilder::new(digest);
    for facet in facets {
        builder.add_facet(facet);
    }
    Ok((builder, host))
}

/// The request's digest, or the configured default. ODF packages are
/// always signed with SHA-1.
fn negotiate_digest(request: &SigningRequest, config: &DssConfig) -> Result<DigestAlgo> {
    let digest = match request.digest() {
        Some(digest) => digest,
        None => DigestAlgo::from_name(&config.digest_algorithm)?,
    };
    if !XADES_DIGESTS.contains(&digest) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "signature digest {digest}"
        )));
    }
    if request.content_type() == ContentType::Odf && digest != OdfFacet::DIGEST {
        log::warn!("ODF signatures use {} instead of {digest}", OdfFacet::DIGEST);
        return Ok(OdfFacet::DIGEST);
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tests::build_zip;
    use crate::testutil::Fixture;
    use dss_keys::testing::pki;
    use dss_xades::local::LocalSigner;

    fn zip() -> Vec<u8> {
        build_zip(&[("a.txt", b"a"), ("b.txt", b"b")])
    }

    fn empty_dir(dir: &tempfile::TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[test]
    fn digest_negotiation() {
        let config = DssConfig::default();
        let xml = SigningRequest::new(b"<a/>".to_vec(), ContentType::Xml);
        assert_eq!(negotiate_digest(&xml, &config).unwrap(), DigestAlgo::Sha256);
        let sha512 = xml.clone().with_digest(DigestAlgo::Sha512);
        assert_eq!(negotiate_digest(&sha512, &config).unwrap(), DigestAlgo::Sha512);
        assert!(matches!(
            negotiate_digest(&xml.clone().with_digest(DigestAlgo::Sha384), &config),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        let odf = SigningRequest::new(Vec::new(), ContentType::Odf).with_digest(DigestAlgo::Sha256);
        assert_eq!(negotiate_digest(&odf, &config).unwrap(), DigestAlgo::Sha1);

        let mut bad = DssConfig::default();
        bad.digest_algorithm = "md5".into();
        assert!(matches!(negotiate_digest(&xml, &bad), Err(Error::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn unsupported_digest_fails_before_signing() {
        let f = Fixture::new();
        let request = SigningRequest::new(b"<a/>".to_vec(), ContentType::Xml).with_digest(DigestAlgo::Sha224);
        let err = SignatureService::new(&request, f.capabilities(), &DssConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn wrong_format_is_rejected() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let request = SigningRequest::new(b"<not-a-zip/>".to_vec(), ContentType::Zip);
        let storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
        let err = SignatureService::with_storage(&request, f.capabilities(), &DssConfig::default(), storage)
            .err()
            .unwrap();
        assert!(matches!(err, Error::DocumentFormat(_)));
        assert!(empty_dir(&dir));

        let request = SigningRequest::new(zip(), ContentType::Xml);
        let err = SignatureService::new(&request, f.capabilities(), &DssConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::DocumentFormat(_)));
    }

    #[test]
    fn phases_run_in_order() {
        let f = Fixture::new();
        let chain = pki().signer.chain();
        let request = SigningRequest::new(b"<a/>".to_vec(), ContentType::Xml);
        let mut service = SignatureService::new(&request, f.capabilities(), &DssConfig::default()).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            service.post_sign(b"sig", chain, &mut out),
            Err(Error::Precondition(_))
        ));
        assert_eq!(service.state(), SessionState::Created);

        let infos = service.pre_sign(chain).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].digest_algorithm, DigestAlgo::Sha256);
        assert!(matches!(service.pre_sign(chain), Err(Error::Precondition(_))));
        assert_eq!(service.state(), SessionState::PreSigned);

        let value = LocalSigner::new(pki().signer.clone()).sign(&infos, chain).unwrap();
        service.post_sign(&value, chain, &mut out).unwrap();
        assert_eq!(service.state(), SessionState::Signed);
        assert!(matches!(
            service.post_sign(&value, chain, &mut out),
            Err(Error::Precondition(_))
        ));
        assert_eq!(f.verifier().verify_signatures(&out, ContentType::Xml, None).unwrap().len(), 1);
    }

    #[test]
    fn temporary_file_removed_after_signing() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let request = SigningRequest::new(zip(), ContentType::Zip);
        let storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
        let mut service =
            SignatureService::with_storage(&request, f.capabilities(), &DssConfig::default(), storage).unwrap();
        assert!(!empty_dir(&dir));
        let chain = pki().signer.chain();
        let infos = service.pre_sign(chain).unwrap();
        let value = LocalSigner::new(pki().signer.clone()).sign(&infos, chain).unwrap();
        let mut out = Vec::new();
        service.post_sign(&value, chain, &mut out).unwrap();
        assert!(empty_dir(&dir));
        assert_eq!(f.verifier().verify_signatures(&out, ContentType::Zip, None).unwrap().len(), 1);
    }

    #[test]
    fn temporary_file_removed_after_failure() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let request = SigningRequest::new(zip(), ContentType::Zip);
        let storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
        let mut service =
            SignatureService::with_storage(&request, f.capabilities(), &DssConfig::default(), storage).unwrap();
        assert!(matches!(service.pre_sign(&[]), Err(Error::Precondition(_))));
        assert_eq!(service.state(), SessionState::Failed);
        assert!(empty_dir(&dir));
    }

    #[test]
    fn dropped_session_leaves_no_file() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        {
            let request = SigningRequest::new(zip(), ContentType::Zip);
            let storage = TemporaryDataStorage::new_in(dir.path()).unwrap();
            let mut service =
                SignatureService::with_storage(&request, f.capabilities(), &DssConfig::default(), storage)
                    .unwrap();
            service.pre_sign(pki().signer.chain()).unwrap();
        }
        assert!(empty_dir(&dir));
    }

    #[test]
    fn role_and_identity_are_signed() {
        let f = Fixture::new();
        let identity = dss_xades::Identity {
            first_name: "Alice".into(),
            name: "Smith".into(),
            middle_name: None,
            gender: Some("F".into()),
            photo: Some(vec![0xff, 0xd8, 0xff]),
        };
        let request = SigningRequest::new(b"<doc><p>text</p></doc>".to_vec(), ContentType::Xml)
            .with_role("Director")
            .with_identity(identity.clone());
        let signed = f.sign(request).unwrap();
        let infos = f.verifier().verify_signatures(&signed, ContentType::Xml, None).unwrap();
        assert_eq!(infos[0].role.as_deref(), Some("Director"));
        assert_eq!(infos[0].identity.as_ref(), Some(&identity));

        let mut config = DssConfig::default();
        config.role = Some("Clerk".into());
        let request = SigningRequest::new(b"<doc/>".to_vec(), ContentType::Xml);
        let signed = f.sign_with_config(request, &config).unwrap();
        let infos = f.verifier().verify_signatures(&signed, ContentType::Xml, None).unwrap();
        assert_eq!(infos[0].role.as_deref(), Some("Clerk"));
    }
}
