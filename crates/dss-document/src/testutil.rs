#![forbid(unsafe_code)]

//! Shared fixtures for the signing and verification tests.

use dss_core::config::DssConfig;
use dss_core::Result;
use dss_crypto::ocsp::CertStatus;
use dss_keys::testing::{self, pki};
use dss_keys::TrustStore;
use dss_xades::local::{
    LocalSigner, LocalTimestampService, LocalTimestampValidator, StaticRevocationSource,
    TrustStoreValidator,
};
use dss_xades::RevocationData;

use crate::request::SigningRequest;
use crate::service::{Capabilities, SignatureService};
use crate::verification::VerificationService;

/// Local capabilities around the test PKI, with revocation data covering
/// the signer and the time-stamp authority.
pub(crate) struct Fixture {
    trust: TrustStoreValidator,
    timestamps: LocalTimestampValidator,
    tsa: LocalTimestampService,
    revocation: StaticRevocationSource,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let pki = pki();
        let mut store = TrustStore::new();
        store.add_anchor(pki.ca_cert.clone()).unwrap();
        let revocation = RevocationData::new(
            vec![testing::ocsp(pki, &pki.signer.chain()[0], CertStatus::Good)],
            vec![testing::crl(pki, &[])],
        );
        Self {
            trust: TrustStoreValidator::new(store.clone(), true),
            timestamps: LocalTimestampValidator::new(store),
            tsa: LocalTimestampService::new(pki.tsa.clone(), RevocationData::default()),
            revocation: StaticRevocationSource::new(revocation),
        }
    }

    pub(crate) fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            timestamp: &self.tsa,
            revocation: &self.revocation,
        }
    }

    pub(crate) fn verifier(&self) -> VerificationService<'_> {
        VerificationService::new(&self.trust, &self.timestamps, DssConfig::default())
    }

    pub(crate) fn chain(&self) -> &'static [Vec<u8>] {
        pki().signer.chain()
    }

    /// Run both signing phases with the test signer.
    pub(crate) fn sign(&self, request: SigningRequest) -> Result<Vec<u8>> {
        self.sign_with_config(request, &DssConfig::default())
    }

    pub(crate) fn sign_with_config(&self, request: SigningRequest, config: &DssConfig) -> Result<Vec<u8>> {
        let service = SignatureService::new(&request, self.capabilities(), config)?;
        let mut out = Vec::new();
        service.sign(&LocalSigner::new(pki().signer.clone()), self.chain(), &mut out)?;
        Ok(out)
    }
}
