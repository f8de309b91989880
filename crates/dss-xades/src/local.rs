#![forbid(unsafe_code)]

//! In-process implementations of the capabilities, used by the command
//! line host and the tests.

use chrono::{DateTime, Utc};
use dss_core::{Error, Result};
use dss_crypto::sign::{self, SignatureFormat};
use dss_crypto::tsp::{self, TimeStampToken, TsaSigner};
use dss_crypto::DigestAlgo;
use dss_keys::{cert, validate_chain, Credential, TrustStore, ValidationContext};
use rand::RngCore;

use crate::spi::{
    single_digest, DigestInfo, RevocationData, RevocationDataService, Signer, TimeStampResponse,
    TimestampService, TimestampValidator, TrustValidator,
};

/// Signs with a private key held in memory.
pub struct LocalSigner {
    credential: Credential,
}

impl LocalSigner {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn chain(&self) -> &[Vec<u8>] {
        self.credential.chain()
    }
}

impl Signer for LocalSigner {
    fn sign(&self, digest_infos: &[DigestInfo], chain: &[Vec<u8>]) -> Result<Vec<u8>> {
        let info = single_digest(digest_infos)?;
        if chain.first().map(Vec::as_slice) != Some(self.credential.signer_certificate()) {
            return Err(Error::Key("chain does not belong to the signing key".into()));
        }
        sign::sign_prehash(
            self.credential.key(),
            info.digest_algorithm,
            &info.digest_value,
            SignatureFormat::XmlDsig,
        )
    }
}

/// A time-stamp authority issuing tokens with its own key.
pub struct LocalTimestampService {
    tsa: Credential,
    revocation: RevocationData,
}

impl LocalTimestampService {
    /// `revocation` is handed out with every token.
    pub fn new(tsa: Credential, revocation: RevocationData) -> Self {
        Self { tsa, revocation }
    }
}

impl TimestampService for LocalTimestampService {
    fn timestamp(&self, data: &[u8], digest: DigestAlgo) -> Result<TimeStampResponse> {
        let mut serial = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut serial);
        serial[0] &= 0x7f;
        let now = Utc::now();
        let info = tsp::tst_info(tsp::LOCAL_TSA_POLICY, digest, data, &serial, now)?;
        let token = tsp::build_token(
            &info,
            &TsaSigner {
                key: self.tsa.key(),
                certificate: self.tsa.signer_certificate(),
                digest: DigestAlgo::Sha256,
            },
        )?;
        log::debug!("issued time-stamp at {now}");
        Ok(TimeStampResponse {
            token,
            revocation: self.revocation.clone(),
        })
    }
}

/// Checks tokens against a set of trusted roots.
pub struct LocalTimestampValidator {
    anchors: TrustStore,
}

impl LocalTimestampValidator {
    pub fn new(anchors: TrustStore) -> Self {
        Self { anchors }
    }

    /// Verify the token signature and return the signer's chain, leaf
    /// first, taken from the certificates embedded in the token.
    fn token_chain(&self, token: &[u8]) -> Result<Vec<Vec<u8>>> {
        let token = TimeStampToken::from_der(token)?;
        let chain = token.certificate_chain()?;
        let leaf = chain
            .first()
            .ok_or_else(|| Error::Timestamp("token carries no certificates".into()))?;
        token.verify_signature(&cert::public_key(&cert::parse_certificate(leaf)?)?)?;
        Ok(chain)
    }

    fn check(&self, token: &[u8], ctx: &ValidationContext<'_>) -> Result<()> {
        let chain = self.token_chain(token)?;
        validate_chain(&chain, ctx)
    }
}

impl TimestampValidator for LocalTimestampValidator {
    fn validate(&self, token: &[u8]) -> Result<()> {
        self.check(
            token,
            &ValidationContext {
                anchors: self.anchors.anchors(),
                at: Utc::now(),
                ocsp_responses: &[],
                crls: &[],
                require_revocation: false,
            },
        )
    }

    fn validate_with_evidence(
        &self,
        token: &[u8],
        evidence: &RevocationData,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check(
            token,
            &ValidationContext {
                anchors: self.anchors.anchors(),
                at,
                ocsp_responses: &evidence.ocsp_responses,
                crls: &evidence.crls,
                require_revocation: true,
            },
        )
    }
}

/// Chain validation against a [`TrustStore`].
pub struct TrustStoreValidator {
    store: TrustStore,
    require_revocation: bool,
}

impl TrustStoreValidator {
    /// With `require_revocation` every certificate below the anchor must be
    /// covered by an OCSP response or a CRL.
    pub fn new(store: TrustStore, require_revocation: bool) -> Self {
        Self {
            store,
            require_revocation,
        }
    }
}

impl TrustValidator for TrustStoreValidator {
    fn validate(
        &self,
        chain: &[Vec<u8>],
        at: DateTime<Utc>,
        ocsp_responses: &[Vec<u8>],
        crls: &[Vec<u8>],
    ) -> Result<()> {
        validate_chain(
            chain,
            &ValidationContext {
                anchors: self.store.anchors(),
                at,
                ocsp_responses,
                crls,
                require_revocation: self.require_revocation,
            },
        )
    }
}

/// Hands out the same revocation data for every chain.
#[derive(Debug, Clone, Default)]
pub struct StaticRevocationSource {
    data: RevocationData,
}

impl StaticRevocationSource {
    pub fn new(data: RevocationData) -> Self {
        Self { data }
    }
}

impl RevocationDataService for StaticRevocationSource {
    fn revocation_data(&self, _chain: &[Vec<u8>]) -> Result<RevocationData> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_crypto::ocsp::CertStatus;
    use dss_keys::testing::{self, pki};

    fn anchors() -> TrustStore {
        let mut store = TrustStore::new();
        store.add_anchor(pki().ca_cert.clone()).unwrap();
        store
    }

    #[test]
    fn timestamp_round_trip() {
        let service = LocalTimestampService::new(pki().tsa.clone(), RevocationData::default());
        let response = service.timestamp(b"data", DigestAlgo::Sha256).unwrap();
        let token = TimeStampToken::from_der(&response.token).unwrap();
        token.check_imprint(b"data").unwrap();
        assert!(token.check_imprint(b"other").is_err());

        let validator = LocalTimestampValidator::new(anchors());
        validator.validate(&response.token).unwrap();
        assert!(LocalTimestampValidator::new(TrustStore::new())
            .validate(&response.token)
            .is_err());
    }

    #[test]
    fn timestamp_with_evidence_needs_coverage() {
        let pki = pki();
        let service = LocalTimestampService::new(pki.tsa.clone(), RevocationData::default());
        let token = service.timestamp(b"data", DigestAlgo::Sha1).unwrap().token;
        let validator = LocalTimestampValidator::new(anchors());
        let none = RevocationData::default();
        assert!(validator.validate_with_evidence(&token, &none, Utc::now()).is_err());
        let ocsp = RevocationData::new(
            vec![testing::ocsp(pki, &pki.tsa.chain()[0], CertStatus::Good)],
            Vec::new(),
        );
        validator.validate_with_evidence(&token, &ocsp, Utc::now()).unwrap();
    }

    #[test]
    fn signer_checks_chain_and_digest_count() {
        let pki = pki();
        let signer = LocalSigner::new(pki.signer.clone());
        let info = DigestInfo {
            digest_algorithm: DigestAlgo::Sha256,
            digest_value: DigestAlgo::Sha256.digest(b"x"),
        };
        let value = signer.sign(&[info.clone()], pki.signer.chain()).unwrap();
        assert_eq!(value.len(), 128);
        assert!(matches!(signer.sign(&[info.clone()], pki.tsa.chain()), Err(Error::Key(_))));
        assert!(signer.sign(&[], pki.signer.chain()).is_err());
    }

    #[test]
    fn trust_store_validator_applies_revocation_policy() {
        let pki = pki();
        let chain = pki.signer.chain();
        let strict = TrustStoreValidator::new(anchors(), true);
        assert!(matches!(
            strict.validate(chain, Utc::now(), &[], &[]),
            Err(Error::Revocation(_))
        ));
        let revoked = testing::crl(pki, &[(vec![0x10, 0x01], Utc::now() - chrono::Duration::hours(1))]);
        assert!(strict.validate(chain, Utc::now(), &[], &[revoked]).is_err());
        let crl = testing::crl(pki, &[]);
        strict.validate(chain, Utc::now(), &[], &[crl]).unwrap();
        TrustStoreValidator::new(anchors(), false)
            .validate(chain, Utc::now(), &[], &[])
            .unwrap();
    }
}
