#![forbid(unsafe_code)]

//! `ds:KeyInfo` carrying the signing certificate chain.

use base64::Engine;
use dss_core::Result;
use dss_xml::XmlWriter;

use crate::facet::{SignatureContext, SignatureFacet, B64};

#[derive(Debug, Clone, Copy)]
pub struct KeyInfoFacet {
    /// Embed the whole chain instead of the signer certificate only.
    include_chain: bool,
}

impl KeyInfoFacet {
    pub fn new(include_chain: bool) -> Self {
        Self { include_chain }
    }
}

impl Default for KeyInfoFacet {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SignatureFacet for KeyInfoFacet {
    fn name(&self) -> &'static str {
        "key-info"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        ctx.signer_certificate()?;
        let certs = if self.include_chain {
            ctx.chain()
        } else {
            &ctx.chain()[..1]
        };

        let mut w = XmlWriter::new();
        w.start_element("ds:KeyInfo", &[]);
        w.start_element("ds:X509Data", &[]);
        for cert in certs {
            w.text_element("ds:X509Certificate", &[], &B64.encode(cert));
        }
        w.end_element("ds:X509Data");
        w.end_element("ds:KeyInfo");
        ctx.set_key_info(w.into_string());
        Ok(())
    }
}
