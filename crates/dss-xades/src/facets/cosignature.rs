#![forbid(unsafe_code)]

//! Enveloped co-signature over the whole document.
//!
//! The reference excludes every `ds:Signature` of the document, so further
//! signatures can be appended without breaking this one.

use dss_c14n::C14nMode;
use dss_core::Result;

use crate::facet::{ReferenceSpec, SignatureContext, SignatureFacet, TransformSpec};

#[derive(Debug, Default, Clone, Copy)]
pub struct CoSignatureFacet;

impl SignatureFacet for CoSignatureFacet {
    fn name(&self) -> &'static str {
        "co-signature"
    }

    fn pre_sign(&self, ctx: &mut SignatureContext<'_>) -> Result<()> {
        let reference = ReferenceSpec::same_document("", ctx.digest())
            .with_transform(TransformSpec::SignatureExclusion)
            .with_transform(TransformSpec::C14n(C14nMode::Exclusive));
        ctx.add_reference(reference);
        Ok(())
    }
}
