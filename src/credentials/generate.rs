//! Self-signed certificate generation.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};

use super::store::TlsCredentialPair;

const KEY_BITS: u32 = 2048;

/// Generate an RSA key and a SHA-256 certificate for `common_name`, valid
/// from now for `validity_days`.
pub fn generate_self_signed(common_name: &str, validity_days: u32) -> Result<TlsCredentialPair, ErrorStack> {
    let rsa = Rsa::generate(KEY_BITS)?;
    let key = PKey::from_rsa(rsa)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    let serial = {
        let mut bn = BigNum::new()?;
        bn.rand(159, MsbOption::MAYBE_ZERO, false)?;
        bn.to_asn1_integer()?
    };
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(validity_days)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;

    let san = SubjectAlternativeName::new()
        .dns(common_name)
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(san)?;

    builder.sign(&key, MessageDigest::sha256())?;
    let certificate = builder.build();

    Ok(TlsCredentialPair {
        private_key: key.private_key_to_pem_pkcs8()?,
        certificate: certificate.to_pem()?,
    })
}
