//! TLS configuration for the terminating listener.

use axum_server::tls_rustls::RustlsConfig;

use crate::credentials::TlsCredentialPair;

/// Build the rustls server config from an in-memory PEM pair.
pub async fn rustls_config(pair: &TlsCredentialPair) -> Result<RustlsConfig, std::io::Error> {
    RustlsConfig::from_pem(pair.certificate.clone(), pair.private_key.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::generate_self_signed;

    #[tokio::test]
    async fn accepts_generated_pair() {
        let pair = generate_self_signed("localhost", 1).unwrap();
        assert!(rustls_config(&pair).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let pair = TlsCredentialPair {
            private_key: b"nope".to_vec(),
            certificate: b"nope".to_vec(),
        };
        assert!(rustls_config(&pair).await.is_err());
    }
}
