//! TLS configuration for connections (rustls + webpki roots).

use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};

/// Build the shared rustls client config: ring provider, webpki roots,
/// server certificate verification on. Constructed once, read-only after.
pub(crate) fn default_tls_config() -> Arc<ClientConfig> {
    static CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();
    CONFIG
        .get_or_init(|| {
            let provider = Arc::new(rustls::crypto::ring::default_provider());

            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .expect("default TLS protocol versions")
                .with_root_certificates(root_store)
                .with_no_client_auth();

            debug!("rustls config initialized");
            Arc::new(config)
        })
        .clone()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_is_shared() {
        let a = default_tls_config();
        let b = default_tls_config();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
