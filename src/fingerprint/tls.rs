//! TLS ClientHello templates.
//!
//! A template is the set of knobs BoringSSL exposes that shape the
//! ClientHello: cipher order, groups, signature algorithms, GREASE,
//! extension permutation and certificate compression.

use rand::seq::SliceRandom;
use rand::Rng;

/// Chromium cipher suites in exact order.
pub const CHROME_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chromium signature algorithms.
pub const CHROME_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chromium supported groups.
pub const CHROME_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Firefox cipher suites: ChaCha20 ahead of AES-256 for TLS 1.3, CBC-SHA kept.
pub const FIREFOX_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Firefox signature algorithms (adds P-521 and SHA-1 fallbacks).
pub const FIREFOX_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_secp521r1_sha512",
    "rsa_pss_rsae_sha256",
    "rsa_pss_rsae_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha256",
    "rsa_pkcs1_sha384",
    "rsa_pkcs1_sha512",
    "ecdsa_sha1",
    "rsa_pkcs1_sha1",
];

/// Firefox supported groups.
pub const FIREFOX_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Safari cipher suites: AES-256 first within each key exchange.
pub const SAFARI_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
];

/// Safari signature algorithms.
pub const SAFARI_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
    "rsa_pkcs1_sha1",
];

/// Safari supported groups.
pub const SAFARI_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Certificate compression algorithm advertised in `compress_certificate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertCompression {
    /// Chromium.
    Brotli,
    /// Safari.
    Zlib,
    /// Firefox.
    #[default]
    None,
}

/// TLS fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Enable GREASE values.
    pub grease: bool,
    /// Shuffle extension order per handshake (Chrome 110+).
    pub permute_extensions: bool,
    pub cert_compression: CertCompression,
}

impl Default for TlsFingerprint {
    fn default() -> Self {
        Self {
            cipher_list: vec![],
            sigalgs: vec![],
            curves: vec![],
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::None,
        }
    }
}

impl TlsFingerprint {
    /// Chromium before extension permutation (106).
    pub fn chrome_106() -> Self {
        Self {
            cipher_list: CHROME_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROME_CURVES.to_vec(),
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::Brotli,
        }
    }

    /// Chromium with permuted extensions (110 onwards).
    pub fn chrome_120() -> Self {
        Self {
            permute_extensions: true,
            ..Self::chrome_106()
        }
    }

    pub fn firefox_102() -> Self {
        Self {
            cipher_list: FIREFOX_CIPHER_SUITES.to_vec(),
            sigalgs: FIREFOX_SIGNATURE_ALGORITHMS.to_vec(),
            curves: FIREFOX_CURVES.to_vec(),
            grease: false,
            permute_extensions: false,
            cert_compression: CertCompression::None,
        }
    }

    /// Firefox does not GREASE but shuffles extensions in recent releases.
    pub fn firefox_120() -> Self {
        Self {
            permute_extensions: true,
            ..Self::firefox_102()
        }
    }

    pub fn safari_16() -> Self {
        Self {
            cipher_list: SAFARI_CIPHER_SUITES.to_vec(),
            sigalgs: SAFARI_SIGNATURE_ALGORITHMS.to_vec(),
            curves: SAFARI_CURVES.to_vec(),
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::Zlib,
        }
    }

    /// Safari 17 dropped the RSA key-exchange CBC suites.
    pub fn safari_17() -> Self {
        let mut fp = Self::safari_16();
        fp.cipher_list
            .retain(|suite| !(suite.starts_with("TLS_RSA_") && suite.ends_with("_CBC_SHA")));
        fp
    }

    /// iOS Safari advertises only the ECDHE suites.
    pub fn ios_safari_17() -> Self {
        let mut fp = Self::safari_16();
        fp.cipher_list.retain(|suite| !suite.starts_with("TLS_RSA_"));
        fp.curves = vec!["X25519", "P-256", "P-384"];
        fp
    }

    /// A template owned by no browser: shuffled TLS 1.2 suites, a random
    /// subset of groups and signature algorithms, random GREASE.
    pub fn randomized<R: Rng + ?Sized>(rng: &mut R) -> Self {
        // TLS 1.3 suites lead in every real browser.
        let (tls13, tls12) = CHROME_CIPHER_SUITES.split_at(3);
        let mut ciphers: Vec<&'static str> = tls12.to_vec();
        ciphers.shuffle(rng);
        let keep = rng.gen_range(6..=ciphers.len());
        ciphers.truncate(keep);
        let mut cipher_list = tls13.to_vec();
        cipher_list.extend(ciphers);

        let mut curves = FIREFOX_CURVES.to_vec();
        curves[1..].shuffle(rng);
        let keep = rng.gen_range(2..=curves.len());
        curves.truncate(keep);

        let mut sigalgs = CHROME_SIGNATURE_ALGORITHMS.to_vec();
        sigalgs.shuffle(rng);

        Self {
            cipher_list,
            sigalgs,
            curves,
            grease: rng.gen_bool(0.5),
            permute_extensions: true,
            cert_compression: CertCompression::None,
        }
    }

    pub fn cipher_string(&self) -> String {
        self.cipher_list.join(":")
    }

    pub fn curves_string(&self) -> String {
        self.curves.join(":")
    }

    pub fn sigalgs_string(&self) -> String {
        self.sigalgs.join(":")
    }
}
