use std::sync::{Arc, Mutex};

use boring::pkey::PKey;
use boring::ssl::{select_next_proto, AlpnError, SslAcceptor, SslAcceptorBuilder, SslMethod};
use boring::x509::X509;

/// ALPN lists offered by clients, raw wire format, one per handshake.
pub type OfferedAlpn = Arc<Mutex<Vec<Vec<u8>>>>;

/// Self-signed acceptor for 127.0.0.1/localhost plus the PEM certificate to
/// trust.
fn self_signed() -> (SslAcceptorBuilder, Vec<u8>) {
    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let issued = rcgen::generate_simple_self_signed(names).expect("generate cert");
    let cert_pem = issued.cert.pem();
    let key_pem = issued.signing_key.serialize_pem();

    let key = PKey::private_key_from_pem(key_pem.as_bytes()).expect("parse key");
    let cert = X509::from_pem(cert_pem.as_bytes()).expect("parse cert");

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).expect("acceptor");
    builder.set_private_key(&key).expect("set key");
    builder.set_certificate(&cert).expect("set cert");
    (builder, cert_pem.into_bytes())
}

/// Acceptor that only negotiates HTTP/1.1.
pub fn http1_acceptor() -> (SslAcceptor, Vec<u8>) {
    let (mut builder, ca_cert) = self_signed();
    builder.set_alpn_select_callback(|_, offered| {
        select_next_proto(b"\x08http/1.1", offered).ok_or(AlpnError::NOACK)
    });
    (builder.build(), ca_cert)
}

/// Acceptor preferring `h2`, recording every offered ALPN list.
pub fn h2_acceptor() -> (SslAcceptor, Vec<u8>, OfferedAlpn) {
    let (mut builder, ca_cert) = self_signed();
    let offered: OfferedAlpn = Arc::default();
    let seen = offered.clone();
    builder.set_alpn_select_callback(move |_, protos| {
        seen.lock().unwrap().push(protos.to_vec());
        select_next_proto(b"\x02h2\x08http/1.1", protos).ok_or(AlpnError::NOACK)
    });
    (builder.build(), ca_cert, offered)
}
