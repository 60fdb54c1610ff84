//! `Transport` dispatch: `FilesystemTransport` serves `file://` URLs
//! directly; `DefaultTransport` adds scheme dispatch (and HTTP, when the
//! `http` feature is enabled) on top.

use std::io::Read;
use std::str::FromStr;
use trustframe::{DefaultTransport, FilesystemTransport, Transport, TransportErrorKind};
use url::Url;

fn read_all(mut reader: Box<dyn Read + Send>) -> Vec<u8> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    buf
}

#[test]
fn filesystem_transport_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.txt");
    std::fs::write(&path, "123123987").unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let bytes = read_all(FilesystemTransport.fetch(url).unwrap());
    assert_eq!(bytes, b"123123987");
}

#[test]
fn filesystem_transport_reports_not_found() {
    let url = Url::from_file_path("/definitely/does/not/exist.json").unwrap();
    let err = FilesystemTransport.fetch(url).err().unwrap();
    assert!(matches!(err.kind, TransportErrorKind::FileNotFound));
}

#[test]
fn default_transport_rejects_unsupported_scheme() {
    let transport = DefaultTransport::new();
    let url = Url::from_str("ftp://example.com").unwrap();
    let err = transport.fetch(url).err().unwrap();
    assert!(matches!(err.kind, TransportErrorKind::UnsupportedUrlScheme));
}

#[test]
fn default_transport_dispatches_file_urls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.txt");
    std::fs::write(&path, "hello").unwrap();

    let transport = DefaultTransport::new();
    let url = Url::from_file_path(&path).unwrap();
    assert_eq!(read_all(transport.fetch(url).unwrap()), b"hello");
}
