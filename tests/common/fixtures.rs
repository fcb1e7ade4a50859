//! Archive fixtures built in memory

use std::io::Write;

/// Path of the metadata entry inside a full build archive
pub const METADATA_PATH: &str = "python/PYTHON.json";

/// Metadata of a linux gnu build
pub const GNU_METADATA: &str = r#"{
  "apple_sdk_deployment_target": null,
  "crt_features": ["glibc-max-symbol-version:2.17", "libgcc"],
  "python_tag": "cp311",
  "python_version": "3.11.4"
}"#;

/// Metadata of a darwin build
pub const DARWIN_METADATA: &str = r#"{
  "apple_sdk_deployment_target": "11.0",
  "crt_features": ["libSystem"],
  "python_tag": "cp311"
}"#;

/// Metadata with empty target and features
pub const EMPTY_METADATA: &str = r#"{"apple_sdk_deployment_target":"","crt_features":[]}"#;

/// Build an uncompressed tar from `(path, contents)` pairs, in order
pub fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}

/// Entries of a realistic full build: some payload, then the metadata
fn full_build_entries(metadata: &str) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("python/build/Makefile", b"all:\n\ttrue\n".to_vec()),
        ("python/install/lib/libpython3.11.a", vec![0u8; 64 * 1024]),
        (METADATA_PATH, metadata.as_bytes().to_vec()),
        ("python/licenses/LICENSE.txt", b"PSF".to_vec()),
    ]
}

fn full_build_tar(metadata: &str) -> Vec<u8> {
    let entries = full_build_entries(metadata);
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(path, contents)| (*path, contents.as_slice()))
        .collect();
    tar_archive(&borrowed)
}

/// A `.tar.zst` full build archive
pub fn zstd_full_archive(metadata: &str) -> Vec<u8> {
    zstd::stream::encode_all(full_build_tar(metadata).as_slice(), 3).expect("zstd encode")
}

/// A gzip-compressed full build archive
pub fn gzip_full_archive(metadata: &str) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&full_build_tar(metadata))
        .expect("gzip encode");
    encoder.finish().expect("gzip finish")
}

/// A `.tar.zst` archive without a metadata entry
pub fn zstd_archive_without_metadata() -> Vec<u8> {
    let tar = tar_archive(&[("python/install/bin/python3", b"\x7fELF".as_slice())]);
    zstd::stream::encode_all(tar.as_slice(), 3).expect("zstd encode")
}

/// Artifact name of a full build
pub fn full_name(version: &str, triple: &str, config: &str) -> String {
    format!("cpython-{version}+20230826-{triple}-{config}-full.tar.zst")
}

/// Artifact name of an install-only build
pub fn install_only_name(version: &str, triple: &str) -> String {
    format!("cpython-{version}+20230826-{triple}-install_only.tar.gz")
}
