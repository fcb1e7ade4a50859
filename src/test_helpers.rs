//! Shared test helpers for building in-memory release archives.

use std::io::Write;

use crate::types::ReleaseAsset;

/// Metadata document with empty darwin target and no crt features
pub(crate) const METADATA_JSON: &str =
    r#"{"apple_sdk_deployment_target":"","crt_features":[],"python_tag":"cp311"}"#;

/// Build an uncompressed tar archive from `(path, contents)` pairs, in order.
pub(crate) fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Deterministic incompressible bytes
pub(crate) fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

pub(crate) fn zstd_compress(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 3).unwrap()
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Release asset for a full build served under `base`
pub(crate) fn full_asset(base: &str, version: &str, triple: &str, config: &str) -> ReleaseAsset {
    let name = format!("cpython-{version}+20230826-{triple}-{config}-full.tar.zst");
    ReleaseAsset::new(&name, format!("{base}/{name}"))
}

/// Release asset for an install-only build served under `base`
pub(crate) fn install_only_asset(base: &str, version: &str, triple: &str) -> ReleaseAsset {
    let name = format!("cpython-{version}+20230826-{triple}-install_only.tar.gz");
    ReleaseAsset::new(&name, format!("{base}/{name}"))
}
