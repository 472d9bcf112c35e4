use crate::types::ShortId;

/// Short, loggable identifier for a credential document.
///
/// The document embeds client key material, so anything that needs to name a
/// live environment in logs or listings uses this blake3 prefix instead.
pub fn compute_short_id(document: &str) -> ShortId {
    let hex = blake3::hash(document.as_bytes()).to_hex().to_string();
    ShortId::new(&hex[..12])
}
