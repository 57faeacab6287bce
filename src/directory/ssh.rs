use crate::core::error::SshKeyError;
use crate::models::user::SshKey;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

const SUPPORTED_ALGORITHMS: &[&str] = &[
    "ssh-rsa",
    "ssh-dss",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// An OpenSSH public key line split into its parts
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedKey {
    pub algorithm: String,
    pub blob: Vec<u8>,
    pub comment: String,
}

impl ParsedKey {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.blob)
    }
}

/// Parse `<algorithm> <base64 key> [comment]`
pub fn parse_public_key(line: &str) -> Result<ParsedKey, SshKeyError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SshKeyError::Empty);
    }

    let (algorithm, rest) = split_field(line);
    if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
        return Err(SshKeyError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let (encoded, comment) = split_field(rest);
    if encoded.is_empty() {
        return Err(SshKeyError::MissingKeyData);
    }

    let blob = STANDARD
        .decode(encoded)
        .map_err(|_| SshKeyError::InvalidEncoding)?;

    let embedded = read_string(&blob)?;
    if embedded != algorithm.as_bytes() {
        return Err(SshKeyError::AlgorithmMismatch {
            declared: algorithm.to_string(),
            embedded: String::from_utf8_lossy(embedded).into_owned(),
        });
    }

    Ok(ParsedKey {
        algorithm: algorithm.to_string(),
        blob,
        comment: comment.to_string(),
    })
}

/// OpenSSH-style `SHA256:` fingerprint of a key blob
pub fn fingerprint(blob: &[u8]) -> String {
    let digest = Sha256::digest(blob);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Validate a public key line and build the stored key record
pub fn to_ssh_key(line: &str) -> Result<SshKey, SshKeyError> {
    let parsed = parse_public_key(line)?;
    Ok(SshKey {
        fingerprint: parsed.fingerprint(),
        comment: parsed.comment,
        public_key: line.trim().to_string(),
    })
}

fn split_field(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim()),
        None => (input, ""),
    }
}

/// First length-prefixed string of an SSH wire-format blob
fn read_string(blob: &[u8]) -> Result<&[u8], SshKeyError> {
    let header: [u8; 4] = blob
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(SshKeyError::Truncated)?;
    let len = u32::from_be_bytes(header) as usize;

    blob.get(4..4 + len).ok_or(SshKeyError::Truncated)
}
