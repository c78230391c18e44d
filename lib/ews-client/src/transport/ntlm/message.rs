//! NTLM negotiate, challenge and authenticate messages (NTLMv2 responses).

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

use crate::client::SecureString;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const NEGOTIATE_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_128
    | NEGOTIATE_56;

const AV_EOL: u16 = 0;
const AV_TIMESTAMP: u16 = 7;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Fixed part of the authenticate message, without version and MIC.
const AUTHENTICATE_HEADER_LEN: usize = 64;

/// A malformed NTLM message.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
#[display("{reason}")]
pub(crate) struct MessageError {
    reason: String,
}

impl MessageError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The identity used for the NTLMv2 responses.
///
/// `DOMAIN\user` is split into domain and user; `user@domain` and bare
/// `user` keep the whole value as user name with an empty domain.
#[derive(Debug, Clone)]
pub(crate) struct NtlmIdentity {
    domain: String,
    user: String,
    password: SecureString,
    workstation: String,
}

impl NtlmIdentity {
    pub(crate) fn new(username: &str, password: SecureString) -> Self {
        let (domain, user) = username.split_once('\\').unwrap_or(("", username));

        Self {
            domain: domain.to_string(),
            user: user.to_string(),
            password,
            workstation: String::new(),
        }
    }

    pub(crate) fn domain(&self) -> &str {
        &self.domain
    }

    pub(crate) fn user(&self) -> &str {
        &self.user
    }

    fn nt_hash(&self) -> [u8; 16] {
        Md4::digest(utf16le(self.password.as_str())).into()
    }

    fn ntowf_v2(&self) -> Result<[u8; 16], MessageError> {
        let identity = format!("{}{}", self.user.to_uppercase(), self.domain);
        hmac_md5(&self.nt_hash(), &[utf16le(&identity).as_slice()])
    }
}

/// The server challenge (type 2 message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChallengeMessage {
    flags: u32,
    server_challenge: [u8; 8],
    target_info: Vec<u8>,
}

impl ChallengeMessage {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.get(..8) != Some(SIGNATURE.as_slice()) {
            return Err(MessageError::new("missing NTLMSSP signature"));
        }
        if read_u32(bytes, 8)? != 2 {
            return Err(MessageError::new("not a challenge message"));
        }

        let flags = read_u32(bytes, 20)?;
        let server_challenge = bytes
            .get(24..32)
            .and_then(|slice| <[u8; 8]>::try_from(slice).ok())
            .ok_or_else(|| MessageError::new("challenge message too short"))?;

        let target_info = if flags & NEGOTIATE_TARGET_INFO != 0 && bytes.len() >= 48 {
            let length = usize::from(read_u16(bytes, 40)?);
            let offset = usize::try_from(read_u32(bytes, 44)?)
                .map_err(|_| MessageError::new("target info offset overflow"))?;
            bytes
                .get(offset..offset + length)
                .ok_or_else(|| MessageError::new("target info out of bounds"))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_info,
        })
    }

    pub(crate) fn server_challenge(&self) -> &[u8; 8] {
        &self.server_challenge
    }

    /// The server timestamp advertised in the target info, as a FILETIME.
    pub(crate) fn timestamp(&self) -> Option<u64> {
        let mut rest = self.target_info.as_slice();
        while rest.len() >= 4 {
            let id = read_u16(rest, 0).ok()?;
            let length = usize::from(read_u16(rest, 2).ok()?);
            let value = rest.get(4..4 + length)?;
            match id {
                AV_EOL => return None,
                AV_TIMESTAMP => return value.try_into().ok().map(u64::from_le_bytes),
                _ => rest = rest.get(4 + length..)?,
            }
        }
        None
    }
}

/// The negotiate (type 1) message.
pub(crate) fn negotiate_message() -> Vec<u8> {
    let mut message = Vec::with_capacity(32);
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&1u32.to_le_bytes());
    message.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    // empty domain and workstation buffers
    message.extend_from_slice(&[0; 16]);
    message
}

/// The authenticate (type 3) message answering `challenge`.
///
/// `client_challenge` must be random; `now` is the FILETIME used when the
/// server does not advertise a timestamp.
pub(crate) fn authenticate_message(
    identity: &NtlmIdentity,
    challenge: &ChallengeMessage,
    client_challenge: [u8; 8],
    now: u64,
) -> Result<Vec<u8>, MessageError> {
    let ntowf = identity.ntowf_v2()?;
    let server_challenge = challenge.server_challenge();
    let timestamp = challenge.timestamp().unwrap_or(now);

    let mut blob = Vec::with_capacity(32 + challenge.target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0; 4]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0; 4]);

    let nt_proof = hmac_md5(&ntowf, &[server_challenge.as_slice(), blob.as_slice()])?;
    let mut nt_response = nt_proof.to_vec();
    nt_response.extend_from_slice(&blob);

    let lm_proof = hmac_md5(
        &ntowf,
        &[server_challenge.as_slice(), client_challenge.as_slice()],
    )?;
    let mut lm_response = lm_proof.to_vec();
    lm_response.extend_from_slice(&client_challenge);

    let flags = (challenge.flags & NEGOTIATE_FLAGS) | NEGOTIATE_UNICODE;
    let payloads = [
        lm_response,
        nt_response,
        utf16le(identity.domain()),
        utf16le(identity.user()),
        utf16le(&identity.workstation),
        Vec::new(),
    ];

    let mut header = Vec::with_capacity(AUTHENTICATE_HEADER_LEN);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&3u32.to_le_bytes());
    let mut body = Vec::new();
    for payload in &payloads {
        let length = u16::try_from(payload.len())
            .map_err(|_| MessageError::new("authenticate payload too large"))?;
        let offset = u32::try_from(AUTHENTICATE_HEADER_LEN + body.len())
            .map_err(|_| MessageError::new("authenticate payload too large"))?;
        header.extend_from_slice(&length.to_le_bytes());
        header.extend_from_slice(&length.to_le_bytes());
        header.extend_from_slice(&offset.to_le_bytes());
        body.extend_from_slice(payload);
    }
    header.extend_from_slice(&flags.to_le_bytes());

    header.extend_from_slice(&body);
    Ok(header)
}

/// The current time as a Windows FILETIME (100ns intervals since 1601).
pub(crate) fn filetime_now() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_secs() + FILETIME_EPOCH_OFFSET) * 10_000_000
        + u64::from(since_epoch.subsec_nanos() / 100)
}

/// A challenge message without target info, as issued by a server.
#[cfg(test)]
pub(super) fn challenge_message(server_challenge: [u8; 8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(48);
    message.extend_from_slice(SIGNATURE);
    message.extend_from_slice(&2u32.to_le_bytes());
    message.extend_from_slice(&[0; 8]);
    message.extend_from_slice(&(NEGOTIATE_UNICODE | NEGOTIATE_NTLM).to_le_bytes());
    message.extend_from_slice(&server_challenge);
    message.extend_from_slice(&[0; 16]);
    message
}

/// Whether the NTLMv2 proof of an authenticate message answers `server_challenge`.
#[cfg(test)]
pub(super) fn proves_challenge(
    message: &[u8],
    identity: &NtlmIdentity,
    server_challenge: &[u8; 8],
) -> Result<bool, MessageError> {
    if read_u32(message, 8)? != 3 {
        return Err(MessageError::new("not an authenticate message"));
    }
    let length = usize::from(read_u16(message, 20)?);
    let offset = usize::try_from(read_u32(message, 24)?)
        .map_err(|_| MessageError::new("NT response offset overflow"))?;
    let nt_response = message
        .get(offset..offset + length)
        .ok_or_else(|| MessageError::new("NT response out of bounds"))?;
    let (proof, blob) = nt_response
        .split_at_checked(16)
        .ok_or_else(|| MessageError::new("NT response too short"))?;

    let expected = hmac_md5(&identity.ntowf_v2()?, &[server_challenge.as_slice(), blob])?;
    Ok(proof == expected.as_slice())
}

fn utf16le(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16], MessageError> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|err| MessageError::new(format!("HMAC key rejected: {err}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, MessageError> {
    bytes
        .get(offset..offset + 2)
        .and_then(|slice| slice.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| MessageError::new("message too short"))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, MessageError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| MessageError::new("message too short"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Challenge with server challenge `0123456789abcdef` and a target info
    /// holding a NetBIOS domain name `Domain` and the timestamp.
    fn challenge_bytes() -> Vec<u8> {
        let mut target_info = Vec::new();
        target_info.extend_from_slice(&2u16.to_le_bytes());
        target_info.extend_from_slice(&12u16.to_le_bytes());
        target_info.extend_from_slice(&utf16le("Domain"));
        target_info.extend_from_slice(&AV_TIMESTAMP.to_le_bytes());
        target_info.extend_from_slice(&8u16.to_le_bytes());
        target_info.extend_from_slice(&0x01d9_0000_0000_0000_u64.to_le_bytes());
        target_info.extend_from_slice(&[0; 4]);

        let mut message = Vec::new();
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&2u32.to_le_bytes());
        message.extend_from_slice(&[0; 8]);
        let flags = NEGOTIATE_UNICODE | NEGOTIATE_TARGET_INFO | NEGOTIATE_NTLM;
        message.extend_from_slice(&flags.to_le_bytes());
        message.extend_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        message.extend_from_slice(&[0; 8]);
        let length = u16::try_from(target_info.len()).expect("small");
        message.extend_from_slice(&length.to_le_bytes());
        message.extend_from_slice(&length.to_le_bytes());
        message.extend_from_slice(&48u32.to_le_bytes());
        message.extend_from_slice(&target_info);
        message
    }

    #[test]
    fn should_split_domain_qualified_usernames() {
        let identity = NtlmIdentity::new("CORP\\jdoe", SecureString::from("secret"));
        assert_eq!(identity.domain(), "CORP");
        assert_eq!(identity.user(), "jdoe");

        let identity = NtlmIdentity::new("jdoe@corp.example.com", SecureString::from("secret"));
        assert_eq!(identity.domain(), "");
        assert_eq!(identity.user(), "jdoe@corp.example.com");
    }

    #[test]
    fn should_compute_nt_hash() {
        // MD4(UTF-16LE("Password")), from the NTLM reference test vectors
        let identity = NtlmIdentity::new("User", SecureString::from("Password"));

        assert_eq!(
            identity.nt_hash(),
            [
                0xa4, 0xf4, 0x9c, 0x40, 0x65, 0x10, 0xbd, 0xca, 0xb6, 0x82, 0x4e, 0xe7, 0xc3,
                0x0f, 0xd8, 0x52
            ]
        );
    }

    #[test]
    fn should_compute_ntowf_v2() {
        let identity = NtlmIdentity::new("Domain\\User", SecureString::from("Password"));

        assert_eq!(
            identity.ntowf_v2().expect("hmac"),
            [
                0x0c, 0x86, 0x8a, 0x40, 0x3b, 0xfd, 0x7a, 0x93, 0xa3, 0x00, 0x1e, 0xf2, 0x2e,
                0xf0, 0x2e, 0x3f
            ]
        );
    }

    #[test]
    fn should_build_negotiate_message() {
        let message = negotiate_message();

        assert_eq!(message.len(), 32);
        assert_eq!(message.get(..8), Some(SIGNATURE.as_slice()));
        assert_eq!(read_u32(&message, 8), Ok(1));
        assert_eq!(read_u32(&message, 12), Ok(NEGOTIATE_FLAGS));
    }

    #[test]
    fn should_parse_challenge() {
        let challenge = ChallengeMessage::parse(&challenge_bytes()).expect("valid challenge");

        assert_eq!(
            challenge.server_challenge(),
            &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]
        );
        assert_eq!(challenge.timestamp(), Some(0x01d9_0000_0000_0000));
    }

    #[test]
    fn should_reject_malformed_challenges() {
        assert!(ChallengeMessage::parse(b"NTLMSSP\0").is_err());
        assert!(ChallengeMessage::parse(&negotiate_message()).is_err());
        assert!(ChallengeMessage::parse(b"garbage-garbage-garbage-garbage!").is_err());
    }

    #[test]
    fn should_build_authenticate_message() {
        let identity = NtlmIdentity::new("Domain\\User", SecureString::from("Password"));
        let challenge = ChallengeMessage::parse(&challenge_bytes()).expect("valid challenge");
        let client_challenge = [0xaa; 8];

        let message =
            authenticate_message(&identity, &challenge, client_challenge, 0).expect("built");

        assert_eq!(message.get(..8), Some(SIGNATURE.as_slice()));
        assert_eq!(read_u32(&message, 8), Ok(3));

        // LMv2 response: 16-byte proof and the client challenge
        assert_eq!(read_u16(&message, 12), Ok(24));
        assert_eq!(read_u32(&message, 16), Ok(64));
        assert_eq!(message.get(80..88), Some(client_challenge.as_slice()));

        // NTLMv2 response carries the server timestamp, not `now`
        let nt_length = usize::from(read_u16(&message, 20).expect("nt length"));
        let nt_offset = usize::try_from(read_u32(&message, 24).expect("nt offset")).expect("fits");
        let nt_response = message
            .get(nt_offset..nt_offset + nt_length)
            .expect("in bounds");
        assert_eq!(
            nt_response.get(24..32),
            Some(0x01d9_0000_0000_0000_u64.to_le_bytes().as_slice())
        );

        // user name in UTF-16LE
        let user_length = usize::from(read_u16(&message, 36).expect("user length"));
        let user_offset =
            usize::try_from(read_u32(&message, 40).expect("user offset")).expect("fits");
        assert_eq!(
            message.get(user_offset..user_offset + user_length),
            Some(utf16le("User").as_slice())
        );
    }

    #[test]
    fn should_prove_only_the_answered_challenge() {
        let identity = NtlmIdentity::new("CORP\\jdoe", SecureString::from("s3cr3t"));
        let issued = [0x11; 8];
        let challenge = ChallengeMessage::parse(&challenge_message(issued)).expect("valid");

        let message =
            authenticate_message(&identity, &challenge, [0xaa; 8], filetime_now()).expect("built");

        let other = [0x22; 8];
        assert_eq!(proves_challenge(&message, &identity, &issued), Ok(true));
        assert_eq!(proves_challenge(&message, &identity, &other), Ok(false));
        let impostor = NtlmIdentity::new("CORP\\jdoe", SecureString::from("guess"));
        assert_eq!(proves_challenge(&message, &impostor, &issued), Ok(false));
    }

    #[test]
    fn should_produce_filetime_after_unix_epoch() {
        assert!(filetime_now() > FILETIME_EPOCH_OFFSET * 10_000_000);
    }
}
