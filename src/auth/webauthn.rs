//! Parsing and verification of WebAuthn authenticator responses.
//!
//! Only the pieces needed for "none" attestation are implemented: client data
//! binding, authenticator data, COSE public keys (ES256 and EdDSA) and
//! assertion signatures.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ciborium::Value;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::PasskeyError;

pub const ALG_ES256: i64 = -7;
pub const ALG_EDDSA: i64 = -8;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_DATA: u8 = 0x40;

const RP_ID_HASH_LEN: usize = 32;
const AUTH_DATA_MIN_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Decodes base64url, tolerating padding and the standard alphabet.
pub fn decode_b64(input: &str) -> Result<Vec<u8>, PasskeyError> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|_| PasskeyError::Malformed)
}

#[must_use]
pub fn encode_b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    pub origin: String,
}

impl ClientData {
    pub fn parse(raw: &[u8]) -> Result<Self, PasskeyError> {
        serde_json::from_slice(raw).map_err(|_| PasskeyError::Malformed)
    }

    /// Checks the ceremony type, the challenge and the origin binding.
    pub fn verify(&self, kind: &str, challenge: &str, origin: &str) -> Result<(), PasskeyError> {
        if self.kind != kind {
            return Err(PasskeyError::Malformed);
        }
        // Compare decoded bytes so padding differences don't matter.
        let presented =
            decode_b64(&self.challenge).map_err(|_| PasskeyError::ChallengeExpiredOrMissing)?;
        let expected =
            decode_b64(challenge).map_err(|_| PasskeyError::ChallengeExpiredOrMissing)?;
        if presented != expected {
            return Err(PasskeyError::ChallengeExpiredOrMissing);
        }
        if self.origin.trim_end_matches('/') != origin.trim_end_matches('/') {
            return Err(PasskeyError::OriginMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Es256 { x: [u8; 32], y: [u8; 32] },
    Ed25519 { x: [u8; 32] },
}

impl CoseKey {
    #[must_use]
    pub fn algorithm(&self) -> i64 {
        match self {
            CoseKey::Es256 { .. } => ALG_ES256,
            CoseKey::Ed25519 { .. } => ALG_EDDSA,
        }
    }

    /// Raw key bytes as stored: an uncompressed SEC1 point or the Ed25519 key.
    #[must_use]
    pub fn to_stored_bytes(&self) -> Vec<u8> {
        match self {
            CoseKey::Es256 { x, y } => {
                let mut out = Vec::with_capacity(65);
                out.push(0x04);
                out.extend_from_slice(x);
                out.extend_from_slice(y);
                out
            }
            CoseKey::Ed25519 { x } => x.to_vec(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, PasskeyError> {
        let map = value.as_map().ok_or(PasskeyError::Malformed)?;
        let field = |label: i64| {
            map.iter()
                .find(|(k, _)| k.as_integer().map(i128::from) == Some(i128::from(label)))
                .map(|(_, v)| v)
        };
        let int = |label: i64| {
            field(label)
                .and_then(Value::as_integer)
                .map(i128::from)
                .ok_or(PasskeyError::Malformed)
        };
        let coord = |label: i64| -> Result<[u8; 32], PasskeyError> {
            field(label)
                .and_then(Value::as_bytes)
                .and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok())
                .ok_or(PasskeyError::Malformed)
        };

        // kty 1, alg 3, crv -1, x -2, y -3
        match (int(1)?, int(3)?) {
            (2, -7) if int(-1)? == 1 => Ok(CoseKey::Es256 {
                x: coord(-2)?,
                y: coord(-3)?,
            }),
            (1, -8) if int(-1)? == 6 => Ok(CoseKey::Ed25519 { x: coord(-2)? }),
            _ => Err(PasskeyError::Malformed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, PasskeyError> {
        if bytes.len() < AUTH_DATA_MIN_LEN {
            return Err(PasskeyError::Malformed);
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = bytes[RP_ID_HASH_LEN];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_ATTESTED_DATA != 0 {
            Some(parse_attested(&bytes[AUTH_DATA_MIN_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Checks the relying-party hash and the user-presence flag.
    pub fn verify_rp(&self, rp_id: &str) -> Result<(), PasskeyError> {
        if self.rp_id_hash[..] != Sha256::digest(rp_id.as_bytes())[..] {
            return Err(PasskeyError::OriginMismatch);
        }
        if !self.user_present() {
            return Err(PasskeyError::Malformed);
        }
        Ok(())
    }
}

fn parse_attested(bytes: &[u8]) -> Result<AttestedCredential, PasskeyError> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(PasskeyError::Malformed);
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);
    let id_len = u16::from_be_bytes([bytes[AAGUID_LEN], bytes[AAGUID_LEN + 1]]) as usize;
    let id_start = AAGUID_LEN + 2;
    let id_end = id_start + id_len;
    if id_len == 0 || bytes.len() <= id_end {
        return Err(PasskeyError::Malformed);
    }

    // Extensions may follow the key, so read exactly one CBOR item.
    let mut cursor = Cursor::new(&bytes[id_end..]);
    let key: Value = ciborium::from_reader(&mut cursor).map_err(|_| PasskeyError::Malformed)?;

    Ok(AttestedCredential {
        aaguid,
        credential_id: bytes[id_start..id_end].to_vec(),
        public_key: CoseKey::from_value(&key)?,
    })
}

/// The `authData` and format carried by an attestation object.
/// Attestation statements are not verified.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> Result<Self, PasskeyError> {
        let value: Value = ciborium::from_reader(bytes).map_err(|_| PasskeyError::Malformed)?;
        let map = value.as_map().ok_or(PasskeyError::Malformed)?;
        let field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        let fmt = field("fmt")
            .and_then(Value::as_text)
            .ok_or(PasskeyError::Malformed)?
            .to_string();
        let auth_data = field("authData")
            .and_then(Value::as_bytes)
            .ok_or(PasskeyError::Malformed)?
            .clone();

        Ok(Self { fmt, auth_data })
    }
}

/// Verifies an assertion signature over `authenticatorData || SHA-256(clientDataJSON)`.
pub fn verify_assertion(
    algorithm: i64,
    public_key: &[u8],
    authenticator_data: &[u8],
    client_data_json: &[u8],
    signature: &[u8],
) -> Result<(), PasskeyError> {
    let mut message = authenticator_data.to_vec();
    message.extend_from_slice(&Sha256::digest(client_data_json));

    match algorithm {
        ALG_ES256 => {
            use p256::ecdsa::signature::Verifier;
            use p256::ecdsa::{Signature, VerifyingKey};

            let key = VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| PasskeyError::SignatureInvalid)?;
            let sig = Signature::from_der(signature).map_err(|_| PasskeyError::SignatureInvalid)?;
            key.verify(&message, &sig)
                .map_err(|_| PasskeyError::SignatureInvalid)
        }
        ALG_EDDSA => {
            use ed25519_dalek::{Signature, Verifier, VerifyingKey};

            let bytes = <[u8; 32]>::try_from(public_key)
                .map_err(|_| PasskeyError::SignatureInvalid)?;
            let key = VerifyingKey::from_bytes(&bytes).map_err(|_| PasskeyError::SignatureInvalid)?;
            let sig = Signature::from_slice(signature).map_err(|_| PasskeyError::SignatureInvalid)?;
            key.verify(&message, &sig)
                .map_err(|_| PasskeyError::SignatureInvalid)
        }
        _ => Err(PasskeyError::SignatureInvalid),
    }
}

/// A software authenticator producing well-formed responses for tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use ciborium::Value;
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer;
    use sha2::{Digest, Sha256};

    use super::*;

    pub struct SoftAuthenticator {
        pub credential_id: Vec<u8>,
        pub counter: u32,
        key: SigningKey,
    }

    impl SoftAuthenticator {
        pub fn new(seed: u8) -> Self {
            Self {
                credential_id: vec![seed; 16],
                counter: 0,
                key: SigningKey::from_slice(&[seed.max(1); 32]).unwrap(),
            }
        }

        pub fn client_data(kind: &str, challenge: &str, origin: &str) -> Vec<u8> {
            serde_json::json!({ "type": kind, "challenge": challenge, "origin": origin })
                .to_string()
                .into_bytes()
        }

        fn cose_key(&self) -> Value {
            let point = self.key.verifying_key().to_encoded_point(false);
            Value::Map(vec![
                (Value::Integer(1.into()), Value::Integer(2.into())),
                (Value::Integer(3.into()), Value::Integer((-7).into())),
                (Value::Integer((-1).into()), Value::Integer(1.into())),
                (Value::Integer((-2).into()), Value::Bytes(point.x().unwrap().to_vec())),
                (Value::Integer((-3).into()), Value::Bytes(point.y().unwrap().to_vec())),
            ])
        }

        fn auth_data(&self, rp_id: &str, flags: u8, attested: bool) -> Vec<u8> {
            let mut out = Sha256::digest(rp_id.as_bytes()).to_vec();
            out.push(flags);
            out.extend_from_slice(&self.counter.to_be_bytes());
            if attested {
                out.extend_from_slice(&[0u8; 16]);
                out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
                out.extend_from_slice(&self.credential_id);
                ciborium::into_writer(&self.cose_key(), &mut out).unwrap();
            }
            out
        }

        /// Returns (clientDataJSON, attestationObject).
        pub fn attest(&self, challenge: &str, rp_id: &str, origin: &str) -> (Vec<u8>, Vec<u8>) {
            let client_data = Self::client_data(TYPE_CREATE, challenge, origin);
            let object = Value::Map(vec![
                (Value::Text("fmt".into()), Value::Text("none".into())),
                (Value::Text("attStmt".into()), Value::Map(vec![])),
                (
                    Value::Text("authData".into()),
                    Value::Bytes(self.auth_data(rp_id, 0x45, true)),
                ),
            ]);
            let mut encoded = Vec::new();
            ciborium::into_writer(&object, &mut encoded).unwrap();
            (client_data, encoded)
        }

        /// Bumps the counter and returns (clientDataJSON, authenticatorData, signature).
        pub fn assert(
            &mut self,
            challenge: &str,
            rp_id: &str,
            origin: &str,
        ) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
            self.counter += 1;
            self.assert_with_counter(challenge, rp_id, origin)
        }

        pub fn assert_with_counter(
            &self,
            challenge: &str,
            rp_id: &str,
            origin: &str,
        ) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
            let client_data = Self::client_data(TYPE_GET, challenge, origin);
            let auth_data = self.auth_data(rp_id, 0x05, false);
            let mut message = auth_data.clone();
            message.extend_from_slice(&Sha256::digest(&client_data));
            let signature: p256::ecdsa::Signature = self.key.sign(&message);
            (client_data, auth_data, signature.to_der().as_bytes().to_vec())
        }
    }
}
