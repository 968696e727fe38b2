// Transaction data structures

use crate::core::{Hash256, sha256, Serializable};
use crate::core::types::hex_bytes;
use std::io::{Read, Cursor};
use super::serialize::{write_var_bytes, read_var_bytes};

/// Opaque signing credential attached by the submitter
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credential {
    /// Serialized public key
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Signature over the transaction's signing digest
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Credential {
    pub fn new(public_key: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { public_key, signature }
    }
}

/// Transaction - a message from one party to another
///
/// The ledger does not interpret the payload; validity is decided by the
/// rules the pool was built with.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            payload: payload.into(),
            credential: None,
        }
    }

    /// Attach a signing credential
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Bytes covered by a credential's signature
    fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, self.sender.as_bytes());
        write_var_bytes(&mut buf, self.recipient.as_bytes());
        write_var_bytes(&mut buf, &self.payload);
        buf
    }

    /// SHA256 of sender, recipient and payload
    pub fn signing_digest(&self) -> Hash256 {
        sha256(&self.signing_bytes())
    }

    /// Deserialize from a reader (used when decoding a whole block)
    pub fn from_reader(reader: &mut dyn Read) -> Result<Self, String> {
        let sender = read_string(reader)?;
        let recipient = read_string(reader)?;
        let payload = read_var_bytes(reader).map_err(|e| e.to_string())?;

        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag).map_err(|e| e.to_string())?;
        let credential = match flag[0] {
            0 => None,
            1 => {
                let public_key = read_var_bytes(reader).map_err(|e| e.to_string())?;
                let signature = read_var_bytes(reader).map_err(|e| e.to_string())?;
                Some(Credential { public_key, signature })
            }
            other => return Err(format!("Invalid credential flag: {}", other)),
        };

        Ok(Self {
            sender,
            recipient,
            payload,
            credential,
        })
    }
}

fn read_string(reader: &mut dyn Read) -> Result<String, String> {
    let bytes = read_var_bytes(reader).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| format!("Invalid UTF-8 in party id: {}", e))
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = self.signing_bytes();

        match &self.credential {
            None => buf.push(0),
            Some(credential) => {
                buf.push(1);
                write_var_bytes(&mut buf, &credential.public_key);
                write_var_bytes(&mut buf, &credential.signature);
            }
        }

        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(data);
        Self::from_reader(&mut cursor)
    }
}
