//! BridgeDB moat JSON-API message types.

use serde::{Deserialize, Serialize};

pub const CONTENT_TYPE: &str = "application/vnd.api+json";
pub const PROTOCOL_VERSION: &str = "0.1.0";
/// Error code the service uses for a wrong captcha answer.
pub const CODE_INCORRECT_SOLUTION: u16 = 419;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct FetchRequest<'a> {
    pub version: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub supported: &'a [String],
}

impl<'a> FetchRequest<'a> {
    pub fn new(supported: &'a [String]) -> Envelope<Self> {
        Envelope {
            data: vec![Self {
                version: PROTOCOL_VERSION,
                kind: "client-transports",
                supported,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub version: &'a str,
    pub transport: &'a str,
    pub challenge: &'a str,
    pub solution: &'a str,
    pub qrcode: &'a str,
}

impl<'a> CheckRequest<'a> {
    pub fn new(transport: &'a str, challenge: &'a str, solution: &'a str) -> Envelope<Self> {
        Envelope {
            data: vec![Self {
                id: "2",
                kind: "moat-solution",
                version: PROTOCOL_VERSION,
                transport,
                challenge,
                solution,
                qrcode: "false",
            }],
        }
    }
}

/// Either `data` or `errors` is present.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Response<T> {
    #[serde(default)]
    pub data: Vec<T>,
    #[serde(default)]
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeData {
    #[serde(rename = "type")]
    pub kind: String,
    pub transport: String,
    /// Base64-encoded JPEG.
    pub image: String,
    pub challenge: String,
}

#[derive(Debug, Deserialize)]
pub struct BridgesData {
    #[serde(default)]
    pub bridges: Vec<String>,
}
