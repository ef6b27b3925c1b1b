use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine,
};
use rand::Rng;

use super::OutboundMessage;
use crate::error::Result;

const CRLF: &str = "\r\n";
const BASE64_LINE_LENGTH: usize = 76;
const MAX_LINE_OCTETS: usize = 998;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Base64,
}

impl TransferEncoding {
    fn as_str(self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Base64 => "base64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub content_type: String,
    pub transfer_encoding: TransferEncoding,
    /// Set for attachment parts.
    pub filename: Option<String>,
    /// Already transfer-encoded.
    pub body: String,
}

/// A `multipart/mixed` message kept as structured fields until serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeEnvelope {
    pub headers: Vec<(String, String)>,
    pub boundary: String,
    pub parts: Vec<MimePart>,
}

/// Boundary token unique to one request.
pub fn new_boundary() -> String {
    format!(
        "----=_Part_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::thread_rng().gen::<u32>()
    )
}

/// Standard base64 with `+`/`/` swapped for `-`/`_` and padding stripped.
pub fn encode_base64url(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

impl MimeEnvelope {
    /// Reads every attachment and assembles the envelope.
    pub async fn build(
        message: &OutboundMessage,
        from_address: &str,
        sender_name: Option<&str>,
    ) -> Result<Self> {
        let mut contents = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            contents.push(attachment.read().await?);
        }
        Ok(Self::assemble(
            message,
            from_address,
            sender_name,
            new_boundary(),
            &contents,
        ))
    }

    /// `contents[i]` holds the bytes of `message.attachments[i]`.
    pub fn assemble(
        message: &OutboundMessage,
        from_address: &str,
        sender_name: Option<&str>,
        boundary: String,
        contents: &[Vec<u8>],
    ) -> Self {
        let headers = vec![
            ("From".to_string(), format_mailbox(sender_name, from_address)),
            ("To".to_string(), message.recipients.join(", ")),
            ("Subject".to_string(), encode_word(&message.subject)),
            ("MIME-Version".to_string(), "1.0".to_string()),
            (
                "Content-Type".to_string(),
                format!("multipart/mixed; boundary=\"{}\"", boundary),
            ),
        ];

        let html = &message.html_body;
        let (transfer_encoding, body) = if html.lines().any(|line| line.len() > MAX_LINE_OCTETS) {
            (TransferEncoding::Base64, wrap_base64(html.as_bytes()))
        } else if html.is_ascii() {
            (TransferEncoding::SevenBit, html.clone())
        } else {
            (TransferEncoding::EightBit, html.clone())
        };
        let mut parts = vec![MimePart {
            content_type: "text/html; charset=\"UTF-8\"".to_string(),
            transfer_encoding,
            filename: None,
            body,
        }];

        for (attachment, bytes) in message.attachments.iter().zip(contents) {
            let name = quote(&encode_word(&attachment.filename));
            parts.push(MimePart {
                content_type: format!("{}; name={}", attachment.media_type, name),
                transfer_encoding: TransferEncoding::Base64,
                filename: Some(attachment.filename.clone()),
                body: wrap_base64(bytes),
            });
        }

        MimeEnvelope {
            headers,
            boundary,
            parts,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Byte-exact wire form with CRLF line endings.
    pub fn to_raw(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        out.push_str(CRLF);

        for part in &self.parts {
            out.push_str(&format!("--{}{}", self.boundary, CRLF));
            out.push_str(&format!("Content-Type: {}{}", part.content_type, CRLF));
            out.push_str(&format!(
                "Content-Transfer-Encoding: {}{}",
                part.transfer_encoding.as_str(),
                CRLF
            ));
            if let Some(filename) = &part.filename {
                out.push_str(&format!(
                    "Content-Disposition: attachment; filename={}{}",
                    quote(&encode_word(filename)),
                    CRLF
                ));
            }
            out.push_str(CRLF);
            out.push_str(&part.body);
            out.push_str(CRLF);
        }
        out.push_str(&format!("--{}--{}", self.boundary, CRLF));
        out
    }
}

fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if is_plain_header_text(name) => format!("{} <{}>", quote(name), address),
        Some(name) => format!("{} <{}>", encode_word(name), address),
        None => address.to_string(),
    }
}

/// Printable ASCII can go into a header verbatim; anything else could end the line.
fn is_plain_header_text(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii() && (c == '\t' || !c.is_ascii_control()))
}

/// RFC 2047 encoded word for header text that is not plain ASCII.
fn encode_word(text: &str) -> String {
    if is_plain_header_text(text) {
        text.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64.encode(text.as_bytes()))
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = BASE64.encode(bytes);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_LENGTH)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join(CRLF)
}
