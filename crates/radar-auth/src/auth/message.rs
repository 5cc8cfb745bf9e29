/*
[INPUT]:  Challenge and signer address
[OUTPUT]: Canonical EIP-4361 sign-in text, and its inverse parse
[POS]:    Auth layer - pure message construction
[UPDATE]: When the sign-in message format changes (backend must change too)
*/

//! Canonical sign-in message.
//!
//! Lines appear in this fixed order, joined by `\n` with no trailing newline:
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}            (line and following blank line omitted when absent)
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expires_at}
//! ```
//!
//! Timestamps are RFC 3339 in UTC with millisecond precision and a `Z` suffix.
//! The backend rebuilds this text to recover the signer, so any change here is
//! a protocol change.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::http::{AuthError, Result};
use crate::types::{Address, Challenge};

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_PREFIX: &str = "URI: ";
const VERSION_PREFIX: &str = "Version: ";
const CHAIN_ID_PREFIX: &str = "Chain ID: ";
const NONCE_PREFIX: &str = "Nonce: ";
const ISSUED_AT_PREFIX: &str = "Issued At: ";
const EXPIRATION_PREFIX: &str = "Expiration Time: ";

pub struct SiweMessage;

impl SiweMessage {
    /// Build the canonical text. Same inputs always yield identical bytes.
    pub fn build(challenge: &Challenge, address: &Address) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(12);
        lines.push(format!("{}{HEADER_SUFFIX}", challenge.domain));
        lines.push(address.as_str().to_string());
        lines.push(String::new());
        if let Some(statement) = challenge.statement.as_deref() {
            lines.push(statement.to_string());
            lines.push(String::new());
        }
        lines.push(format!("{URI_PREFIX}{}", challenge.uri));
        lines.push(format!("{VERSION_PREFIX}{}", Challenge::VERSION));
        lines.push(format!("{CHAIN_ID_PREFIX}{}", challenge.chain_id));
        lines.push(format!("{NONCE_PREFIX}{}", challenge.nonce));
        lines.push(format!("{ISSUED_AT_PREFIX}{}", format_timestamp(&challenge.issued_at)));
        lines.push(format!(
            "{EXPIRATION_PREFIX}{}",
            format_timestamp(&challenge.expires_at)
        ));
        lines.join("\n")
    }

    /// Recover the challenge and address from canonical text.
    pub fn parse(text: &str) -> Result<(Challenge, Address)> {
        let mut lines = text.split('\n').peekable();

        let header = next_line(&mut lines, "header")?;
        let domain = header
            .strip_suffix(HEADER_SUFFIX)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| malformed("header line"))?;

        let address = Address::parse(next_line(&mut lines, "address")?)
            .map_err(|_| malformed("address line"))?;
        expect_blank(&mut lines)?;

        let has_statement = lines
            .peek()
            .is_some_and(|line| !line.starts_with(URI_PREFIX));
        let statement = if has_statement {
            let statement = next_line(&mut lines, "statement")?.to_string();
            expect_blank(&mut lines)?;
            Some(statement)
        } else {
            None
        };

        let uri = field(&mut lines, URI_PREFIX)?;
        let version = field(&mut lines, VERSION_PREFIX)?;
        if version != Challenge::VERSION {
            return Err(malformed("version"));
        }
        let chain_id = field(&mut lines, CHAIN_ID_PREFIX)?
            .parse()
            .map_err(|_| malformed("chain id"))?;
        let nonce = field(&mut lines, NONCE_PREFIX)?;
        let issued_at = parse_timestamp(field(&mut lines, ISSUED_AT_PREFIX)?)?;
        let expires_at = parse_timestamp(field(&mut lines, EXPIRATION_PREFIX)?)?;

        if lines.next().is_some() {
            return Err(malformed("trailing content"));
        }

        let challenge = Challenge::new(
            nonce, domain, statement, uri, chain_id, issued_at, expires_at,
        )?;
        Ok((challenge, address))
    }
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| malformed("timestamp"))
}

fn malformed(what: &str) -> AuthError {
    AuthError::InvalidResponse(format!("malformed sign-in message: {what}"))
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    lines.next().ok_or_else(|| malformed(what))
}

fn expect_blank<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<()> {
    match lines.next() {
        Some("") => Ok(()),
        _ => Err(malformed("missing blank line")),
    }
}

fn field<'a>(lines: &mut impl Iterator<Item = &'a str>, prefix: &str) -> Result<&'a str> {
    lines
        .next()
        .and_then(|line| line.strip_prefix(prefix))
        .ok_or_else(|| malformed(prefix.trim_end_matches(": ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn challenge(statement: Option<&str>) -> Challenge {
        let issued_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        Challenge::new(
            "abc123",
            "example.test",
            statement.map(str::to_string),
            "https://example.test",
            534351,
            issued_at,
            issued_at + Duration::seconds(300),
        )
        .unwrap()
    }

    fn address() -> Address {
        Address::parse("0xAAAA00000000000000000000000000000000111A").unwrap()
    }

    #[test]
    fn test_build_fixed_field_order() {
        let message = SiweMessage::build(&challenge(Some("Sign in to SNE Radar")), &address());
        let expected = "example.test wants you to sign in with your Ethereum account:\n\
                        0xAAAA00000000000000000000000000000000111A\n\
                        \n\
                        Sign in to SNE Radar\n\
                        \n\
                        URI: https://example.test\n\
                        Version: 1\n\
                        Chain ID: 534351\n\
                        Nonce: abc123\n\
                        Issued At: 2025-01-02T03:04:05.000Z\n\
                        Expiration Time: 2025-01-02T03:09:05.000Z";
        assert_eq!(message, expected);
    }

    #[test]
    fn test_build_without_statement() {
        let message = SiweMessage::build(&challenge(None), &address());
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "URI: https://example.test");
    }

    #[test]
    fn test_build_is_deterministic() {
        let c = challenge(Some("hi"));
        assert_eq!(
            SiweMessage::build(&c, &address()).as_bytes(),
            SiweMessage::build(&c, &address()).as_bytes()
        );
    }

    #[test]
    fn test_parse_inverts_build() {
        for statement in [None, Some("Sign in to SNE Radar")] {
            let c = challenge(statement);
            let text = SiweMessage::build(&c, &address());
            let (parsed, parsed_address) = SiweMessage::parse(&text).unwrap();
            assert_eq!(parsed, c);
            assert_eq!(parsed_address.as_str(), address().as_str());
            assert_eq!(SiweMessage::build(&parsed, &parsed_address), text);
        }
    }

    #[test]
    fn test_parse_rejects_missing_expiration() {
        let text = SiweMessage::build(&challenge(None), &address());
        let truncated = text.rsplit_once('\n').unwrap().0;
        assert!(matches!(
            SiweMessage::parse(truncated),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let text = SiweMessage::build(&challenge(None), &address()).replace("Version: 1", "Version: 2");
        assert!(SiweMessage::parse(&text).is_err());
    }
}
