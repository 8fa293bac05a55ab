//! NFC-e QR code payloads and the 44-digit access key they carry.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

pub const ACCESS_KEY_LEN: usize = 44;

/// Fiscal model code of consumer receipts (NF-e is 55).
const NFCE_MODEL: &str = "65";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NfceError {
    #[error("QR code does not contain an access key")]
    MissingKey,
    #[error("access key must have 44 digits, got {0}")]
    Length(usize),
    #[error("access key must contain only digits")]
    NotNumeric,
    #[error("document model {0} is not an NFC-e")]
    Model(String),
    #[error("access key check digit is {found}, expected {expected}")]
    CheckDigit { expected: u32, found: u32 },
}

/// A validated NFC-e access key (`chave de acesso`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey(String);

impl AccessKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// IBGE code of the issuing state, e.g. `35` for São Paulo.
    pub fn state_code(&self) -> &str {
        &self.0[0..2]
    }

    /// Year and month of issue as `(yyyy, mm)`.
    pub fn issued(&self) -> (u32, u32) {
        let year = 2000 + self.0[2..4].parse::<u32>().unwrap_or_default();
        let month = self.0[4..6].parse().unwrap_or_default();
        (year, month)
    }

    pub fn cnpj(&self) -> &str {
        &self.0[6..20]
    }

    pub fn series(&self) -> u32 {
        self.0[22..25].parse().unwrap_or_default()
    }

    pub fn number(&self) -> u64 {
        self.0[25..34].parse().unwrap_or_default()
    }
}

impl FromStr for AccessKey {
    type Err = NfceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

        if !key.chars().all(|c| c.is_ascii_digit()) {
            return Err(NfceError::NotNumeric);
        }
        if key.len() != ACCESS_KEY_LEN {
            return Err(NfceError::Length(key.len()));
        }

        let model = &key[20..22];
        if model != NFCE_MODEL {
            return Err(NfceError::Model(model.to_string()));
        }

        let expected = check_digit(&key[..ACCESS_KEY_LEN - 1]);
        let found = key[ACCESS_KEY_LEN - 1..]
            .parse()
            .map_err(|_| NfceError::NotNumeric)?;
        if expected != found {
            return Err(NfceError::CheckDigit { expected, found });
        }

        Ok(Self(key))
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Modulo 11 over the first 43 digits, weights 2..=9 cycling from the right.
fn check_digit(digits: &str) -> u32 {
    let sum: u32 = digits
        .bytes()
        .rev()
        .zip((2..=9).cycle())
        .map(|(digit, weight)| u32::from(digit - b'0') * weight)
        .sum();

    match sum % 11 {
        0 | 1 => 0,
        remainder => 11 - remainder,
    }
}

/// A scanned receipt: the raw payload to forward to the backend plus its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub raw: String,
    pub access_key: AccessKey,
}

/// Accepts a bare access key or a state portal URL.
///
/// Version 2 URLs carry `p=<key>|<version>|<environment>|...`; version 1 URLs carry `chNFe=<key>`.
pub fn parse_qr(raw: &str) -> Result<QrPayload, NfceError> {
    let raw = raw.trim();

    let key = match Url::parse(raw) {
        Ok(url) => url
            .query_pairs()
            .find_map(|(name, value)| match name.as_ref() {
                "p" => value.split('|').next().map(str::to_string),
                "chNFe" => Some(value.into_owned()),
                _ => None,
            })
            .ok_or(NfceError::MissingKey)?,
        Err(_) => raw.to_string(),
    };

    if key.is_empty() {
        return Err(NfceError::MissingKey);
    }

    Ok(QrPayload {
        raw: raw.to_string(),
        access_key: key.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "35240512345678000190650010000012341000012348";

    #[test]
    fn bare_key_is_accepted_and_decoded() {
        let payload = parse_qr(KEY).unwrap();
        let key = payload.access_key;

        assert_eq!(key.state_code(), "35");
        assert_eq!(key.issued(), (2024, 5));
        assert_eq!(key.cnpj(), "12345678000190");
        assert_eq!(key.series(), 1);
        assert_eq!(key.number(), 1234);
    }

    #[test]
    fn grouped_key_ignores_whitespace() {
        let grouped = "3524 0512 3456 7800 0190 6500 1000 0012 3410 0001 2348";

        assert_eq!(grouped.parse::<AccessKey>().unwrap().as_str(), KEY);
    }

    #[test]
    fn version_two_url_uses_the_p_parameter() {
        let url = format!(
            "https://www.nfce.fazenda.sp.gov.br/NFCeConsultaPublica/Paginas/ConsultaQRCode.aspx?p={KEY}|2|1|1|3A8F2C"
        );

        let payload = parse_qr(&url).unwrap();
        assert_eq!(payload.access_key.as_str(), KEY);
        assert_eq!(payload.raw, url);
    }

    #[test]
    fn percent_encoded_separators_are_decoded() {
        let url = format!("https://sat.sef.sc.gov.br/nfce/consulta?p={KEY}%7C2%7C1%7C1%7CABCD");

        assert_eq!(parse_qr(&url).unwrap().access_key.as_str(), KEY);
    }

    #[test]
    fn version_one_url_uses_ch_nfe() {
        let url = format!("http://nfce.sefaz.ba.gov.br/qrcode?chNFe={KEY}&nVersao=100&tpAmb=1");

        assert_eq!(parse_qr(&url).unwrap().access_key.as_str(), KEY);
    }

    #[test]
    fn url_without_key_is_rejected() {
        assert_eq!(
            parse_qr("https://www.fazenda.sp.gov.br/nfce?tpAmb=1"),
            Err(NfceError::MissingKey)
        );
    }

    #[test]
    fn wrong_check_digit_is_rejected() {
        let tampered = format!("{}7", &KEY[..43]);

        assert_eq!(
            tampered.parse::<AccessKey>(),
            Err(NfceError::CheckDigit { expected: 8, found: 7 })
        );
    }

    #[test]
    fn nfe_keys_are_not_receipts() {
        let nfe = "35240512345678000190550010000012341000012345";

        assert_eq!(nfe.parse::<AccessKey>(), Err(NfceError::Model("55".to_string())));
    }

    #[test]
    fn short_and_non_numeric_keys_are_rejected() {
        assert_eq!("1234".parse::<AccessKey>(), Err(NfceError::Length(4)));
        assert_eq!("12a4".parse::<AccessKey>(), Err(NfceError::NotNumeric));
    }
}
