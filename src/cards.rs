use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::secrets::SecretVault;

pub const CARD_ACCOUNT: &str = "user_card_data";

const CARD_NUMBER_MAX_FORMATTED: usize = 19;

/// Membership card details. Kept only in the platform keychain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub card_number: String,
    pub cardholder_name: String,
    pub expiration_date: String,
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = digits_only(&self.card_number);
        let tail = &digits[digits.len().saturating_sub(4)..];
        f.debug_struct("CardData")
            .field("card_number", &format_args!("**** {tail}"))
            .field("cardholder_name", &self.cardholder_name)
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

impl CardData {
    /// Field checks in display order; the first failure wins.
    pub fn validate(&self) -> AppResult<()> {
        let digits = digits_only(&self.card_number);
        if !(13..=19).contains(&digits.len()) {
            return Err(AppError::validation(
                "cardNumber",
                "Please enter a valid card number",
            ));
        }
        if self.cardholder_name.trim().chars().count() < 2 {
            return Err(AppError::validation(
                "cardholderName",
                "Please enter the cardholder name",
            ));
        }
        if !is_expiration_shape(&self.expiration_date) {
            return Err(AppError::validation(
                "expirationDate",
                "Please enter expiration date as MM/YY",
            ));
        }
        Ok(())
    }

    fn normalized(&self) -> Self {
        Self {
            card_number: digits_only(&self.card_number),
            cardholder_name: self.cardholder_name.trim().to_string(),
            expiration_date: self.expiration_date.clone(),
        }
    }
}

fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn is_expiration_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 5
        && bytes[2] == b'/'
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

/// Digits grouped by four, e.g. "1234 5678 9012 3456".
pub fn format_card_number(input: &str) -> String {
    let digits = digits_only(input);
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 4);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && index % 4 == 0 {
            formatted.push(' ');
        }
        formatted.push(digit);
    }
    formatted.truncate(CARD_NUMBER_MAX_FORMATTED);
    formatted
}

/// "1225" becomes "12/25"; the slash appears once a third digit is typed.
pub fn format_expiration_date(input: &str) -> String {
    let digits = digits_only(input);
    if digits.len() >= 2 {
        let end = digits.len().min(4);
        format!("{}/{}", &digits[..2], &digits[2..end])
    } else {
        digits
    }
}

pub struct CardStore {
    vault: SecretVault,
}

impl CardStore {
    pub fn new(vault: SecretVault) -> Self {
        Self { vault }
    }

    pub fn save(&self, card: &CardData) -> AppResult<CardData> {
        card.validate()?;
        let card = card.normalized();
        let payload = SecretString::from(serde_json::to_string(&card)?);
        self.vault.write(CARD_ACCOUNT, &payload)?;
        info!(target: "cards", "card saved");
        Ok(card)
    }

    /// `None` when nothing is stored or the stored payload no longer decodes.
    pub fn get(&self) -> AppResult<Option<CardData>> {
        let Some(secret) = self.vault.read(CARD_ACCOUNT)? else {
            return Ok(None);
        };
        match serde_json::from_str::<CardData>(secret.expose_secret()) {
            Ok(card) => Ok(Some(card)),
            Err(err) => {
                warn!(target: "cards", error = %err, "stored card is unreadable");
                Ok(None)
            }
        }
    }

    pub fn delete(&self) -> AppResult<()> {
        self.vault.delete(CARD_ACCOUNT)?;
        info!(target: "cards", "card deleted");
        Ok(())
    }

    pub fn has(&self) -> AppResult<bool> {
        self.vault.has(CARD_ACCOUNT)
    }
}
