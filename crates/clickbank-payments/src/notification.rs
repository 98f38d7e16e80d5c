//! Inbound ClickBank Notification
//!
//! ClickBank sends the buyer back with the purchase details as query
//! parameters. Field names follow ClickBank's thank-you page contract.

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Raw notification as received (every field optional until validated)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Notification {
    /// ClickBank item code
    #[serde(default)]
    pub item: Option<String>,

    /// Vendor receipt id
    #[serde(default)]
    pub cbreceipt: Option<String>,

    /// Unix timestamp of the purchase
    #[serde(default)]
    pub time: Option<String>,

    /// Proof token
    #[serde(default)]
    pub cbpop: Option<String>,

    /// Buyer full name
    #[serde(default)]
    pub cname: Option<String>,

    /// Buyer email
    #[serde(default)]
    pub cemail: Option<String>,
}

/// Buyer name split into first and last
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerName {
    pub first: String,
    pub last: String,
}

impl BuyerName {
    /// Split on the first space; everything after it is the last name
    pub fn split(full: &str) -> Self {
        let mut parts = full.splitn(2, ' ');
        Self {
            first: parts.next().unwrap_or_default().to_string(),
            last: parts.next().unwrap_or_default().to_string(),
        }
    }
}

/// A notification with every field present
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedNotification {
    pub item: String,
    pub receipt: String,
    pub time: u64,
    pub proof_token: String,
    pub name: BuyerName,
    pub email: String,
}

fn required<'a>(field: &'static str, value: Option<&'a String>) -> Result<&'a str> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(PaymentError::MissingField(field))
}

impl Notification {
    /// True when any ClickBank field is present at all
    pub fn is_empty(&self) -> bool {
        [
            &self.item,
            &self.cbreceipt,
            &self.time,
            &self.cbpop,
            &self.cname,
            &self.cemail,
        ]
        .iter()
        .all(|f| f.as_deref().is_none_or(str::is_empty))
    }

    /// Check presence of all six fields and normalize them
    pub fn parse(&self) -> Result<ParsedNotification> {
        let item = required("item", self.item.as_ref())?;
        let receipt = required("cbreceipt", self.cbreceipt.as_ref())?;
        let time = required("time", self.time.as_ref())?;
        let proof_token = required("cbpop", self.cbpop.as_ref())?;
        let name = required("cname", self.cname.as_ref())?;
        let email = required("cemail", self.cemail.as_ref())?;

        let time = time.trim().parse::<u64>().map_err(|_| PaymentError::InvalidField {
            field: "time",
            value: time.to_string(),
        })?;

        Ok(ParsedNotification {
            item: item.to_string(),
            receipt: receipt.to_string(),
            time,
            proof_token: proof_token.to_string(),
            name: BuyerName::split(name),
            email: email.trim().to_string(),
        })
    }
}
