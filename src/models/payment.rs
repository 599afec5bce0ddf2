use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub booking_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentState,
    pub transaction_id: Option<String>,
    /// Opaque provider payload, stored as-is.
    pub details: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Khalti,
    CreditCard,
    DebitCard,
    Paypal,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Khalti => "khalti",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "khalti" => Some(PaymentMethod::Khalti),
            "credit_card" => Some(PaymentMethod::CreditCard),
            "debit_card" => Some(PaymentMethod::DebitCard),
            "paypal" => Some(PaymentMethod::Paypal),
            "cash" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentState::Pending),
            "completed" => Some(PaymentState::Completed),
            "failed" => Some(PaymentState::Failed),
            "refunded" => Some(PaymentState::Refunded),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}
