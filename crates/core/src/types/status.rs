//! Order payment status state machine.

use serde::{Deserialize, Serialize};

/// Payment status of an order.
///
/// ```text
/// created -> payment_pending -> paid            (terminal success)
/// created -> payment_pending -> payment_failed  (terminal failure)
/// payment_failed -> payment_pending             (manual retry re-dispatch)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Created,
    PaymentPending,
    Paid,
    PaymentFailed,
}

impl OrderStatus {
    /// Whether the state machine permits moving from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::PaymentPending)
                | (Self::PaymentPending, Self::Paid)
                | (Self::PaymentPending, Self::PaymentFailed)
                | (Self::PaymentFailed, Self::PaymentPending)
        )
    }

    /// Whether no further automatic transition applies.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::PaymentPending => write!(f, "payment_pending"),
            Self::Paid => write!(f, "paid"),
            Self::PaymentFailed => write!(f, "payment_failed"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "payment_pending" => Ok(Self::PaymentPending),
            "paid" => Ok(Self::Paid),
            "payment_failed" => Ok(Self::PaymentFailed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::PaymentPending));
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn test_failure_and_retry_transitions() {
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::PaymentFailed));
        assert!(OrderStatus::PaymentFailed.can_transition_to(OrderStatus::PaymentPending));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PaymentPending));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PaymentFailed));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Created));
    }

    #[test]
    fn test_roundtrip_through_str() {
        for status in [
            OrderStatus::Created,
            OrderStatus::PaymentPending,
            OrderStatus::Paid,
            OrderStatus::PaymentFailed,
        ] {
            let text = status.to_string();
            assert_eq!(text.parse::<OrderStatus>().expect("parses"), status);
        }
    }

    #[test]
    fn test_only_paid_is_terminal() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::PaymentFailed.is_terminal());
        assert!(!OrderStatus::PaymentPending.is_terminal());
    }
}
