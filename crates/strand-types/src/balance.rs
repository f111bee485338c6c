//! Per-asset channel balances.
//!
//! A [`Balance`] is an ordered pair of `(recipient, amount)` slots. In a
//! channel balance, slot 0 belongs to Alice and slot 1 to Bob; in a transfer
//! balance the slots are the transfer's own payout addresses. Amounts travel
//! on the wire as decimal strings, the same discipline used for token amounts
//! elsewhere in the stack.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Decimal-string (de)serialization for [`U256`] wire fields.
pub mod u256_decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }

    /// Decimal-string (de)serialization for `Vec<U256>` wire fields.
    pub mod vec {
        use super::*;

        pub fn serialize<S: Serializer>(
            values: &[U256],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let strings: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            strings.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<U256>, D::Error> {
            let strings: Vec<String> = Deserialize::deserialize(deserializer)?;
            strings
                .into_iter()
                .map(|s| U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

/// An ordered two-slot balance: `amount[i]` is owed to `to[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    /// Recipient addresses, one per slot.
    pub to: [Address; 2],
    /// Amounts in the asset's smallest unit, one per slot.
    pub amount: [U256; 2],
}

impl Balance {
    /// An all-zero balance between the two given recipients.
    pub fn empty(to: [Address; 2]) -> Self {
        Balance {
            to,
            amount: [U256::ZERO, U256::ZERO],
        }
    }

    /// Sum of both slots. Saturates; channel amounts never approach 2^256.
    pub fn total(&self) -> U256 {
        self.amount[0].saturating_add(self.amount[1])
    }
}

#[derive(Serialize, Deserialize)]
struct BalanceWire {
    to: [Address; 2],
    amount: [String; 2],
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BalanceWire {
            to: self.to,
            amount: [self.amount[0].to_string(), self.amount[1].to_string()],
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = BalanceWire::deserialize(deserializer)?;
        let parse = |s: &str| U256::from_str_radix(s, 10).map_err(serde::de::Error::custom);
        Ok(Balance {
            to: wire.to,
            amount: [parse(&wire.amount[0])?, parse(&wire.amount[1])?],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_balance_serde_decimal() {
        let balance = Balance {
            to: [
                address!("0x00000000000000000000000000000000000000aa"),
                address!("0x00000000000000000000000000000000000000bb"),
            ],
            amount: [U256::from(10u64), U256::ZERO],
        };
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["amount"][0], "10");
        assert_eq!(json["amount"][1], "0");
        let back: Balance = serde_json::from_value(json).unwrap();
        assert_eq!(back, balance);
    }

    #[test]
    fn test_balance_total() {
        let balance = Balance {
            to: [Address::ZERO, Address::ZERO],
            amount: [U256::from(3u64), U256::from(4u64)],
        };
        assert_eq!(balance.total(), U256::from(7u64));
    }
}
