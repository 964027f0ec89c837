//! Privilege tiers and the wallet-based role resolver.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed two-tier privilege model. Stored as the `user_role` enum in the
/// database and serialized as a lowercase string on the wire.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Operator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Operator => "operator",
        }
    }
}

/// Resolve the privilege tier for a wallet address.
///
/// Applied at identity creation and re-checked on every wallet login so the
/// elevated tier activates without an identity migration. Accounts created
/// through the email path always start as [`Role::User`].
#[must_use]
pub fn determine_role(operator_wallet: Option<&str>, wallet_address: &str) -> Role {
    match operator_wallet {
        Some(operator) if operator.eq_ignore_ascii_case(wallet_address) => Role::Operator,
        _ => Role::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPERATOR: &str = "3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c";

    #[test]
    fn operator_wallet_resolves_operator() {
        assert_eq!(determine_role(Some(OPERATOR), OPERATOR), Role::Operator);
    }

    #[test]
    fn operator_comparison_ignores_case() {
        let upper = OPERATOR.to_uppercase();
        assert_eq!(determine_role(Some(OPERATOR), &upper), Role::Operator);
    }

    #[test]
    fn other_wallets_resolve_user() {
        let other = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
        assert_eq!(determine_role(Some(OPERATOR), other), Role::User);
    }

    #[test]
    fn no_operator_configured_resolves_user() {
        assert_eq!(determine_role(None, OPERATOR), Role::User);
    }

    #[test]
    fn role_as_str_matches_wire_format() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Operator.as_str(), "operator");
    }
}
